use crate::agent::llm::{complete_logged, LlmMessage, LlmProvider, LlmRequest};
use crate::agent::types::{ExecutedAction, PageAnalysis};
use std::sync::Arc;

const EXPLAIN_TEMPERATURE: f32 = 0.7;
const EXPLAIN_MAX_TOKENS: u32 = 200;

const EXPLAIN_SYSTEM_PROMPT: &str =
    "You are a friendly AI demo agent. Speak naturally and conversationally.";

/// Narrates what was done for a command. Never fails: oracle errors and
/// empty replies fall back to templated sentences.
pub struct ExplanationGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl ExplanationGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn explain(
        &self,
        command: &str,
        actions: &[ExecutedAction],
        analysis: &PageAnalysis,
    ) -> String {
        let request = LlmRequest::new(
            vec![
                LlmMessage::system(EXPLAIN_SYSTEM_PROMPT),
                LlmMessage::user(build_explain_prompt(command, actions, analysis)),
            ],
            EXPLAIN_TEMPERATURE,
            EXPLAIN_MAX_TOKENS,
        );

        match complete_logged(self.llm.as_ref(), "explain", &request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content.trim().to_string(),
            Ok(_) => empty_reply_fallback(command),
            Err(e) => {
                tracing::warn!("Explanation failed for '{}': {}", command, e);
                error_fallback(command)
            }
        }
    }
}

fn build_explain_prompt(command: &str, actions: &[ExecutedAction], analysis: &PageAnalysis) -> String {
    let transcript = actions
        .iter()
        .map(|a| {
            format!(
                "- {} ({})",
                a.description,
                if a.success { "SUCCESS" } else { "FAILED" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an AI demo agent giving a live product demonstration.

User asked: "{}"

Actions performed:
{}

Current page: {} ({})

Generate a natural, conversational response that:
1. Explains what you just did in response to their command
2. Describes what they can see on the screen now
3. Suggests what they might want to do next
4. Sounds like a friendly sales person giving a demo

Keep it concise (2-3 sentences max) and engaging. Use "I" statements like "I clicked on..." or "I navigated to..."

If any actions failed, acknowledge it briefly and suggest alternatives."#,
        command, transcript, analysis.title, analysis.domain
    )
}

pub fn empty_reply_fallback(command: &str) -> String {
    format!(
        "I processed your request to \"{}\". Let me know what else you'd like to see!",
        command
    )
}

pub fn error_fallback(command: &str) -> String {
    format!(
        "I tried to {}. Let me know if you'd like to try something else!",
        command.to_lowercase()
    )
}
