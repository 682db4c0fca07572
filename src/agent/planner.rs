//! Turns a command plus page analysis into an ordered action plan.

use crate::agent::llm::{complete_logged, LlmMessage, LlmProvider, LlmRequest};
use crate::agent::types::{ActionType, PageAnalysis, PlannedAction};
use crate::error::LlmError;
use serde::Deserialize;
use std::sync::Arc;

const PLAN_TEMPERATURE: f32 = 0.1;
const PLAN_MAX_TOKENS: u32 = 2000;

const PLAN_SYSTEM_PROMPT: &str =
    "You are an expert web automation assistant. Return only valid JSON responses.";

#[derive(Debug, Deserialize)]
struct RawPlan {
    actions: Vec<RawAction>,
}

/// Model-supplied action; id, success and timestamp are ignored
#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    coordinates: Option<RawCoordinates>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCoordinates {
    x: f64,
    y: f64,
}

pub struct ActionPlanner {
    llm: Arc<dyn LlmProvider>,
    element_cap: usize,
}

impl ActionPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>, element_cap: usize) -> Self {
        Self { llm, element_cap }
    }

    /// Produce the plan for `command`. Never empty: any oracle or parse
    /// failure yields the single fallback wait action.
    pub async fn plan(&self, command: &str, analysis: &PageAnalysis) -> Vec<PlannedAction> {
        let request = LlmRequest::new(
            vec![
                LlmMessage::system(PLAN_SYSTEM_PROMPT),
                LlmMessage::user(self.build_prompt(command, analysis)),
            ],
            PLAN_TEMPERATURE,
            PLAN_MAX_TOKENS,
        );

        let planned = match complete_logged(self.llm.as_ref(), "plan", &request).await {
            Ok(response) => parse_plan(&response.content),
            Err(e) => Err(e),
        };

        match planned {
            Ok(actions) => {
                tracing::info!("Planned {} action(s) for '{}'", actions.len(), command);
                actions
            }
            Err(e) => {
                tracing::warn!("Action planning failed for '{}': {}", command, e);
                fallback_plan(command)
            }
        }
    }

    fn build_prompt(&self, command: &str, analysis: &PageAnalysis) -> String {
        let elements: Vec<_> = analysis
            .actionable_elements
            .iter()
            .take(self.element_cap)
            .collect();
        let elements = serde_json::to_string(&elements).unwrap_or_else(|_| "[]".to_string());

        format!(
            r#"You are an AI assistant that helps navigate websites. Given a user command and page analysis, generate a list of specific actions to execute.

User Command: "{command}"

Current Page Analysis:
- Domain: {domain}
- Title: {title}
- Category: {category}
- Available Elements: {elements}
- Key Features: {features}

Instructions:
1. Break down the user command into specific, actionable steps
2. Map each step to available page elements
3. Return a JSON object of actions with this structure:
   {{
     "actions": [
       {{
         "type": "click|type|navigate|scroll|hover|wait",
         "selector": "css-selector-or-null",
         "text": "text-to-type-or-null",
         "url": "url-to-navigate-or-null",
         "coordinates": {{"x": 0, "y": 0}} or null,
         "description": "human-readable description of what this action does"
       }}
     ]
   }}

4. Be specific with selectors - use the exact selectors from the page analysis
5. If you can't find a specific element, leave the selector null and describe the target
6. Keep actions simple and atomic
7. Add wait actions between complex interactions

Return only the JSON, no additional text."#,
            command = command,
            domain = analysis.domain,
            title = analysis.title,
            category = analysis.category,
            elements = elements,
            features = analysis.key_features.join(", "),
        )
    }
}

/// The plan used when the oracle fails: one wait naming the command
pub fn fallback_plan(command: &str) -> Vec<PlannedAction> {
    vec![PlannedAction::new(
        ActionType::Wait,
        format!("Attempted to process: {}", command),
    )]
}

/// Parse the model's plan. Identity, timestamp and outcome are always
/// assigned here, whatever the model sent.
pub fn parse_plan(content: &str) -> Result<Vec<PlannedAction>, LlmError> {
    let json = extract_json(content).ok_or(LlmError::EmptyResponse)?;

    let raw: Vec<RawAction> = if json.starts_with('[') {
        serde_json::from_str(json)
    } else {
        serde_json::from_str::<RawPlan>(json).map(|p| p.actions)
    }
    .map_err(|e| LlmError::Parse(e.to_string()))?;

    if raw.is_empty() {
        return Err(LlmError::Parse("plan contains no actions".to_string()));
    }

    raw.into_iter().map(into_planned).collect()
}

fn into_planned(raw: RawAction) -> Result<PlannedAction, LlmError> {
    let action_type: ActionType =
        serde_json::from_value(serde_json::Value::String(raw.action_type.to_lowercase()))
            .map_err(|_| LlmError::Parse(format!("unknown action type '{}'", raw.action_type)))?;

    let description = present(raw.description)
        .unwrap_or_else(|| format!("{} action", action_type));

    let mut action = PlannedAction::new(action_type, description);
    action.selector = present(raw.selector);
    action.text = present(raw.text);
    action.url = present(raw.url);
    if let Some(c) = raw.coordinates {
        action = action.with_coordinates(c.x, c.y);
    }
    Ok(action)
}

/// Treat blank and literal "null" strings as absent
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && !v.eq_ignore_ascii_case("null")
    })
}

/// Slice out the JSON body, tolerating code fences and surrounding prose
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find(|c: char| c == '{' || c == '[')?;
    let close = if content[start..].starts_with('{') { '}' } else { ']' };
    let end = content.rfind(close)?;
    (end > start).then(|| &content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_assigns_identity() {
        let content = r##"{"actions": [
            {"id": "model-id", "type": "click", "selector": "#login", "text": null,
             "url": null, "coordinates": null, "description": "Click login",
             "success": true, "timestamp": "will-be-set-by-system"},
            {"type": "navigate", "url": "https://example.com/pricing", "description": "Open pricing"}
        ]}"##;
        let actions = parse_plan(content).unwrap();
        assert_eq!(actions.len(), 2);
        assert_ne!(actions[0].id, "model-id");
        assert!(!actions[0].success);
        assert_eq!(actions[0].selector.as_deref(), Some("#login"));
        assert!(actions[0].text.is_none());
        assert_eq!(actions[1].action_type, ActionType::Navigate);
        assert_ne!(actions[0].id, actions[1].id);
    }

    #[test]
    fn test_parse_plan_tolerates_fences() {
        let content = "```json\n{\"actions\": [{\"type\": \"scroll\", \"description\": \"Scroll down\"}]}\n```";
        let actions = parse_plan(content).unwrap();
        assert_eq!(actions[0].action_type, ActionType::Scroll);
    }

    #[test]
    fn test_parse_plan_null_strings_are_absent() {
        let content = r#"{"actions": [{"type": "CLICK", "selector": "null", "text": "", "description": "Click"}]}"#;
        let actions = parse_plan(content).unwrap();
        assert_eq!(actions[0].action_type, ActionType::Click);
        assert!(actions[0].selector.is_none());
        assert!(actions[0].text.is_none());
    }

    #[test]
    fn test_parse_plan_bare_array() {
        let content = r#"[{"type": "wait", "description": "Pause"}]"#;
        assert_eq!(parse_plan(content).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_plan_rejects_bad_input() {
        assert!(parse_plan("I cannot help with that").is_err());
        assert!(parse_plan(r#"{"actions": []}"#).is_err());
        assert!(parse_plan(r#"{"actions": [{"type": "teleport"}]}"#).is_err());
        assert!(parse_plan(r#"{"actions": [{"type": "click""#).is_err());
    }

    #[test]
    fn test_missing_description_is_filled() {
        let actions = parse_plan(r#"{"actions": [{"type": "hover", "selector": "nav"}]}"#).unwrap();
        assert_eq!(actions[0].description, "hover action");
    }

    #[test]
    fn test_fallback_plan() {
        let plan = fallback_plan("show me pricing");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action_type, ActionType::Wait);
        assert!(!plan[0].success);
        assert_eq!(plan[0].description, "Attempted to process: show me pricing");
    }
}
