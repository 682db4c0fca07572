//! Language-model-assisted element ranking, used when the heuristic misses.

use crate::agent::llm::{complete_logged, LlmMessage, LlmProvider, LlmRequest};
use crate::agent::matcher::build_selector;
use crate::agent::types::{CandidateElement, ElementMatch};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

const RANK_TEMPERATURE: f32 = 0.1;
const RANK_MAX_TOKENS: u32 = 100;
const PROMPT_TEXT_LIMIT: usize = 100;

/// Candidate fields shown to the model
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RankView<'a> {
    index: usize,
    tag: &'a str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    aria_label: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_testid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    placeholder: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_text: Option<String>,
}

impl<'a> RankView<'a> {
    fn new(position: usize, c: &'a CandidateElement) -> Self {
        Self {
            index: position,
            tag: &c.tag,
            text: clip(&c.text),
            aria_label: c.aria_label.as_deref(),
            title: c.title.as_deref(),
            data_testid: c.data_testid.as_deref(),
            placeholder: c.attribute("placeholder"),
            alt: c.attribute("alt"),
            parent_text: c.parent_text.as_deref().map(clip),
        }
    }
}

fn clip(text: &str) -> String {
    text.chars().take(PROMPT_TEXT_LIMIT).collect()
}

pub struct IntentRanker {
    llm: Arc<dyn LlmProvider>,
    cap: usize,
}

impl IntentRanker {
    pub fn new(llm: Arc<dyn LlmProvider>, cap: usize) -> Self {
        Self { llm, cap }
    }

    /// Ask the model to pick among the first `cap` candidates.
    ///
    /// Returns None on an empty list, an oracle error or a response without
    /// an in-range index.
    pub async fn rank(&self, command: &str, candidates: &[CandidateElement]) -> Option<ElementMatch> {
        let shortlist = &candidates[..candidates.len().min(self.cap)];
        if shortlist.is_empty() {
            return None;
        }

        let request = LlmRequest::new(
            vec![LlmMessage::user(build_rank_prompt(command, shortlist))],
            RANK_TEMPERATURE,
            RANK_MAX_TOKENS,
        );

        let response = match complete_logged(self.llm.as_ref(), "rank", &request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Ranking call failed for '{}': {}", command, e);
                return None;
            }
        };

        let Some(index) = parse_index_response(&response.content, shortlist.len()) else {
            tracing::warn!(
                "Ranking response had no usable index: {}",
                response.content.trim()
            );
            return None;
        };

        let selector = build_selector(&shortlist[index]);
        tracing::info!("Ranker chose candidate {}: {}", index, selector);
        Some(ElementMatch { selector, index })
    }
}

fn build_rank_prompt(command: &str, shortlist: &[CandidateElement]) -> String {
    let views: Vec<RankView<'_>> = shortlist
        .iter()
        .enumerate()
        .map(|(position, c)| RankView::new(position, c))
        .collect();
    let listing = serde_json::to_string_pretty(&views).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"User command: "{}"
Here are the candidate elements (with semantic info):
{}
Choose the element (by index) that best matches the user's intent. Prefer elements whose text, aria-label, title, placeholder, alt, data-testid, or parentText closely match the intent. Respond with the index and a short explanation."#,
        command, listing
    )
}

/// First integer in `content`, in appearance order, that indexes a list of `len`.
pub fn parse_index_response(content: &str, len: usize) -> Option<usize> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()?;

    re.find_iter(content)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .find(|&idx| idx < len)
}
