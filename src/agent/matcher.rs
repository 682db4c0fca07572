//! Heuristic element matching and selector construction.
//!
//! Every path that turns a candidate into a selector (heuristic, ranker,
//! fallback) goes through [`build_selector`], so the preference order is the
//! same no matter which matcher chose the element.

use crate::agent::types::{CandidateElement, ElementMatch};
use regex::Regex;
use std::sync::OnceLock;

/// Longest text fragment used in a `:has-text` selector
const MAX_SELECTOR_TEXT: usize = 50;

/// Deterministic first-line matcher.
///
/// Case-insensitive substring test of the whole command against `text`,
/// `aria-label`, `title`, `data-testid` and parent text, in that order.
/// The first candidate with any qualifying field wins; blank fields never
/// match and neither does a blank command.
pub fn heuristic_match(command: &str, candidates: &[CandidateElement]) -> Option<ElementMatch> {
    let needle = command.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    candidates.iter().enumerate().find_map(|(position, candidate)| {
        let hit = match_fields(candidate)
            .into_iter()
            .flatten()
            .filter(|field| !field.trim().is_empty())
            .any(|field| field.to_lowercase().contains(&needle));

        hit.then(|| {
            tracing::debug!(
                "Heuristic matched candidate {} ({}) for '{}'",
                position,
                candidate.tag,
                command
            );
            ElementMatch {
                selector: build_selector(candidate),
                index: position,
            }
        })
    })
}

fn match_fields(candidate: &CandidateElement) -> [Option<&str>; 5] {
    [
        Some(candidate.text.as_str()),
        candidate.aria_label.as_deref(),
        candidate.title.as_deref(),
        candidate.data_testid.as_deref(),
        candidate.parent_text.as_deref(),
    ]
}

/// Build the most stable selector available for a candidate.
///
/// `[data-testid]` > `[aria-label]` > `tag[title]` > `tag:has-text(..)` >
/// `tag:nth-child(index + 1)`.
pub fn build_selector(candidate: &CandidateElement) -> String {
    let tag = if candidate.tag.trim().is_empty() {
        "*".to_string()
    } else {
        candidate.tag.trim().to_lowercase()
    };

    if let Some(testid) = non_blank(candidate.data_testid.as_deref()) {
        return format!("[data-testid='{}']", escape_attribute(testid));
    }
    if let Some(label) = non_blank(candidate.aria_label.as_deref()) {
        return format!("[aria-label='{}']", escape_attribute(label));
    }
    if let Some(title) = non_blank(candidate.title.as_deref()) {
        return format!("{}[title='{}']", tag, escape_attribute(title));
    }

    let text = normalize_text(&candidate.text);
    if !text.is_empty() {
        let fragment: String = text.chars().take(MAX_SELECTOR_TEXT).collect();
        return format!("{}:has-text(\"{}\")", tag, escape_text(fragment.trim_end()));
    }

    format!("{}:nth-child({})", tag, candidate.index + 1)
}

/// Extract the unescaped text argument of a `:has-text("...")` selector
pub fn parse_has_text(selector: &str) -> Option<String> {
    static HAS_TEXT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = HAS_TEXT
        .get_or_init(|| Regex::new(r#":has-text\("((?:[^"\\]|\\.)*)"\)"#).ok())
        .as_ref()?;

    let raw = re.captures(selector)?.get(1)?.as_str();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Collapse runs of whitespace to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Quote for a single-quoted CSS string. Line breaks cannot appear raw in
/// one, so they become hex escapes; the trailing space ends the escape.
fn escape_attribute(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\a ")
        .replace('\r', "\\d ")
}

fn escape_text(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
