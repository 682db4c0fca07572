//! Per-action state machine: enrich, resolve, execute, fall back.
//!
//! Every path ends in a terminal [`ExecutedAction`]. Nothing here returns an
//! error to the caller; resolution and execution failures are recorded on
//! the action itself.

use crate::agent::action::ActionExecutor;
use crate::agent::matcher::{build_selector, heuristic_match, parse_has_text};
use crate::agent::page::LivePage;
use crate::agent::ranker::IntentRanker;
use crate::agent::snapshot::extract_candidates;
use crate::agent::types::{
    ActionType, CandidateElement, ElementMatch, ExecutedAction, MatchedElement, PlannedAction,
};
use crate::error::BrowserError;

pub const NO_ELEMENT_FOUND: &str = "no suitable element found";

pub struct ActionResolver {
    ranker: IntentRanker,
    executor: ActionExecutor,
    /// Candidates walked by the fallback loop
    fallback_cap: usize,
}

impl ActionResolver {
    pub fn new(ranker: IntentRanker, executor: ActionExecutor, fallback_cap: usize) -> Self {
        Self {
            ranker,
            executor,
            fallback_cap,
        }
    }

    pub async fn resolve_and_execute(
        &self,
        page: &dyn LivePage,
        mut action: PlannedAction,
        command: &str,
    ) -> ExecutedAction {
        action.attempts = 0;
        action.error = None;

        // One snapshot per action, shared by enrich, resolve and fallback
        let mut snapshot: Option<Vec<CandidateElement>> = None;
        let mut tried: Option<usize> = None;

        if action.selector.is_some() {
            let candidates = snapshot.insert(take_snapshot(page).await);
            tried = enrich(&mut action, candidates);
        }

        if action.action_type.needs_target() && action.selector.is_none() {
            if snapshot.is_none() {
                snapshot = Some(take_snapshot(page).await);
            }
            let candidates = snapshot.as_deref().unwrap_or_default();

            match self.resolve(command, candidates).await {
                Some(m) => {
                    action.element = candidates.get(m.index).map(MatchedElement::from);
                    action.selector = Some(m.selector);
                    tried = Some(m.index);
                }
                None => {
                    tracing::warn!("No element resolved for '{}' ({})", action.description, command);
                    return action.failed(NO_ELEMENT_FOUND);
                }
            }
        }

        action.attempts += 1;
        let primary_error = match self.executor.execute(page, &action).await {
            Ok(()) => return action.succeeded(),
            Err(e) => e,
        };
        tracing::warn!(
            "{} action failed on {}: {}",
            action.action_type,
            action.selector.as_deref().unwrap_or("-"),
            primary_error
        );

        let retryable = action.action_type.needs_target()
            && !matches!(primary_error, BrowserError::MissingParameter(_));
        if !retryable {
            return action.failed(primary_error.to_string());
        }

        let candidates = match snapshot {
            Some(candidates) => candidates,
            None => take_snapshot(page).await,
        };
        self.fall_back(page, action, &candidates, tried, primary_error)
            .await
    }

    /// Heuristic over the whole snapshot, then the ranker over its capped prefix
    async fn resolve(&self, command: &str, candidates: &[CandidateElement]) -> Option<ElementMatch> {
        if let Some(m) = heuristic_match(command, candidates) {
            tracing::info!("Heuristic resolved '{}' to {}", command, m.selector);
            return Some(m);
        }
        self.ranker.rank(command, candidates).await
    }

    /// Retry against the capped candidate set in order, skipping the index
    /// already tried. Stops at the first success.
    async fn fall_back(
        &self,
        page: &dyn LivePage,
        mut action: PlannedAction,
        candidates: &[CandidateElement],
        tried: Option<usize>,
        primary_error: BrowserError,
    ) -> ExecutedAction {
        let mut last_error = primary_error.to_string();

        for (position, candidate) in candidates.iter().enumerate().take(self.fallback_cap) {
            if Some(position) == tried {
                continue;
            }

            let selector = build_selector(candidate);
            action.selector = Some(selector.clone());
            action.element = Some(MatchedElement::from(candidate));
            action.attempts += 1;

            tracing::info!("Fallback attempt {} with {}", action.attempts, selector);
            match self.executor.execute(page, &action).await {
                Ok(()) => return action.succeeded(),
                Err(e) => {
                    tracing::warn!("Fallback {} failed: {}", selector, e);
                    last_error = e.to_string();
                }
            }
        }

        tracing::warn!(
            "All {} attempt(s) failed for '{}'",
            action.attempts,
            action.description
        );
        action.failed(last_error)
    }
}

async fn take_snapshot(page: &dyn LivePage) -> Vec<CandidateElement> {
    match extract_candidates(page).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!("Candidate extraction failed: {}", e);
            Vec::new()
        }
    }
}

/// Re-associate a planner-supplied selector with a live candidate.
///
/// Tries, in order: identical built selector, exact text, contained text,
/// then the argument of a `:has-text("...")` selector. On a match the
/// action takes the candidate's attributes and robust selector; otherwise it
/// is left untouched. Returns the matched position.
pub fn enrich(action: &mut PlannedAction, candidates: &[CandidateElement]) -> Option<usize> {
    let selector = action.selector.clone()?;

    // For type actions `text` is the input value, not a label
    let label = match action.action_type {
        ActionType::Type => None,
        _ => action
            .text
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty()),
    };

    let by_selector = || candidates.iter().position(|c| build_selector(c) == selector);
    let by_exact_text = || {
        let label = label.as_deref()?;
        candidates
            .iter()
            .position(|c| !c.text.is_empty() && c.text.to_lowercase() == label)
    };
    let by_contained_text = || {
        let label = label.as_deref()?;
        candidates
            .iter()
            .position(|c| !c.text.is_empty() && c.text.to_lowercase().contains(label))
    };
    let by_has_text = || {
        let inner = parse_has_text(&selector)?.trim().to_lowercase();
        if inner.is_empty() {
            return None;
        }
        candidates
            .iter()
            .position(|c| c.text.to_lowercase().contains(&inner))
    };

    let position = by_selector()
        .or_else(by_exact_text)
        .or_else(by_contained_text)
        .or_else(by_has_text);

    match position {
        Some(position) => {
            let candidate = &candidates[position];
            action.element = Some(MatchedElement::from(candidate));
            action.selector = Some(build_selector(candidate));
            tracing::debug!(
                "Enriched {} -> {}",
                selector,
                action.selector.as_deref().unwrap_or_default()
            );
        }
        None => tracing::debug!("No live candidate for selector {}", selector),
    }
    position
}
