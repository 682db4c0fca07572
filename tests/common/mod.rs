//! Scripted fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use demo_agent::agent::llm::{LlmProvider, LlmRequest, LlmResponse, LlmResult, TokenUsage};
use demo_agent::agent::page::{BrowserResult, LivePage, PageLauncher};
use demo_agent::agent::types::{CandidateElement, PageElement};
use demo_agent::config::{BrowserConfig, PipelineConfig};
use demo_agent::error::{BrowserError, LlmError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// FakePage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PageState {
    url: String,
    title: String,
    candidates: Vec<CandidateElement>,
    analysis: Vec<PageElement>,
    failing_selectors: HashSet<String>,
    fail_all_targets: bool,
    fail_analysis: bool,
    calls: Vec<String>,
    closed: bool,
}

/// In-memory page: serves scripted snapshots and records every primitive.
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.to_string(),
                title: title.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn with_candidates(self, candidates: Vec<CandidateElement>) -> Self {
        self.state.lock().candidates = candidates;
        self
    }

    pub fn with_analysis(self, elements: Vec<PageElement>) -> Self {
        self.state.lock().analysis = elements;
        self
    }

    /// Make click/fill/hover on `selector` fail as if the node were detached
    pub fn fail_selector(&self, selector: &str) {
        self.state.lock().failing_selectors.insert(selector.to_string());
    }

    pub fn fail_all_targets(&self) {
        self.state.lock().fail_all_targets = true;
    }

    pub fn fail_analysis(&self) {
        self.state.lock().fail_analysis = true;
    }

    /// Every primitive invoked, as `kind:arg` strings, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{}:", kind);
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn target(&self, kind: &str, selector: &str) -> BrowserResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        state.calls.push(format!("{}:{}", kind, selector));
        if state.fail_all_targets || state.failing_selectors.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    fn record(&self, call: String) -> BrowserResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrowserError::SessionClosed);
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl LivePage for FakePage {
    async fn evaluate(&self, expression: &str) -> BrowserResult<Value> {
        let state = self.state.lock();
        if expression.starts_with("/* candidates */") {
            return Ok(serde_json::to_value(&state.candidates)?);
        }
        if expression.starts_with("/* analysis */") {
            if state.fail_analysis {
                return Err(BrowserError::JavaScript("analysis script threw".to_string()));
            }
            return Ok(serde_json::to_value(&state.analysis)?);
        }
        Ok(Value::Null)
    }

    async fn url(&self) -> BrowserResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> BrowserResult<String> {
        Ok(self.state.lock().title.clone())
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
        self.target("click", selector)
    }

    async fn mouse_click(&self, x: f64, y: f64) -> BrowserResult<()> {
        self.record(format!("mouse_click:{},{}", x, y))
    }

    async fn fill(&self, selector: &str, text: &str, _timeout: Duration) -> BrowserResult<()> {
        self.target("fill", selector)?;
        self.record(format!("filled:{}", text))
    }

    async fn hover(&self, selector: &str, _timeout: Duration) -> BrowserResult<()> {
        self.target("hover", selector)
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        self.record(format!("goto:{}", url))?;
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> BrowserResult<()> {
        self.record(format!("scroll_to:{},{}", x, y))
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> BrowserResult<()> {
        self.record(format!("scroll_by:{},{}", dx, dy))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Hands out the same fake page for every launch, or fails every launch
pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self { page, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            page: Arc::new(FakePage::new("about:blank", "")),
            fail: true,
        }
    }
}

#[async_trait]
impl PageLauncher for FakeLauncher {
    async fn launch(&self, _config: &BrowserConfig) -> BrowserResult<Arc<dyn LivePage>> {
        if self.fail {
            return Err(BrowserError::Launch("chrome not installed".to_string()));
        }
        let page: Arc<dyn LivePage> = self.page.clone();
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

const PLAN_MARKER: &str = "generate a list of specific actions";
const RANK_MARKER: &str = "Choose the element (by index)";
const EXPLAIN_MARKER: &str = "live product demonstration";

/// Oracle with one canned reply per purpose; `None` makes that call fail.
#[derive(Default)]
pub struct ScriptedLlm {
    plan: Option<String>,
    rank: Option<String>,
    explain: Option<String>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, reply: &str) -> Self {
        self.plan = Some(reply.to_string());
        self
    }

    pub fn rank(mut self, reply: &str) -> Self {
        self.rank = Some(reply.to_string());
        self
    }

    pub fn explain(mut self, reply: &str) -> Self {
        self.explain = Some(reply.to_string());
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub fn rank_calls(&self) -> usize {
        self.count(RANK_MARKER)
    }

    pub fn plan_calls(&self) -> usize {
        self.count(PLAN_MARKER)
    }

    pub fn plan_prompts(&self) -> Vec<String> {
        self.prompts_with(PLAN_MARKER)
    }

    pub fn rank_prompts(&self) -> Vec<String> {
        self.prompts_with(RANK_MARKER)
    }

    pub fn explain_prompts(&self) -> Vec<String> {
        self.prompts_with(EXPLAIN_MARKER)
    }

    fn prompts_with(&self, marker: &str) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.prompt_text())
            .filter(|p| p.contains(marker))
            .collect()
    }

    fn count(&self, marker: &str) -> usize {
        self.prompts_with(marker).len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, request: &LlmRequest) -> LlmResult<LlmResponse> {
        self.requests.lock().push(request.clone());
        let prompt = request.prompt_text();

        let reply = if prompt.contains(RANK_MARKER) {
            &self.rank
        } else if prompt.contains(PLAN_MARKER) {
            &self.plan
        } else if prompt.contains(EXPLAIN_MARKER) {
            &self.explain
        } else {
            &None
        };

        match reply {
            Some(content) => Ok(LlmResponse {
                content: content.clone(),
                model: "scripted".to_string(),
                usage: TokenUsage::default(),
            }),
            None => Err(LlmError::Request("scripted failure".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn candidate(index: usize, tag: &str, text: &str) -> CandidateElement {
    CandidateElement {
        index,
        tag: tag.to_string(),
        text: text.to_string(),
        visible: true,
        enabled: true,
        ..Default::default()
    }
}

/// Visible, clickable element as reported by the page scan
pub fn page_element(selector: &str, element_type: &str, text: &str) -> PageElement {
    PageElement {
        selector: selector.to_string(),
        text: text.to_string(),
        element_type: element_type.to_string(),
        visible: true,
        clickable: true,
        aria_label: None,
        role: None,
    }
}

/// Pipeline tuned for tests: no real waiting
pub fn test_pipeline() -> PipelineConfig {
    PipelineConfig {
        wait_ms: 0,
        action_timeout_ms: 50,
        navigation_timeout_ms: 50,
        ..Default::default()
    }
}

/// Planner reply with the given actions
pub fn plan_json(actions: Value) -> String {
    serde_json::json!({ "actions": actions }).to_string()
}
