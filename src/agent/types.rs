use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Element box in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A DOM node judged potentially interactable.
///
/// Produced fresh by every snapshot, in DOM traversal order. The `index` is
/// only meaningful within the snapshot that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateElement {
    pub index: usize,
    /// Lowercase tag name
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_testid: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_text: Option<String>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bounding_box: BoundingBox,
}

impl CandidateElement {
    /// Attribute value if present and non-blank.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Abstract UI action kinds the planner may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Click,
    Type,
    Navigate,
    Scroll,
    Hover,
    Wait,
}

impl ActionType {
    /// Click and type need a concrete target element.
    pub fn needs_target(self) -> bool {
        matches!(self, ActionType::Click | ActionType::Type)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::Click => "click",
            ActionType::Type => "type",
            ActionType::Navigate => "navigate",
            ActionType::Scroll => "scroll",
            ActionType::Hover => "hover",
            ActionType::Wait => "wait",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// Live element attributes copied onto an action once it is tied to a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedElement {
    pub index: usize,
    pub tag: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_testid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub visible: bool,
    pub enabled: bool,
}

impl From<&CandidateElement> for MatchedElement {
    fn from(c: &CandidateElement) -> Self {
        Self {
            index: c.index,
            tag: c.tag.clone(),
            text: c.text.clone(),
            aria_label: c.aria_label.clone(),
            title: c.title.clone(),
            data_testid: c.data_testid.clone(),
            role: c.attribute("role").map(str::to_string),
            visible: c.visible,
            enabled: c.enabled,
        }
    }
}

/// One step of an action plan.
///
/// Created by the planner with `success = false`, then filled in by the
/// resolver (selector, element) and the executor (success, timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    pub description: String,
    #[serde(default)]
    pub success: bool,
    /// Unix ms; pending until executed
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<MatchedElement>,
    /// Execution attempts made, primary plus fallbacks
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlannedAction {
    pub fn new(action_type: ActionType, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            selector: None,
            text: None,
            url: None,
            coordinates: None,
            description: description.into(),
            success: false,
            timestamp: now_ms(),
            element: None,
            attempts: 0,
            error: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_coordinates(mut self, x: f64, y: f64) -> Self {
        self.coordinates = Some(Coordinates { x, y });
        self
    }

    /// Terminal success state.
    pub fn succeeded(mut self) -> ExecutedAction {
        self.success = true;
        self.error = None;
        self.timestamp = now_ms();
        self
    }

    /// Terminal failure state; the description is preserved.
    pub fn failed(mut self, error: impl Into<String>) -> ExecutedAction {
        self.success = false;
        self.error = Some(error.into());
        self.timestamp = now_ms();
        self
    }
}

/// A planned action after execution; `success` and `timestamp` are authoritative.
pub type ExecutedAction = PlannedAction;

/// The target picked for an action: a selector plus the candidate's position
/// in the list it was picked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMatch {
    pub selector: String,
    pub index: usize,
}

/// Coarse element summary used as planning context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    pub selector: String,
    pub text: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub visible: bool,
    pub clickable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Site category inferred from the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteCategory {
    #[default]
    General,
    Development,
    Ecommerce,
    Social,
    Professional,
}

impl fmt::Display for SiteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteCategory::General => "general",
            SiteCategory::Development => "development",
            SiteCategory::Ecommerce => "ecommerce",
            SiteCategory::Social => "social",
            SiteCategory::Professional => "professional",
        };
        f.write_str(s)
    }
}

/// Read-only per-command summary of the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub domain: String,
    pub title: String,
    pub category: SiteCategory,
    pub main_elements: Vec<PageElement>,
    pub navigation_elements: Vec<PageElement>,
    pub actionable_elements: Vec<PageElement>,
    pub key_features: Vec<String>,
}

/// Result of processing one command: every action plus a narration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub id: String,
    pub explanation: String,
    pub actions: Vec<ExecutedAction>,
}
