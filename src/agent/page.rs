//! Capability surface of a live browser page.
//!
//! The pipeline depends only on this trait; `CdpPage` is the production
//! implementation and tests substitute scripted pages.

use crate::config::BrowserConfig;
use crate::error::BrowserError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

#[async_trait]
pub trait LivePage: Send + Sync {
    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> BrowserResult<serde_json::Value>;

    async fn url(&self) -> BrowserResult<String>;

    async fn title(&self) -> BrowserResult<String>;

    /// Click the first element matching `selector`, waiting up to `timeout` for it.
    async fn click(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// Click at raw viewport coordinates.
    async fn mouse_click(&self, x: f64, y: f64) -> BrowserResult<()>;

    /// Replace the content of the matching input with `text`.
    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> BrowserResult<()>;

    async fn hover(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    /// Navigate and wait for network idle.
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()>;

    async fn scroll_to(&self, x: f64, y: f64) -> BrowserResult<()>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> BrowserResult<()>;

    /// Tear down the page and its browser; aborts in-flight operations.
    async fn close(&self) -> BrowserResult<()>;
}

/// Opens a fresh page for a new demo session.
#[async_trait]
pub trait PageLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> BrowserResult<Arc<dyn LivePage>>;
}
