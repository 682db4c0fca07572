use crate::agent::page::{BrowserResult, LivePage};
use crate::agent::types::{ActionType, PlannedAction};
use crate::config::PipelineConfig;
use crate::error::BrowserError;
use std::time::Duration;

/// Performs one planned action against the live page.
///
/// This is the only code path that mutates page state.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    action_timeout: Duration,
    navigation_timeout: Duration,
    wait: Duration,
    scroll_offset: i64,
}

impl ActionExecutor {
    pub fn new(pipeline: &PipelineConfig) -> Self {
        Self {
            action_timeout: Duration::from_millis(pipeline.action_timeout_ms),
            navigation_timeout: Duration::from_millis(pipeline.navigation_timeout_ms),
            wait: Duration::from_millis(pipeline.wait_ms),
            scroll_offset: pipeline.scroll_offset,
        }
    }

    /// Execute an action
    pub async fn execute(&self, page: &dyn LivePage, action: &PlannedAction) -> BrowserResult<()> {
        match action.action_type {
            ActionType::Click => match (&action.selector, action.coordinates) {
                (Some(selector), _) => {
                    page.click(selector, self.action_timeout).await?;
                    tracing::info!("Clicked {}", selector);
                }
                (None, Some(c)) => {
                    page.mouse_click(c.x, c.y).await?;
                    tracing::info!("Clicked at ({}, {})", c.x, c.y);
                }
                (None, None) => {
                    return Err(BrowserError::MissingParameter(
                        "Click action requires a selector or coordinates".to_string(),
                    ))
                }
            },

            ActionType::Type => match (&action.selector, &action.text) {
                (Some(selector), Some(text)) => {
                    page.fill(selector, text, self.action_timeout).await?;
                    tracing::info!("Typed '{}' into {}", text, selector);
                }
                _ => {
                    return Err(BrowserError::MissingParameter(
                        "Type action requires a selector and text".to_string(),
                    ))
                }
            },

            ActionType::Navigate => match &action.url {
                Some(url) => {
                    page.goto(url, self.navigation_timeout).await?;
                    tracing::info!("Navigated to {}", url);
                }
                None => tracing::debug!("Navigate action without url, skipping"),
            },

            ActionType::Scroll => {
                let result = match action.coordinates {
                    Some(c) => page.scroll_to(c.x, c.y).await,
                    None => page.scroll_by(0.0, self.scroll_offset as f64).await,
                };
                // Scrolling is best effort
                if let Err(e) = result {
                    tracing::warn!("Scroll failed: {}", e);
                }
            }

            ActionType::Hover => match &action.selector {
                Some(selector) => {
                    page.hover(selector, self.action_timeout).await?;
                    tracing::info!("Hovered {}", selector);
                }
                None => tracing::debug!("Hover action without selector, skipping"),
            },

            ActionType::Wait => {
                tokio::time::sleep(self.wait).await;
            }
        }

        Ok(())
    }
}
