//! Live browser sessions keyed by demo session id.
//! Explicit create/teardown; no ambient state.

use crate::agent::page::{LivePage, PageLauncher};
use crate::config::BrowserConfig;
use crate::error::{DemoError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// One demo's page plus the gate that serializes its commands
pub struct LiveSession {
    pub id: String,
    pub website: String,
    pub page: Arc<dyn LivePage>,
    command_gate: Mutex<()>,
}

impl LiveSession {
    /// Hold for the whole of one command so commands never interleave on a page
    pub async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.command_gate.lock().await
    }
}

pub type SessionHandle = Arc<LiveSession>;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    launcher: Arc<dyn PageLauncher>,
    browser: BrowserConfig,
    navigation_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        launcher: Arc<dyn PageLauncher>,
        browser: BrowserConfig,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            launcher,
            browser,
            navigation_timeout,
        }
    }

    /// Launch a page, open `website` and register it under `id`
    pub async fn start(&self, id: &str, website: &str) -> Result<SessionHandle> {
        if self.sessions.lock().await.contains_key(id) {
            return Err(DemoError::SessionExists(id.to_string()));
        }

        let url = normalize_website(website);
        let page = self.launcher.launch(&self.browser).await?;
        if let Err(e) = page.goto(&url, self.navigation_timeout).await {
            let _ = page.close().await;
            return Err(e.into());
        }

        let session = Arc::new(LiveSession {
            id: id.to_string(),
            website: url.clone(),
            page,
            command_gate: Mutex::new(()),
        });

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(id) {
            // Lost a race with a concurrent start for the same id
            let _ = session.page.close().await;
            return Err(DemoError::SessionExists(id.to_string()));
        }
        sessions.insert(id.to_string(), Arc::clone(&session));
        tracing::info!("Browser session {} started at {}", id, url);
        Ok(session)
    }

    /// Live session for `id`, or `SessionNotFound`
    pub async fn get(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DemoError::SessionNotFound(id.to_string()))
    }

    /// Close the session's page and forget it
    pub async fn end(&self, id: &str) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| DemoError::SessionNotFound(id.to_string()))?;

        if let Err(e) = session.page.close().await {
            tracing::warn!("Error closing browser for session {}: {}", id, e);
        }
        tracing::info!("Browser session {} ended", id);
        Ok(())
    }

    /// Tear down every session (e.g. on shutdown)
    pub async fn end_all(&self) {
        let drained: Vec<SessionHandle> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in drained {
            let _ = session.page.close().await;
            tracing::info!("Browser session {} ended", session.id);
        }
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }
}

/// Prefix `https://` when the website has no scheme
pub fn normalize_website(website: &str) -> String {
    let website = website.trim();
    if website.contains("://") || website.starts_with("about:") || website.starts_with("data:") {
        website.to_string()
    } else {
        format!("https://{}", website)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_website() {
        assert_eq!(normalize_website("example.com"), "https://example.com");
        assert_eq!(normalize_website(" http://localhost:3000 "), "http://localhost:3000");
        assert_eq!(normalize_website("about:blank"), "about:blank");
    }
}
