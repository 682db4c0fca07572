//! Demo orchestration: ties the session registry, the command pipeline and
//! the record store together. The only layer the transport talks to.

use crate::agent::engine::DemoAgent;
use crate::agent::session::SessionRegistry;
use crate::agent::types::now_ms;
use crate::api::ws::{WsBroadcaster, WsEvent};
use crate::demo::schema::{
    CommandResponse, DemoSession, EntryKind, SessionFilter, SessionStatus, SessionSummary, Speaker,
};
use crate::demo::store::{validate_session_id, SessionStore};
use crate::error::{DemoError, Result};
use std::sync::Arc;

pub struct DemoService {
    registry: SessionRegistry,
    store: Arc<dyn SessionStore>,
    agent: DemoAgent,
    events: WsBroadcaster,
}

impl DemoService {
    pub fn new(
        registry: SessionRegistry,
        store: Arc<dyn SessionStore>,
        agent: DemoAgent,
        events: WsBroadcaster,
    ) -> Self {
        Self {
            registry,
            store,
            agent,
            events,
        }
    }

    /// Create the record, open the browser on `website` and mark it running
    pub async fn start_demo(&self, website: &str, session_id: Option<String>) -> Result<DemoSession> {
        let website = website.trim();
        if website.is_empty() {
            return Err(DemoError::Validation("website is required".to_string()));
        }

        let id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        validate_session_id(&id)?;
        if self.registry.contains(&id).await {
            return Err(DemoError::SessionExists(id));
        }

        self.store.create(&id, website).await?;
        self.status_event(&id, SessionStatus::Starting);

        if let Err(e) = self.registry.start(&id, website).await {
            tracing::error!("Failed to start demo {}: {}", id, e);
            if let Err(store_err) = self.store.update_status(&id, SessionStatus::Ended).await {
                tracing::warn!("Failed to mark session {} ended: {}", id, store_err);
            }
            self.events.broadcast(WsEvent::Error {
                session_id: Some(id.clone()),
                message: format!("Failed to start demo: {}", e),
            });
            return Err(e);
        }

        let session = self.store.update_status(&id, SessionStatus::Running).await?;
        self.events.broadcast(WsEvent::DemoStarted {
            session_id: id.clone(),
            website: session.website.clone(),
        });
        tracing::info!("Demo {} running on {}", id, website);
        Ok(session)
    }

    /// Run one command against a live session.
    ///
    /// `SessionNotFound` is the only failure once the command is accepted;
    /// per-action problems are inside the returned actions.
    pub async fn handle_command(&self, session_id: &str, command: &str) -> Result<CommandResponse> {
        let command = command.trim();
        if command.is_empty() {
            return Err(DemoError::Validation("command is required".to_string()));
        }

        let session = self.registry.get(session_id).await?;
        let _gate = session.lock_commands().await;

        self.record_transcript(session_id, Speaker::User, command, EntryKind::Text)
            .await;

        let outcome = self
            .agent
            .process_command(session.page.as_ref(), command)
            .await;

        for action in &outcome.actions {
            if let Err(e) = self.store.add_action(session_id, action).await {
                tracing::warn!("Failed to record action for {}: {}", session_id, e);
            }
            self.events.broadcast(WsEvent::BrowserAction {
                session_id: session_id.to_string(),
                action: action.clone(),
            });
        }

        self.record_transcript(session_id, Speaker::Ai, &outcome.explanation, EntryKind::Text)
            .await;

        let response = CommandResponse {
            id: outcome.id,
            session_id: session_id.to_string(),
            message: outcome.explanation,
            actions: outcome.actions,
            timestamp: now_ms(),
        };

        self.events.broadcast(WsEvent::AiResponse {
            session_id: session_id.to_string(),
            message: response.message.clone(),
            actions: response.actions.clone(),
            timestamp: response.timestamp,
        });
        Ok(response)
    }

    pub async fn pause_demo(&self, session_id: &str) -> Result<DemoSession> {
        self.registry.get(session_id).await?;
        let session = self.store.update_status(session_id, SessionStatus::Paused).await?;
        self.status_event(session_id, SessionStatus::Paused);
        Ok(session)
    }

    pub async fn resume_demo(&self, session_id: &str) -> Result<DemoSession> {
        self.registry.get(session_id).await?;
        let session = self.store.update_status(session_id, SessionStatus::Running).await?;
        self.status_event(session_id, SessionStatus::Running);
        Ok(session)
    }

    /// Close the browser (if still live) and mark the record ended
    pub async fn end_demo(&self, session_id: &str) -> Result<DemoSession> {
        if let Err(e) = self.registry.end(session_id).await {
            tracing::debug!("No live browser for {}: {}", session_id, e);
        }

        let session = self.store.update_status(session_id, SessionStatus::Ended).await?;
        self.status_event(session_id, SessionStatus::Ended);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<DemoSession> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| DemoError::SessionNotFound(session_id.to_string()))
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<DemoSession>> {
        let mut sessions = self.store.list().await?;
        sessions.retain(|s| filter.matches(s));
        Ok(sessions)
    }

    pub async fn session_summary(&self, session_id: &str) -> Result<SessionSummary> {
        Ok(self.get_session(session_id).await?.summary(now_ms()))
    }

    /// Close any live browser and remove the record for good
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        if self.registry.end(session_id).await.is_ok() {
            self.status_event(session_id, SessionStatus::Ended);
        }
        if !self.store.delete(session_id).await? {
            return Err(DemoError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    pub async fn active_sessions(&self) -> usize {
        self.registry.active_count().await
    }

    /// End every live demo
    pub async fn shutdown(&self) {
        for id in self.registry.ids().await {
            if let Err(e) = self.end_demo(&id).await {
                tracing::warn!("Failed to end demo {} on shutdown: {}", id, e);
            }
        }
        self.registry.end_all().await;
    }

    async fn record_transcript(&self, session_id: &str, speaker: Speaker, content: &str, kind: EntryKind) {
        if let Err(e) = self
            .store
            .add_transcript_entry(session_id, speaker, content, kind)
            .await
        {
            tracing::warn!("Failed to record transcript for {}: {}", session_id, e);
        }
    }

    fn status_event(&self, session_id: &str, status: SessionStatus) {
        self.events.broadcast(WsEvent::DemoStatus {
            session_id: session_id.to_string(),
            status,
        });
    }
}
