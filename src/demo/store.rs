//! Demo session persistence: one pretty-printed JSON file per session,
//! fronted by an in-memory cache.

use crate::agent::types::ExecutedAction;
use crate::demo::schema::{DemoSession, EntryKind, SessionStatus, Speaker, TranscriptEntry};
use crate::error::{DemoError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, id: &str, website: &str) -> Result<DemoSession>;

    async fn get(&self, id: &str) -> Result<Option<DemoSession>>;

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<DemoSession>;

    async fn add_transcript_entry(
        &self,
        id: &str,
        speaker: Speaker,
        content: &str,
        kind: EntryKind,
    ) -> Result<TranscriptEntry>;

    async fn add_action(&self, id: &str, action: &ExecutedAction) -> Result<()>;

    async fn list(&self) -> Result<Vec<DemoSession>>;

    /// Remove the record; false when there was none
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Session ids become file names; keep them to a safe alphabet
pub fn validate_session_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DemoError::Validation(format!("Invalid session id '{}'", id)))
    }
}

pub struct JsonSessionStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, DemoSession>>,
}

impl JsonSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn write(&self, session: &DemoSession) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let text = serde_json::to_string_pretty(session)?;
        tokio::fs::write(self.path_for(&session.id), text).await?;
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Option<DemoSession>> {
        match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `change` to the cached (or on-disk) record and persist it
    async fn modify<F>(&self, id: &str, change: F) -> Result<DemoSession>
    where
        F: FnOnce(&mut DemoSession) + Send,
    {
        let mut session = self
            .get(id)
            .await?
            .ok_or_else(|| DemoError::SessionNotFound(id.to_string()))?;
        change(&mut session);
        self.cache.lock().insert(id.to_string(), session.clone());
        self.write(&session).await?;
        Ok(session)
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn create(&self, id: &str, website: &str) -> Result<DemoSession> {
        validate_session_id(id)?;
        let session = DemoSession::new(id, website);
        self.cache.lock().insert(id.to_string(), session.clone());
        self.write(&session).await?;
        tracing::info!("Created session {} for {}", id, website);
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<DemoSession>> {
        validate_session_id(id)?;
        let cached = self.cache.lock().get(id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let loaded = self.read(id).await?;
        if let Some(session) = &loaded {
            self.cache.lock().insert(id.to_string(), session.clone());
        }
        Ok(loaded)
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<DemoSession> {
        let session = self.modify(id, |s| s.set_status(status)).await?;
        tracing::info!("Session {} status -> {:?}", id, status);
        Ok(session)
    }

    async fn add_transcript_entry(
        &self,
        id: &str,
        speaker: Speaker,
        content: &str,
        kind: EntryKind,
    ) -> Result<TranscriptEntry> {
        let entry = TranscriptEntry::new(speaker, content, kind);
        let pushed = entry.clone();
        self.modify(id, move |s| s.transcript.push(pushed)).await?;
        Ok(entry)
    }

    async fn add_action(&self, id: &str, action: &ExecutedAction) -> Result<()> {
        let action = action.clone();
        self.modify(id, move |s| s.actions.push(action)).await?;
        Ok(())
    }

    /// Every session on disk plus any cached ones not yet written, oldest first
    async fn list(&self) -> Result<Vec<DemoSession>> {
        let mut sessions: HashMap<String, DemoSession> = HashMap::new();

        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let parsed = tokio::fs::read_to_string(&path)
                        .await
                        .map_err(DemoError::from)
                        .and_then(|text| Ok(serde_json::from_str::<DemoSession>(&text)?));
                    match parsed {
                        Ok(session) => {
                            sessions.insert(session.id.clone(), session);
                        }
                        Err(e) => tracing::warn!("Skipping session file {:?}: {}", path, e),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let cached: Vec<DemoSession> = self.cache.lock().values().cloned().collect();
        for session in cached {
            sessions.insert(session.id.clone(), session);
        }

        let mut sessions: Vec<DemoSession> = sessions.into_values().collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        validate_session_id(id)?;
        let cached = self.cache.lock().remove(id).is_some();

        let on_disk = match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if cached || on_disk {
            tracing::info!("Deleted session {}", id);
        }
        Ok(cached || on_disk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::{ActionType, PlannedAction};

    fn temp_store(label: &str) -> JsonSessionStore {
        let dir = std::env::temp_dir().join(format!(
            "demo_agent_store_{}_{}",
            label,
            uuid::Uuid::new_v4()
        ));
        JsonSessionStore::new(dir)
    }

    #[tokio::test]
    async fn test_create_and_reload_from_disk() {
        let store = temp_store("reload");
        store.create("s1", "https://example.com").await.unwrap();
        store
            .add_transcript_entry("s1", Speaker::User, "show pricing", EntryKind::Voice)
            .await
            .unwrap();
        let action = PlannedAction::new(ActionType::Wait, "Pause").succeeded();
        store.add_action("s1", &action).await.unwrap();

        // A fresh store over the same directory sees the file
        let reopened = JsonSessionStore::new(store.dir().to_path_buf());
        let session = reopened.get("s1").await.unwrap().unwrap();
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript[0].content, "show pricing");
        assert_eq!(session.actions.len(), 1);
        assert!(session.actions[0].success);

        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_update_status_sets_end_time() {
        let store = temp_store("status");
        store.create("s2", "example.com").await.unwrap();
        let ended = store.update_status("s2", SessionStatus::Ended).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Ended);
        assert!(ended.end_time.is_some());
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_missing_session() {
        let store = temp_store("missing");
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(matches!(
            store.update_status("nope", SessionStatus::Paused).await,
            Err(DemoError::SessionNotFound(_))
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_files() {
        let store = temp_store("list");
        store.create("a", "one.com").await.unwrap();
        store.create("b", "two.com").await.unwrap();
        std::fs::write(store.dir().join("broken.json"), "{not json").unwrap();

        let sessions = store.list().await.unwrap();
        assert_eq!(sessions.len(), 2);
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn test_delete_removes_cache_and_file() {
        let store = temp_store("delete");
        store.create("gone", "example.com").await.unwrap();
        assert!(store.dir().join("gone.json").exists());

        assert!(store.delete("gone").await.unwrap());
        assert!(!store.dir().join("gone.json").exists());
        assert!(store.get("gone").await.unwrap().is_none());
        assert!(!store.delete("gone").await.unwrap());
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("abc-123_X").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("a b").is_err());
    }
}
