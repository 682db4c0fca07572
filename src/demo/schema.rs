use crate::agent::types::{now_ms, ExecutedAction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transcript entries longer than this count as key moments
const KEY_MOMENT_MIN_CHARS: usize = 50;
const KEY_MOMENT_COUNT: usize = 5;
const KEY_MOMENT_EXCERPT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Speaker::User => "user",
            Speaker::Ai => "ai",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Voice,
    Text,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: String,
    /// Unix ms
    pub timestamp: u64,
    pub speaker: Speaker,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, content: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_ms(),
            speaker,
            content: content.into(),
            kind,
        }
    }
}

/// Persistent record of one demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSession {
    pub id: String,
    pub website: String,
    pub status: SessionStatus,
    pub start_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub actions: Vec<ExecutedAction>,
}

impl DemoSession {
    pub fn new(id: impl Into<String>, website: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            website: website.into(),
            status: SessionStatus::Starting,
            start_time: now_ms(),
            end_time: None,
            transcript: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Move to `status`; ending stamps `end_time` once
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        if status == SessionStatus::Ended && self.end_time.is_none() {
            self.end_time = Some(now_ms());
        }
    }
}

impl DemoSession {
    /// Totals for reporting. Open sessions are measured up to `now` (Unix ms).
    pub fn summary(&self, now: u64) -> SessionSummary {
        let end = self.end_time.unwrap_or(now);
        let total_duration = (end.saturating_sub(self.start_time) as f64 / 1000.0).round() as u64;

        let command_count = self
            .transcript
            .iter()
            .filter(|t| t.speaker == Speaker::User)
            .count();

        let action_count = self.actions.len();
        let succeeded = self.actions.iter().filter(|a| a.success).count();
        let success_rate = if action_count == 0 {
            0
        } else {
            (succeeded as f64 * 100.0 / action_count as f64).round() as u32
        };

        let long: Vec<&TranscriptEntry> = self
            .transcript
            .iter()
            .filter(|t| t.content.chars().count() > KEY_MOMENT_MIN_CHARS)
            .collect();
        let key_moments = long[long.len().saturating_sub(KEY_MOMENT_COUNT)..]
            .iter()
            .map(|t| {
                let excerpt: String = t.content.chars().take(KEY_MOMENT_EXCERPT).collect();
                format!("{}: {}...", t.speaker, excerpt)
            })
            .collect();

        SessionSummary {
            total_duration,
            command_count,
            action_count,
            success_rate,
            key_moments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Seconds, rounded
    pub total_duration: u64,
    /// User turns in the transcript
    pub command_count: usize,
    pub action_count: usize,
    /// Percent of actions that succeeded, rounded; 0 with no actions
    pub success_rate: u32,
    /// The last few long transcript entries, excerpted
    pub key_moments: Vec<String>,
}

/// Optional criteria for listing sessions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    #[serde(default)]
    pub status: Option<SessionStatus>,
    /// Exact website as given when the demo started
    #[serde(default)]
    pub website: Option<String>,
}

impl SessionFilter {
    pub fn matches(&self, session: &DemoSession) -> bool {
        self.status.map_or(true, |s| session.status == s)
            && self.website.as_deref().map_or(true, |w| session.website == w)
    }
}

/// Reply to one command, as handed to the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: String,
    pub session_id: String,
    pub message: String,
    pub actions: Vec<ExecutedAction>,
    pub timestamp: u64,
}
