//! Demo sessions: records, persistence and orchestration.

pub mod schema;
pub mod service;
pub mod store;

pub use schema::{
    CommandResponse, DemoSession, EntryKind, SessionFilter, SessionStatus, SessionSummary, Speaker,
    TranscriptEntry,
};
pub use service::DemoService;
pub use store::{JsonSessionStore, SessionStore};
