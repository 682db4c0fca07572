//! Command-to-action pipeline over a live browser page.

pub mod action;
pub mod cdp;
pub mod engine;
pub mod explain;
pub mod llm;
pub mod matcher;
pub mod page;
pub mod planner;
pub mod ranker;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod types;

pub use cdp::{CdpLauncher, CdpPage};
pub use engine::DemoAgent;
pub use llm::{LlmClient, LlmProvider};
pub use page::{LivePage, PageLauncher};
pub use session::{LiveSession, SessionRegistry};
pub use types::*;
