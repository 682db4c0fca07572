use crate::agent::session::SessionRegistry;
use crate::agent::{DemoAgent, PageLauncher};
use crate::api::ws::{WsBroadcaster, WsEvent};
use crate::config::AppConfig;
use crate::demo::{DemoService, SessionStore};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Application global state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub demos: Arc<DemoService>,
    /// WebSocket broadcaster for real-time events.
    pub events: WsBroadcaster,
}

impl AppState {
    /// Wire the service graph from its parts; tests inject fake launchers,
    /// stores and agents here.
    pub fn new(
        config: AppConfig,
        launcher: Arc<dyn PageLauncher>,
        store: Arc<dyn SessionStore>,
        agent: DemoAgent,
    ) -> Self {
        let events = WsBroadcaster::new();
        let registry = SessionRegistry::new(
            launcher,
            config.browser.clone(),
            Duration::from_millis(config.pipeline.navigation_timeout_ms),
        );
        let demos = DemoService::new(registry, store, agent, events.clone());

        Self {
            config: Arc::new(RwLock::new(config)),
            demos: Arc::new(demos),
            events,
        }
    }

    /// Broadcast a WebSocket event to all connected clients.
    pub fn broadcast_ws(&self, event: WsEvent) {
        self.events.broadcast(event);
    }
}
