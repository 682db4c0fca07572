use crate::agent::page::{BrowserResult, LivePage, PageLauncher};
use crate::config::BrowserConfig;
use crate::error::BrowserError;
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

/// Global port counter for CDP connections (starts at 9222, increments for each new page)
static CDP_PORT_COUNTER: AtomicU16 = AtomicU16::new(9222);

/// Get next available CDP port
fn get_next_cdp_port() -> u16 {
    let port = CDP_PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    // Wrap around if we exceed practical port range
    if port > 65500 {
        CDP_PORT_COUNTER.store(9222, Ordering::SeqCst);
        return 9222;
    }
    port
}

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EVENT_CAPACITY: usize = 256;

/// In-page resolver for the selectors the pipeline builds: plain CSS plus a
/// trailing `:has-text("...")` filter (case-insensitive containment).
const RESOLVE_ELEMENT_JS: &str = r##"(function(selector) {
    const m = selector.match(/^(.*?):has-text\("((?:[^"\\]|\\.)*)"\)$/);
    if (!m) {
        return document.querySelector(selector);
    }
    const base = m[1] || "*";
    const needle = m[2].replace(/\\(.)/g, "$1").replace(/\s+/g, " ").trim().toLowerCase();
    for (const el of document.querySelectorAll(base)) {
        const text = (el.innerText || el.textContent || "").replace(/\s+/g, " ").toLowerCase();
        if (text.includes(needle)) {
            return el;
        }
    }
    return null;
})"##;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, WsMessage>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// A Chrome page driven over the DevTools protocol with a raw WebSocket
pub struct CdpPage {
    ws_tx: Mutex<Option<WsSink>>,
    /// Waiting command senders keyed by message id
    responses: PendingMap,
    /// Protocol events (messages without an id)
    events: broadcast::Sender<Value>,
    msg_id: AtomicU64,
    chrome: parking_lot::Mutex<Option<Child>>,
    cdp_port: u16,
    slow_mo: Duration,
}

impl CdpPage {
    /// Launch Chrome with remote debugging enabled and attach to its first page
    pub async fn launch(config: &BrowserConfig) -> BrowserResult<Self> {
        let cdp_port = get_next_cdp_port();
        let user_data_dir = std::env::temp_dir()
            .join("demo-agent-profiles")
            .join(uuid::Uuid::new_v4().to_string());

        let mut cmd = Command::new(&config.chrome_path);
        cmd.arg(format!("--user-data-dir={}", user_data_dir.display()));
        cmd.arg(format!("--remote-debugging-port={}", cdp_port));
        cmd.arg(format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ));

        if config.headless {
            cmd.arg("--headless=new");
        }

        cmd.arg("--no-first-run");
        cmd.arg("--no-default-browser-check");
        cmd.arg("--no-sandbox");
        cmd.arg("--disable-setuid-sandbox");
        cmd.arg("--disable-dev-shm-usage");
        cmd.arg("--disable-gpu");
        cmd.arg("--disable-background-networking");
        cmd.arg("--disable-sync");

        for arg in &config.extra_args {
            cmd.arg(arg);
        }

        // Start about:blank to avoid loading a page
        cmd.arg("about:blank");
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("{:?}: {}", config.chrome_path, e)))?;
        tracing::info!(
            "Launched Chrome pid={} cdp_port={}",
            child.id(),
            cdp_port
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let page = Self {
            ws_tx: Mutex::new(None),
            responses: Arc::new(Mutex::new(HashMap::new())),
            events,
            msg_id: AtomicU64::new(1),
            chrome: parking_lot::Mutex::new(Some(child)),
            cdp_port,
            slow_mo: Duration::from_millis(config.slow_mo_ms),
        };

        let ws_url = page.discover_page_target().await?;
        page.connect(&ws_url).await?;
        page.prepare(config).await?;
        Ok(page)
    }

    /// Poll `/json/list` until Chrome exposes a page target
    async fn discover_page_target(&self) -> BrowserResult<String> {
        const MAX_RETRIES: u32 = 30;
        let list_url = format!("http://127.0.0.1:{}/json/list", self.cdp_port);
        let mut last_error = String::new();

        for retry in 1..=MAX_RETRIES {
            tokio::time::sleep(Duration::from_millis(500)).await;

            match reqwest::get(&list_url).await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Value>().await {
                        Ok(targets) => {
                            let ws_url = targets.as_array().and_then(|arr| {
                                arr.iter()
                                    .find(|t| t.get("type").and_then(Value::as_str) == Some("page"))
                                    .and_then(|t| t.get("webSocketDebuggerUrl"))
                                    .and_then(Value::as_str)
                            });
                            match ws_url {
                                Some(url) => return Ok(url.to_string()),
                                None => last_error = "No page target found".to_string(),
                            }
                        }
                        Err(e) => last_error = format!("Failed to parse targets response: {}", e),
                    }
                }
                Ok(response) => last_error = format!("HTTP error: {}", response.status()),
                Err(e) => last_error = format!("Connection error: {}", e),
            }

            tracing::debug!("Retry {}/{}: {}", retry, MAX_RETRIES, last_error);
        }

        Err(BrowserError::Connection(format!(
            "Failed to reach Chrome after {} retries: {}",
            MAX_RETRIES, last_error
        )))
    }

    async fn connect(&self, ws_url: &str) -> BrowserResult<()> {
        tracing::info!("Connecting to page target WebSocket: {}", ws_url);
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (tx, mut rx) = ws_stream.split();
        *self.ws_tx.lock().await = Some(tx);

        let responses = Arc::clone(&self.responses);
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(msg) = rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        let Ok(json) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = json.get("id").and_then(Value::as_u64) {
                            if let Some(sender) = responses.lock().await.remove(&id) {
                                let _ = sender.send(json);
                            }
                        } else if json.get("method").is_some() {
                            let _ = events.send(json);
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::debug!("WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("WebSocket error: {:?}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // Dropping the senders fails every in-flight command.
            responses.lock().await.clear();
        });

        Ok(())
    }

    /// Enable the domains the pipeline needs and apply viewport and user agent
    async fn prepare(&self, config: &BrowserConfig) -> BrowserResult<()> {
        self.send_command("Page.enable", json!({})).await?;
        self.send_command("Runtime.enable", json!({})).await?;
        self.send_command("Page.setLifecycleEventsEnabled", json!({"enabled": true}))
            .await?;
        self.send_command(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": config.viewport.width,
                "height": config.viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false
            }),
        )
        .await?;
        self.send_command(
            "Emulation.setUserAgentOverride",
            json!({"userAgent": config.user_agent}),
        )
        .await?;
        tracing::info!("CDP domains enabled on port {}", self.cdp_port);
        Ok(())
    }

    /// Send a CDP command and wait for its `result` object
    async fn send_command(&self, method: &str, params: Value) -> BrowserResult<Value> {
        let id = self.msg_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.responses.lock().await.insert(id, tx);

        let command = json!({
            "id": id,
            "method": method,
            "params": params
        });

        {
            let mut guard = self.ws_tx.lock().await;
            let sink = guard.as_mut().ok_or(BrowserError::SessionClosed)?;
            if let Err(e) = sink.send(WsMessage::Text(command.to_string())).await {
                self.responses.lock().await.remove(&id);
                return Err(e.into());
            }
        }

        let response = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(BrowserError::SessionClosed),
            Err(_) => {
                self.responses.lock().await.remove(&id);
                return Err(BrowserError::Timeout(format!("CDP command {}", method)));
            }
        };

        if let Some(error) = response.get("error") {
            return Err(BrowserError::Protocol {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    /// Scroll the element into view and return its centre, or None if absent or zero-sized
    async fn element_center(&self, selector: &str) -> BrowserResult<Option<(f64, f64)>> {
        let expression = format!(
            "(function() {{ const el = {}({}); if (!el) return null; \
             el.scrollIntoView({{block: 'center', inline: 'center'}}); \
             const r = el.getBoundingClientRect(); \
             if (r.width === 0 && r.height === 0) return null; \
             return {{x: r.x + r.width / 2, y: r.y + r.height / 2}}; }})()",
            RESOLVE_ELEMENT_JS,
            serde_json::to_string(selector)?
        );
        let value = self.evaluate(&expression).await?;
        Ok(value
            .get("x")
            .and_then(Value::as_f64)
            .zip(value.get("y").and_then(Value::as_f64)))
    }

    /// Poll for the element until it is present or `timeout` elapses
    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> BrowserResult<(f64, f64)> {
        let start = Instant::now();
        loop {
            if let Some(center) = self.element_center(selector).await? {
                return Ok(center);
            }
            if start.elapsed() >= timeout {
                return Err(BrowserError::ElementNotFound(format!(
                    "{} (waited {}ms)",
                    selector,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn dispatch_mouse(&self, kind: &str, x: f64, y: f64) -> BrowserResult<()> {
        let mut params = json!({"type": kind, "x": x, "y": y});
        if kind != "mouseMoved" {
            params["button"] = json!("left");
            params["clickCount"] = json!(1);
        }
        self.send_command("Input.dispatchMouseEvent", params).await?;
        Ok(())
    }

    async fn click_point(&self, x: f64, y: f64) -> BrowserResult<()> {
        self.dispatch_mouse("mouseMoved", x, y).await?;
        self.dispatch_mouse("mousePressed", x, y).await?;
        self.dispatch_mouse("mouseReleased", x, y).await
    }

    /// Wait for the main frame's `networkIdle` lifecycle event for `loader_id`
    async fn wait_for_network_idle(
        &self,
        events: &mut broadcast::Receiver<Value>,
        loader_id: &str,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.get("method").and_then(Value::as_str) != Some("Page.lifecycleEvent") {
                            continue;
                        }
                        let params = &event["params"];
                        if params["name"] == "networkIdle" && params["loaderId"] == loader_id {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(BrowserError::SessionClosed)
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            BrowserError::Timeout(format!(
                "network idle not reached within {}ms",
                timeout.as_millis()
            ))
        })?
    }

    fn kill_chrome(&self) {
        if let Some(mut child) = self.chrome.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[async_trait]
impl LivePage for CdpPage {
    async fn evaluate(&self, expression: &str) -> BrowserResult<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("evaluation threw");
            return Err(BrowserError::JavaScript(message.to_string()));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn url(&self) -> BrowserResult<String> {
        let value = self.evaluate("window.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> BrowserResult<String> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.pace().await;
        let (x, y) = self.wait_for_element(selector, timeout).await?;
        self.click_point(x, y).await?;
        tracing::debug!("Clicked element: {}", selector);
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> BrowserResult<()> {
        self.pace().await;
        self.click_point(x, y).await?;
        tracing::debug!("Clicked at ({}, {})", x, y);
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> BrowserResult<()> {
        self.pace().await;
        self.wait_for_element(selector, timeout).await?;

        let expression = format!(
            "(function() {{ const el = {}({}); const text = {}; if (!el) return false; \
             el.focus(); \
             if ('value' in el) {{ \
               const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value'); \
               if (desc && desc.set) {{ desc.set.call(el, text); }} else {{ el.value = text; }} \
             }} else if (el.isContentEditable) {{ el.textContent = text; }} else {{ return false; }} \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); \
             return true; }})()",
            RESOLVE_ELEMENT_JS,
            serde_json::to_string(selector)?,
            serde_json::to_string(text)?
        );

        if self.evaluate(&expression).await?.as_bool().unwrap_or(false) {
            tracing::debug!("Filled element: {}", selector);
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(format!(
                "{} is not a fillable element",
                selector
            )))
        }
    }

    async fn hover(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.pace().await;
        let (x, y) = self.wait_for_element(selector, timeout).await?;
        self.dispatch_mouse("mouseMoved", x, y).await?;
        tracing::debug!("Hovered element: {}", selector);
        Ok(())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()> {
        self.pace().await;
        // Subscribe before navigating so the idle event cannot be missed.
        let mut events = self.events.subscribe();
        let result = self.send_command("Page.navigate", json!({"url": url})).await?;

        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(BrowserError::Navigation(format!("{}: {}", url, error)));
        }

        match result.get("loaderId").and_then(Value::as_str) {
            Some(loader_id) => {
                self.wait_for_network_idle(&mut events, loader_id, timeout)
                    .await?
            }
            // Same-document navigation: no new loader, nothing to wait for
            None => tokio::time::sleep(Duration::from_millis(500)).await,
        }

        tracing::info!("Navigated to: {}", url);
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> BrowserResult<()> {
        self.pace().await;
        self.evaluate(&format!("window.scrollTo({}, {})", x, y)).await?;
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> BrowserResult<()> {
        self.pace().await;
        self.evaluate(&format!("window.scrollBy({}, {})", dx, dy))
            .await?;
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        if let Some(mut tx) = self.ws_tx.lock().await.take() {
            let _ = tx.close().await;
        }
        self.kill_chrome();
        tracing::info!("CDP page closed on port {}", self.cdp_port);
        Ok(())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        // Ensure Chrome is killed when the page is dropped
        self.kill_chrome();
    }
}

/// Launches a dedicated Chrome instance per demo session
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

#[async_trait]
impl PageLauncher for CdpLauncher {
    async fn launch(&self, config: &BrowserConfig) -> BrowserResult<Arc<dyn LivePage>> {
        let page = CdpPage::launch(config).await?;
        Ok(Arc::new(page))
    }
}
