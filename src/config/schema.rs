use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Language-model providers
    #[serde(default)]
    pub ai: AIConfig,

    /// Resolution and execution tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Local HTTP API
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory holding one JSON file per demo session
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            ai: AIConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
            sessions_dir: default_sessions_dir(),
        }
    }
}

fn default_sessions_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("demo-agent"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sessions")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome executable path
    #[serde(default = "default_chrome_path")]
    pub chrome_path: PathBuf,

    /// Run without a visible window
    #[serde(default)]
    pub headless: bool,

    #[serde(default)]
    pub viewport: Viewport,

    /// User agent override applied to every page
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Delay inserted before every browser primitive
    #[serde(default)]
    pub slow_mo_ms: u64,

    /// Custom launch arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: default_chrome_path(),
            headless: false,
            viewport: Viewport::default(),
            user_agent: default_user_agent(),
            slow_mo_ms: 0,
            extra_args: Vec::new(),
        }
    }
}

/// Get default Chrome path based on platform
fn default_chrome_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from("/usr/bin/google-chrome")
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

// ==================== AI Configuration ====================

/// API type for the provider
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    Openai,
    Anthropic,
    Ollama,
}

/// AI Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name for this provider
    pub name: String,
    /// API type (determines request format)
    #[serde(default)]
    pub api_type: ApiType,
    /// Base URL for the API
    pub base_url: String,
    /// API key; falls back to `<PROVIDER_ID>_API_KEY` from the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Available models for this provider
    #[serde(default)]
    pub models: Vec<String>,
}

impl ProviderConfig {
    /// Configured key, or the `<PROVIDER_ID>_API_KEY` environment variable.
    pub fn resolve_api_key(&self, provider_id: &str) -> Option<String> {
        self.api_key.clone().or_else(|| {
            let var = format!("{}_API_KEY", provider_id.to_uppercase().replace('-', "_"));
            std::env::var(var).ok().filter(|k| !k.is_empty())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIConfig {
    /// Model used for planning and narration (format: "provider_id:model_name")
    #[serde(default = "default_llm")]
    pub default_llm: Option<String>,

    /// Model used for element ranking; falls back to `default_llm`
    #[serde(default = "default_ranking_llm")]
    pub ranking_llm: Option<String>,

    /// AI providers configuration (key = provider id, value = config)
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for AIConfig {
    fn default() -> Self {
        Self {
            default_llm: default_llm(),
            ranking_llm: default_ranking_llm(),
            providers: default_providers(),
        }
    }
}

fn default_llm() -> Option<String> {
    Some("openai:gpt-4o-mini".to_string())
}

fn default_ranking_llm() -> Option<String> {
    Some("openai:gpt-4o".to_string())
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut providers = HashMap::new();
    providers.insert(
        "openai".to_string(),
        ProviderConfig {
            name: "OpenAI".to_string(),
            api_type: ApiType::Openai,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
        },
    );
    providers
}

// ==================== Pipeline ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Candidates sent to the ranking model and walked by fallback
    #[serde(default = "default_rank_cap")]
    pub rank_candidate_cap: usize,

    /// Actionable elements included in the planning prompt
    #[serde(default = "default_plan_cap")]
    pub plan_element_cap: usize,

    /// Elements kept by the coarse page analysis
    #[serde(default = "default_analysis_cap")]
    pub analysis_element_cap: usize,

    /// Bound for click/fill/hover element lookup
    #[serde(default = "default_action_timeout")]
    pub action_timeout_ms: u64,

    /// Bound for navigation to reach network idle
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Pause performed by `wait` actions
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Pixels scrolled down by a `scroll` action without coordinates
    #[serde(default = "default_scroll_offset")]
    pub scroll_offset: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rank_candidate_cap: default_rank_cap(),
            plan_element_cap: default_plan_cap(),
            analysis_element_cap: default_analysis_cap(),
            action_timeout_ms: default_action_timeout(),
            navigation_timeout_ms: default_navigation_timeout(),
            wait_ms: default_wait_ms(),
            scroll_offset: default_scroll_offset(),
        }
    }
}

fn default_rank_cap() -> usize {
    30
}

fn default_plan_cap() -> usize {
    10
}

fn default_analysis_cap() -> usize {
    20
}

fn default_action_timeout() -> u64 {
    10_000
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_wait_ms() -> u64 {
    2_000
}

fn default_scroll_offset() -> i64 {
    500
}

// ==================== Server ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Required `X-API-Key` header value, when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_origins: default_cors_origins(),
            api_key: None,
        }
    }
}

fn default_port() -> u16 {
    3001
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
