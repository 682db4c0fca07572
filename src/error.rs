use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Session {0} not found or inactive")]
    SessionNotFound(String),

    #[error("Session {0} already exists")]
    SessionExists(String),
}

pub type Result<T> = std::result::Result<T, DemoError>;

/// Failures of the live browser context.
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Could not reach Chrome's debugging endpoint.
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP answered with an error object.
    #[error("CDP error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The action lacks a field its type requires.
    #[error("{0}")]
    MissingParameter(String),

    #[error("Browser session closed")]
    SessionClosed,

    #[error("Failed to launch Chrome: {0}")]
    Launch(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for BrowserError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BrowserError::WebSocket(e.to_string())
    }
}

impl From<reqwest::Error> for BrowserError {
    fn from(e: reqwest::Error) -> Self {
        BrowserError::Http(e.to_string())
    }
}

/// Failures of the language-model oracle.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("No LLM configured for {0}")]
    NotConfigured(String),

    #[error("Invalid model selection '{0}'. Expected 'provider_id:model_name'")]
    InvalidSelection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Failed to parse model output: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Request(e.to_string())
    }
}
