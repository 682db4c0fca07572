use crate::config::{AIConfig, ApiType, ProviderConfig};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Longest prompt/response excerpt written to debug logs
const LOG_EXCERPT: usize = 2000;

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request: the prompt plus its sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<LlmMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(messages: Vec<LlmMessage>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            messages,
            temperature,
            max_tokens,
        }
    }

    /// Concatenated message contents, used by scripted providers to dispatch on prompt text
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// The language-model oracle. Output is free-form text and may differ
/// between identical calls.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request
    async fn complete(&self, request: &LlmRequest) -> LlmResult<LlmResponse>;

    /// Get provider name
    fn name(&self) -> &str;

    /// Get model name
    fn model(&self) -> &str;
}

/// Complete a request and log both sides at debug level
pub async fn complete_logged(
    provider: &dyn LlmProvider,
    purpose: &str,
    request: &LlmRequest,
) -> LlmResult<LlmResponse> {
    tracing::debug!(
        "[{}] {}:{} prompt: {}",
        purpose,
        provider.name(),
        provider.model(),
        truncate_for_log(&request.prompt_text())
    );
    let response = provider.complete(request).await?;
    tracing::debug!(
        "[{}] response ({}): {}",
        purpose,
        usage_summary(&response.usage),
        truncate_for_log(&response.content)
    );
    Ok(response)
}

/// Token counts for logs
pub fn usage_summary(usage: &TokenUsage) -> String {
    if *usage == TokenUsage::default() {
        return "usage not reported".to_string();
    }
    format!(
        "{} prompt + {} completion = {} tokens",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    )
}

pub fn truncate_for_log(text: &str) -> String {
    if text.chars().count() <= LOG_EXCERPT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(LOG_EXCERPT).collect();
    out.push_str("...");
    out
}

async fn read_json(provider: &str, response: reqwest::Response) -> LlmResult<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| LlmError::Parse(format!("Failed to parse response: {}", e)))
}

/// OpenAI-compatible provider (OpenAI, Azure, custom endpoints, etc.)
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    provider_id: String,
}

impl OpenAIProvider {
    pub fn new(provider_id: String, config: ProviderConfig, model: String) -> Self {
        Self {
            client: Client::new(),
            config,
            model,
            provider_id,
        }
    }

    fn build_body(&self, request: &LlmRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(&self, request: &LlmRequest) -> LlmResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut http = self.client.post(&url).json(&self.build_body(request));
        if let Some(api_key) = self.config.resolve_api_key(&self.provider_id) {
            http = http.header("Authorization", format!("Bearer {}", api_key));
        }

        let json = read_json("OpenAI", http.send().await?).await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let usage = TokenUsage {
            prompt_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: json["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage,
        })
    }

    fn name(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Anthropic provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    provider_id: String,
}

impl AnthropicProvider {
    pub fn new(provider_id: String, config: ProviderConfig, model: String) -> Self {
        Self {
            client: Client::new(),
            config,
            model,
            provider_id,
        }
    }

    fn build_body(&self, request: &LlmRequest) -> serde_json::Value {
        // System text goes in its own field
        let mut system_prompt = String::new();
        let mut messages = Vec::new();

        for msg in &request.messages {
            if msg.role == "system" {
                system_prompt = msg.content.clone();
            } else {
                messages.push(serde_json::json!({
                    "role": msg.role,
                    "content": [{"type": "text", "text": msg.content}]
                }));
            }
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if !system_prompt.is_empty() {
            body["system"] = serde_json::Value::String(system_prompt);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &LlmRequest) -> LlmResult<LlmResponse> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let api_key = self
            .config
            .resolve_api_key(&self.provider_id)
            .ok_or_else(|| LlmError::NotConfigured("Anthropic API key".to_string()))?;

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&self.build_body(request))
            .send()
            .await?;

        let json = read_json("Anthropic", response).await?;

        let content = json["content"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let input = json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
        let output = json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage: TokenUsage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            },
        })
    }

    fn name(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Ollama provider (local)
pub struct OllamaProvider {
    client: Client,
    config: ProviderConfig,
    model: String,
    provider_id: String,
}

impl OllamaProvider {
    pub fn new(provider_id: String, config: ProviderConfig, model: String) -> Self {
        Self {
            client: Client::new(),
            config,
            model,
            provider_id,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: &LlmRequest) -> LlmResult<LlmResponse> {
        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens
            }
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let json = read_json("Ollama", response).await?;

        let content = json["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        // Ollama doesn't provide token counts in the same way
        let usage = TokenUsage {
            prompt_tokens: json["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["eval_count"].as_u64().unwrap_or(0) as u32,
            total_tokens: 0,
        };

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage,
        })
    }

    fn name(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// LLM Client factory
pub struct LlmClient {
    config: AIConfig,
}

impl LlmClient {
    pub fn new(config: AIConfig) -> Self {
        Self { config }
    }

    /// Create a provider instance with the specified model
    fn create_provider(&self, provider_id: &str, model: &str) -> LlmResult<Arc<dyn LlmProvider>> {
        let provider_config = self
            .config
            .providers
            .get(provider_id)
            .ok_or_else(|| LlmError::NotConfigured(format!("provider '{}'", provider_id)))?;

        let provider: Arc<dyn LlmProvider> = match provider_config.api_type {
            ApiType::Openai => Arc::new(OpenAIProvider::new(
                provider_id.to_string(),
                provider_config.clone(),
                model.to_string(),
            )),
            ApiType::Anthropic => Arc::new(AnthropicProvider::new(
                provider_id.to_string(),
                provider_config.clone(),
                model.to_string(),
            )),
            ApiType::Ollama => Arc::new(OllamaProvider::new(
                provider_id.to_string(),
                provider_config.clone(),
                model.to_string(),
            )),
        };

        Ok(provider)
    }

    fn from_selection(&self, selection: &str) -> LlmResult<Arc<dyn LlmProvider>> {
        let (provider_id, model) = selection
            .split_once(':')
            .filter(|(p, m)| !p.is_empty() && !m.is_empty())
            .ok_or_else(|| LlmError::InvalidSelection(selection.to_string()))?;
        self.create_provider(provider_id, model)
    }

    /// Model used for planning and narration (format: "provider_id:model_name")
    pub fn default_llm(&self) -> LlmResult<Arc<dyn LlmProvider>> {
        let selection = self
            .config
            .default_llm
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("planning".to_string()))?;
        self.from_selection(selection)
    }

    /// Model used for element ranking; falls back to the default model
    pub fn ranking_llm(&self) -> LlmResult<Arc<dyn LlmProvider>> {
        match self.config.ranking_llm.as_deref() {
            Some(selection) => self.from_selection(selection),
            None => self.default_llm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn provider_config(api_type: ApiType) -> ProviderConfig {
        ProviderConfig {
            name: "test".to_string(),
            api_type,
            base_url: "https://api.example.com".to_string(),
            api_key: Some("test-key".to_string()),
            models: vec!["gpt-4".to_string()],
        }
    }

    fn request() -> LlmRequest {
        LlmRequest::new(
            vec![LlmMessage::system("Be brief."), LlmMessage::user("Hello")],
            0.1,
            100,
        )
    }

    #[test]
    fn test_openai_body_carries_sampling_parameters() {
        let provider = OpenAIProvider::new(
            "test".to_string(),
            provider_config(ApiType::Openai),
            "gpt-4".to_string(),
        );
        let body = provider.build_body(&request());
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_anthropic_body_lifts_system_message() {
        let provider = AnthropicProvider::new(
            "test".to_string(),
            provider_config(ApiType::Anthropic),
            "claude".to_string(),
        );
        let body = provider.build_body(&request());
        assert_eq!(body["system"], "Be brief.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_usage_summary() {
        assert_eq!(usage_summary(&TokenUsage::default()), "usage not reported");
        let usage = TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 8,
            total_tokens: 128,
        };
        assert_eq!(usage_summary(&usage), "120 prompt + 8 completion = 128 tokens");
    }

    #[test]
    fn test_client_no_default() {
        let config = AIConfig {
            default_llm: None,
            ranking_llm: None,
            providers: HashMap::new(),
        };
        let client = LlmClient::new(config);
        assert!(matches!(
            client.default_llm(),
            Err(LlmError::NotConfigured(_))
        ));
        // Ranking falls back to the default selection
        assert!(client.ranking_llm().is_err());
    }

    #[test]
    fn test_client_selection() {
        let client = LlmClient::new(AIConfig::default());
        assert_eq!(client.default_llm().unwrap().model(), "gpt-4o-mini");
        let ranking = client.ranking_llm().unwrap();
        assert_eq!(ranking.name(), "openai");
        assert_eq!(ranking.model(), "gpt-4o");
    }

    #[test]
    fn test_client_rejects_malformed_selection() {
        let mut config = AIConfig::default();
        config.default_llm = Some("gpt-4o".to_string());
        let client = LlmClient::new(config);
        assert!(matches!(
            client.default_llm(),
            Err(LlmError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short"), "short");
        let long = "x".repeat(LOG_EXCERPT + 10);
        assert_eq!(truncate_for_log(&long).len(), LOG_EXCERPT + 3);
    }
}
