use crate::core::config::Config;
use crate::core::error::GenerationError;
use crate::services::generation::OutputShape;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use url::Url;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1/";

/// One request/response exchange with a generative text service.
///
/// Returns the text of the first candidate. Implementations must report a reply
/// without any candidate as [`GenerationError::TransportFailure`].
#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn generate(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> std::result::Result<String, GenerationError>;
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "gemini", "ollama" or "openai"
    pub gemini: Option<GeminiConfig>,
    pub ollama: Option<OllamaConfig>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl LlmConfig {
    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            "gemini" => self.gemini.as_ref().map(|_| ()).context("Gemini config missing"),
            "ollama" => self.ollama.as_ref().map(|_| ()).context("Ollama config missing"),
            "openai" => self.openai.as_ref().map(|_| ()).context("OpenAI config missing"),
            other => Err(anyhow!("Unknown LLM provider: {}", other)),
        }
    }
}

pub fn create_llm(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.llm.provider.as_str() {
        "gemini" => {
            let cfg = config.llm.gemini.as_ref().context("Gemini config missing")?;
            Ok(Box::new(GeminiClient::new(&cfg.api_key, &cfg.model)?))
        }
        "ollama" => {
            let cfg = config.llm.ollama.as_ref().context("Ollama config missing")?;
            Ok(Box::new(OllamaClient::new(&cfg.base_url, &cfg.model)?))
        }
        "openai" => {
            let cfg = config.llm.openai.as_ref().context("OpenAI config missing")?;
            Ok(Box::new(OpenAIClient::new(
                &cfg.api_key,
                &cfg.model,
                cfg.base_url.as_deref(),
            )?))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.llm.provider)),
    }
}

/// Joins `path` onto `base`, treating `base` as a directory even without a trailing slash.
fn endpoint(base: &str, path: &str) -> Result<Url> {
    let base = format!("{}/", base.trim_end_matches('/'));
    let url = Url::parse(&base)
        .with_context(|| format!("Invalid base URL: {}", base))?
        .join(path)
        .with_context(|| format!("Invalid endpoint path: {}", path))?;
    Ok(url)
}

/// Prompt text for backends that cannot take a schema natively.
fn prompt_with_instruction(prompt: &str, shape: Option<&OutputShape>) -> String {
    match shape {
        Some(shape) => format!("{}\n\n{}", prompt, shape.instruction()),
        None => prompt.to_string(),
    }
}

fn transport(context: &str, err: impl std::fmt::Display) -> GenerationError {
    GenerationError::TransportFailure(format!("{}: {}", context, err))
}

async fn read_success_body(
    provider: &str,
    resp: reqwest::Response,
) -> std::result::Result<String, GenerationError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| transport(&format!("{} response unreadable", provider), e))?;
    if !status.is_success() {
        warn!("{} returned HTTP {}", provider, status);
        return Err(GenerationError::TransportFailure(format!(
            "{} API error ({}): {}",
            provider, status, body
        )));
    }
    Ok(body)
}

// --- Gemini ---
#[derive(Debug)]
struct GeminiClient {
    url: Url,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str) -> Result<Self> {
        let mut url = endpoint(GEMINI_BASE_URL, &format!("models/{}:generateContent", model))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(Self {
            url,
            client: reqwest::Client::new(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

impl GeminiRequest {
    fn new(prompt: &str, shape: Option<&OutputShape>) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: shape.map(|shape| GeminiGenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: shape.response_schema(),
            }),
        }
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

fn gemini_candidate_text(body: &str) -> std::result::Result<String, GenerationError> {
    let result: GeminiResponse =
        serde_json::from_str(body).map_err(|e| transport("Failed to parse Gemini response", e))?;

    if let Some(err) = result.error {
        return Err(GenerationError::TransportFailure(format!(
            "Gemini API returned error: {}",
            err.message
        )));
    }

    let candidates = result.candidates.unwrap_or_default();
    let first = candidates.first().ok_or_else(|| {
        GenerationError::TransportFailure("Gemini response has no candidates".to_string())
    })?;

    if let Some(part) = first.content.as_ref().and_then(|c| c.parts.first()) {
        return Ok(part.text.clone());
    }

    let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
    Err(GenerationError::TransportFailure(format!(
        "Gemini response empty. Finish reason: {}",
        reason
    )))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> std::result::Result<String, GenerationError> {
        debug!("POST Gemini generateContent");
        let resp = self
            .client
            .post(self.url.clone())
            .json(&GeminiRequest::new(prompt, shape))
            .send()
            .await
            .map_err(|e| transport("Gemini request failed", e))?;

        let body = read_success_body("Gemini", resp).await?;
        gemini_candidate_text(&body)
    }
}

// --- Ollama ---
#[derive(Debug)]
struct OllamaClient {
    url: Url,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            url: endpoint(base_url, "api/chat")?,
            model: model.to_string(),
            client: reqwest::Client::new(),
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<OllamaMessageResponse>,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> std::result::Result<String, GenerationError> {
        let request_body = OllamaRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt_with_instruction(prompt, shape),
            }],
            stream: false,
            format: shape.map(|_| "json".to_string()),
        };

        debug!("POST Ollama chat ({})", self.model);
        let resp = self
            .client
            .post(self.url.clone())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport("Ollama request failed", e))?;

        let body = read_success_body("Ollama", resp).await?;
        let result: OllamaResponse =
            serde_json::from_str(&body).map_err(|e| transport("Failed to parse Ollama response", e))?;
        result.message.map(|m| m.content).ok_or_else(|| {
            GenerationError::TransportFailure("Ollama response has no message".to_string())
        })
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    url: Url,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            url: endpoint(base_url.unwrap_or(OPENAI_BASE_URL), "chat/completions")?,
            client: reqwest::Client::new(),
        })
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

fn openai_choice_text(body: &str) -> std::result::Result<String, GenerationError> {
    let result: OpenAIResponse =
        serde_json::from_str(body).map_err(|e| transport("Failed to parse OpenAI response", e))?;
    result
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            GenerationError::TransportFailure("OpenAI response empty or missing content".to_string())
        })
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn generate(
        &self,
        prompt: &str,
        shape: Option<&OutputShape>,
    ) -> std::result::Result<String, GenerationError> {
        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt_with_instruction(prompt, shape),
            }],
        };

        debug!("POST OpenAI chat/completions ({})", self.model);
        let resp = self
            .client
            .post(self.url.clone())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| transport("OpenAI request failed", e))?;

        let body = read_success_body("OpenAI", resp).await?;
        openai_choice_text(&body)
    }
}
