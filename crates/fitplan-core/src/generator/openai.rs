//! [`PlanGenerator`] backed by an OpenAI-compatible `chat/completions`
//! endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GenerationRequest, PlanGenerator};
use crate::error::{GenerationStage, RemoteGenerationError};
use crate::plan::PlanPayload;
use crate::plan::prompt::{build_system_prompt, build_user_prompt};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 300;

/// Connection settings for [`OpenAiGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            temperature: 0.4,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    /// Build a generator and its HTTP client.
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl PlanGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<PlanPayload, RemoteGenerationError> {
        let system = build_system_prompt(request.kind);
        let user = build_user_prompt(request);
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(
            kind = %request.kind,
            model = %self.config.model,
            prompt_chars = system.len() + user.len(),
            "sending plan generation request"
        );

        let mut http = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            let details = if e.is_timeout() {
                format!("request timed out: {e}")
            } else if e.is_connect() {
                format!("cannot connect to {}: {e}", self.config.base_url)
            } else {
                format!("request failed: {e}")
            };
            RemoteGenerationError::new(GenerationStage::Request, details)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            RemoteGenerationError::new(
                GenerationStage::Response,
                format!("failed to read response: {e}"),
            )
        })?;

        if !status.is_success() {
            return Err(RemoteGenerationError::new(
                GenerationStage::Status,
                format!("HTTP {status}: {}", truncate(&text, MAX_ERROR_BODY)),
            ));
        }

        parse_completion(&text)
    }
}

/// Turn a `chat/completions` response body into a validated plan.
pub fn parse_completion(body: &str) -> Result<PlanPayload, RemoteGenerationError> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        RemoteGenerationError::new(
            GenerationStage::Response,
            format!("malformed completion response: {e}"),
        )
    })?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            RemoteGenerationError::new(GenerationStage::Response, "completion has no content")
        })?;

    let value: Value = serde_json::from_str(extract_json_block(&content)).map_err(|e| {
        RemoteGenerationError::new(GenerationStage::Parse, format!("plan is not valid JSON: {e}"))
    })?;

    PlanPayload::from_value(value)
        .map_err(|e| RemoteGenerationError::new(GenerationStage::Validation, e.to_string()))
}

/// Strip a surrounding Markdown code fence, if any.
pub fn extract_json_block(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
