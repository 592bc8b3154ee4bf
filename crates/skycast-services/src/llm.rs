//! Chat-completions client for weather reports.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use skycast_core::error::ReqwestErrorExt;
use skycast_core::{LlmConfig, LlmError, NetworkError};
use skycast_weather::{PredictionReport, SYSTEM_PROMPT};

use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
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

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry: RetryConfig::from(config),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for a structured report on the rendered prompt.
    #[instrument(skip(self, prompt), fields(model = %self.model), level = "info")]
    pub async fn generate_report(&self, prompt: &str) -> Result<PredictionReport, LlmError> {
        tracing::info!("Calling LLM API: {}", self.api_url);
        tracing::debug!("Prompt: {}", prompt);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = with_retry(&self.retry, || {
            self.client
                .post(&self.api_url)
                .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
        })
        .await
        .map_err(|e| LlmError::Network(e.into_network_error()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("API request failed with status code {}: {}", status, text);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized,
                _ => LlmError::Api {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Network(NetworkError::InvalidResponse(format!(
                "Malformed completion: {}",
                e
            )))
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        let report = parse_report(&content)?;
        let preview: String = content.chars().take(100).collect();
        tracing::info!("Successfully received weather report: {}...", preview);
        Ok(report)
    }
}

/// Parse the model's message content into a report.
///
/// Tolerates a Markdown code fence around the JSON and an array answer, in
/// which case the first element is used.
pub fn parse_report(content: &str) -> Result<PredictionReport, LlmError> {
    let trimmed = strip_code_fence(content.trim());

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| LlmError::InvalidReport(e.to_string()))?;

    let value = match value {
        serde_json::Value::Array(items) => {
            tracing::warn!("Prediction result returned as a list, attempting to use first item");
            match items.into_iter().next() {
                Some(first @ serde_json::Value::Object(_)) => first,
                _ => {
                    return Err(LlmError::InvalidReport(
                        "Cannot extract valid prediction from list result".to_string(),
                    ))
                }
            }
        }
        obj @ serde_json::Value::Object(_) => obj,
        other => {
            return Err(LlmError::InvalidReport(format!(
                "Expected a JSON object, got: {}",
                other
            )))
        }
    };

    serde_json::from_value(value).map_err(|e| LlmError::InvalidReport(e.to_string()))
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
