//! Embedding and chat-completion clients for OpenAI-compatible endpoints.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OpenAiSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub trait Embedder {
    /// One vector per input, in input order.
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;
}

pub trait ChatModel {
    fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Blocking client for `/embeddings` and `/chat/completions`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    temperature: f32,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("missing OpenAI API key (set OPENAI_API_KEY)")?;
        anyhow::ensure!(settings.batch_size > 0, "openai.batch_size must be positive");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            embedding_model: settings.embedding_model.clone(),
            chat_model: settings.chat_model.clone(),
            temperature: settings.temperature,
            max_retries: settings.max_retries,
            batch_size: settings.batch_size,
        })
    }

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: inputs,
        };
        let resp = self.send_with_retry(|| self.client.post(&endpoint).json(&request))?;
        let mut parsed: EmbeddingResponse = resp
            .json()
            .context("failed to parse OpenAI embedding response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == inputs.len(),
            "OpenAI returned {} embeddings for {} inputs",
            parsed.data.len(),
            inputs.len()
        );
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    /// Retries 429, 5xx and transport hiccups with exponential backoff.
    fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match build().send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "OpenAI request failed, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    anyhow::bail!("OpenAI request failed ({}): {}", status, body);
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "OpenAI request errored, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

impl Embedder for OpenAiClient {
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            debug!(batch = batch.len(), "Embedding batch");
            out.extend(self.embed_batch(batch)?);
        }
        Ok(out)
    }
}

impl ChatModel for OpenAiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.chat_model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        let resp = self.send_with_retry(|| self.client.post(&endpoint).json(&body))?;
        let parsed: ChatResponse = resp.json().context("failed to parse OpenAI response")?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: Option<&str>) -> OpenAiSettings {
        OpenAiSettings {
            api_key: api_key.map(str::to_string),
            base_url: "https://api.openai.com/v1/".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_retries: 3,
            batch_size: 2,
        }
    }

    #[test]
    fn key_required() {
        assert!(OpenAiClient::new(&settings(None)).is_err());
        assert!(OpenAiClient::new(&settings(Some("  "))).is_err());
        let client = OpenAiClient::new(&settings(Some("sk-test"))).unwrap();
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(9), Duration::from_millis(16000));
    }

    #[test]
    fn embedding_response_reordered_by_index() {
        let raw = r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        parsed.data.sort_by_key(|e| e.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0]);
    }

    #[test]
    fn chat_request_shape() {
        let body = ChatRequest {
            model: "gpt-3.5-turbo",
            temperature: 0.0,
            messages: vec![ChatMessage { role: "system", content: "ctx" }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["model"], "gpt-3.5-turbo");
    }
}
