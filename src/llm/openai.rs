//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, RoastError};

use super::{DeltaStream, RoastGenerator, RoastRequest};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Generator speaking the OpenAI chat-completions API.
///
/// Any endpoint with the same wire shape works via
/// [`OpenAiGenerator::with_base_url`].
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiGenerator {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_OPENAI_API_BASE)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request_body(req: &RoastRequest, stream: bool) -> Value {
        json!({
            "model": req.model,
            "messages": [
                { "role": "system", "content": req.system_prompt },
                { "role": "user", "content": req.user_prompt }
            ],
            "max_tokens": req.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            // Surface the API's own message when the body carries one.
            let detail = serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(error_text);
            return Err(RoastError::Upstream(format!(
                "chat completions returned {status}: {detail}"
            )));
        }
        Ok(response)
    }

    /// Payload of one SSE line, if it is a data frame. `None` for the
    /// `[DONE]` sentinel, comments and blank lines.
    fn parse_sse_data(line: &str) -> Option<&str> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return None;
        }
        Some(data)
    }
}

#[async_trait]
impl RoastGenerator for OpenAiGenerator {
    async fn complete(&self, req: &RoastRequest) -> Result<String> {
        debug!(model = %req.model, "buffered completion request");
        let body = Self::build_request_body(req, false);
        let response = self.send(&body).await?;
        let data: ChatResponse = response.json().await?;
        Ok(data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream(&self, req: &RoastRequest) -> Result<DeltaStream> {
        debug!(model = %req.model, "streaming completion request");
        let body = Self::build_request_body(req, true);
        let response = self.send(&body).await?;
        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(RoastError::Http(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = Self::parse_sse_data(&line) {
                        // Unparseable chunks are skipped, not fatal.
                        if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
                            if let Some(choice) = chunk.choices.into_iter().next() {
                                if let Some(text) = choice.delta.content {
                                    if !text.is_empty() {
                                        yield Ok(text);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ── API response types (internal) ────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
