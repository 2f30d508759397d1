//! Client for the OpenAI-compatible generation API.
//!
//! Covers the three calls the product makes: model listing, image generation
//! and JSON-mode chat completions. Every request passes a shared
//! [`RateLimiter`] first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LlmConfig;

mod rate_limit;

pub use rate_limit::RateLimiter;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Upstream response contained no {0}")]
    Empty(&'static str),
}

/// Anything that can answer a system/user prompt pair with a JSON string.
pub trait ChatBackend {
    fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}

/// Anything that can turn a prompt into encoded image bytes.
pub trait ImageBackend {
    fn generate_image(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Vec<u8>, LlmError>> + Send;
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    chat_model: String,
    image_model: String,
    image_size: String,
    timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        assert!(!config.base_url.is_empty(), "LLM base URL must be provided");

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !config.api_key.is_empty() {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|err| LlmError::Parse(format!("Invalid API key header: {err}")))?;
            bearer.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            image_model: config.image_model.clone(),
            image_size: config.image_size.clone(),
            timeout: config.request_timeout(),
            rate_limiter: Arc::new(RateLimiter::new(config.min_request_interval())),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.rate_limiter.acquire().await;
        let response = self.http.get(self.endpoint("models")).send().await?;
        let models: ModelsResponse = decode_response(response).await?;
        let ids: Vec<String> = models.data.into_iter().map(|model| model.id).collect();
        debug!(count = ids.len(), "Listed upstream models");
        Ok(ids)
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, LlmError> {
        assert!(!prompt.is_empty(), "Image prompt must not be empty");
        let request = ImageGenerationRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: &self.image_size,
            response_format: "b64_json",
        };
        let response: ImagesResponse = self.post_json("images/generations", &request).await?;
        let first = response
            .data
            .into_iter()
            .next()
            .ok_or(LlmError::Empty("image data"))?;

        let bytes = match (first.b64_json, first.url) {
            (Some(encoded), _) => BASE64_STANDARD
                .decode(encoded.trim())
                .map_err(|err| LlmError::Parse(format!("Invalid base64 image payload: {err}")))?,
            (None, Some(url)) => {
                let response = self.http.get(url).send().await?;
                let response = ensure_success(response).await?;
                response.bytes().await?.to_vec()
            }
            (None, None) => return Err(LlmError::Empty("image payload")),
        };

        info!(
            model = %self.image_model,
            bytes = bytes.len(),
            "Generated image"
        );
        Ok(bytes)
    }

    pub async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.chat_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let response: ChatCompletionResponse =
            self.post_json("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::Empty("completion content"))
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, LlmError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.rate_limiter.acquire().await;
        let response = self.http.post(self.endpoint(path)).json(body).send().await?;
        decode_response(response).await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl ChatBackend for LlmClient {
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        LlmClient::chat_json(self, system_prompt, user_prompt).await
    }
}

impl ImageBackend for LlmClient {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, LlmError> {
        LlmClient::generate_image(self, prompt).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Api {
        status: status.as_u16(),
        body,
    })
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, LlmError> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| LlmError::Parse(err.to_string()))
}

#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
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
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            api_key: "secret".to_string(),
            chat_model: "chat".to_string(),
            image_model: "image".to_string(),
            image_size: "256x256".to_string(),
            request_timeout_ms: 1_000,
            min_request_interval_ms: 0,
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = LlmClient::new(&config()).unwrap();
        assert_eq!(
            client.endpoint("chat/completions"),
            "http://127.0.0.1:9/v1/chat/completions"
        );
        assert_eq!(client.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn chat_request_uses_json_mode() {
        let request = ChatCompletionRequest {
            model: "chat",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][1]["role"], "user");
    }

    #[test]
    fn image_response_tolerates_missing_fields() {
        let parsed: ImagesResponse = serde_json::from_str(r#"{"data":[{"url":"http://x"}]}"#).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert!(parsed.data[0].b64_json.is_none());
    }
}
