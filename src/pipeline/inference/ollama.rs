use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::types::{InferenceClient, InferenceParams};
use super::InferenceError;

/// Ollama `/api/chat` client for vision models.
///
/// Chat-template vision models (Gemma, LLaVA, Qwen-VL) only accept images
/// through the messages endpoint, so every call goes through `/api/chat`
/// with a single user message carrying the prompt and the image.
pub struct OllamaVisionClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaVisionClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for Ollama `/api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    /// Constrains decoding to valid JSON.
    format: &'static str,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama `/api/chat` (non-streaming).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl InferenceClient for OllamaVisionClient {
    fn infer(
        &self,
        prompt: &str,
        image: &[u8],
        params: &InferenceParams,
    ) -> Result<String, InferenceError> {
        let _span = tracing::debug_span!(
            "ollama_chat",
            model = %self.model,
            image_size = image.len(),
            max_tokens = params.max_tokens,
        )
        .entered();
        let start = std::time::Instant::now();

        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
                images: vec![base64::engine::general_purpose::STANDARD.encode(image)],
            }],
            stream: false,
            format: "json",
            options: ChatOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(params.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    InferenceError::Unreachable(self.base_url.clone())
                } else if e.is_timeout() {
                    InferenceError::Timeout(params.timeout.as_secs())
                } else {
                    InferenceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(params.timeout.as_secs())
            } else {
                InferenceError::ResponseParsing(e.to_string())
            }
        })?;

        tracing::debug!(
            elapsed_ms = %start.elapsed().as_millis(),
            response_len = parsed.message.content.len(),
            "Inference complete"
        );

        Ok(parsed.message.content)
    }
}
