//! Local backend: an OpenAI-compatible vision chat server.
//!
//! Targets llama.cpp / vLLM style servers hosting an OCR-tuned vision model.
//! Each request is one user message holding the prompt and one page image as
//! a `data:` URL. The same client also exposes [`LocalVisionBackend::list_models`],
//! which the `rx2json-probe` tool uses as its connectivity check.

use super::{check_status, http_client, transport_error, InferenceBackend, Submission};
use crate::error::{InferenceError, Rx2JsonError};
use crate::pipeline::encode::PagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";
pub const DEFAULT_MODEL: &str = "allenai_olmOCR-2-7B-1025-Q5_K_M.gguf";

const NAME: &str = "local";

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct LocalVisionBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: usize,
}

impl LocalVisionBackend {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, Rx2JsonError> {
        Ok(Self {
            client: http_client(NAME, timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            temperature: 0.1,
            max_tokens: 4096,
        })
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// IDs of the models the server reports (`GET /models`).
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let mut request = self.client.get(format!("{}/models", self.base_url));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| transport_error(NAME, e))?;
        let response = check_status(NAME, response).await?;
        let list: ModelList = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedReply {
                backend: NAME.to_string(),
                detail: e.to_string(),
            })?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn build_request<'a>(&'a self, prompt: &'a str, payload: &PagePayload) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: payload.data_url(),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[async_trait]
impl InferenceBackend for LocalVisionBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn submission(&self) -> Submission {
        Submission::PerPage
    }

    async fn complete(&self, prompt: &str, payload: &PagePayload) -> Result<String, InferenceError> {
        let body = self.build_request(prompt, payload);
        debug!(
            model = %self.model,
            page = payload.page_number,
            "Sending request to local vision server"
        );

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| transport_error(NAME, e))?;
        let response = check_status(NAME, response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedReply {
                backend: NAME.to_string(),
                detail: e.to_string(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InferenceError::EmptyReply {
                backend: NAME.to_string(),
            })
    }
}
