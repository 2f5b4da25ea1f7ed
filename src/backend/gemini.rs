//! Cloud backend: Google Gemini `generateContent`.
//!
//! The document travels as inline base64 data next to the prompt text, so a
//! multi-page PDF is a single request. The request asks for
//! `responseMimeType: application/json`, which makes Gemini answer with bare
//! JSON most of the time; the extractor still handles the occasional fence.

use super::{check_status, http_client, transport_error, InferenceBackend, Submission};
use crate::error::{InferenceError, Rx2JsonError};
use crate::pipeline::encode::PagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const NAME: &str = "gemini";

/// Gemini REST client.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl GeminiBackend {
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
        })
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request<'a>(&self, prompt: &'a str, payload: &'a PagePayload) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &payload.mime_type,
                            data: &payload.data,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: self.temperature,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let texts: Vec<&str> = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn submission(&self) -> Submission {
        Submission::WholeDocument
    }

    async fn complete(&self, prompt: &str, payload: &PagePayload) -> Result<String, InferenceError> {
        let body = self.build_request(prompt, payload);
        debug!(model = %self.model, mime = %payload.mime_type, "Sending request to Gemini");

        let mut request = self.client.post(self.url()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response = request.send().await.map_err(|e| transport_error(NAME, e))?;
        let response = check_status(NAME, response).await?;

        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::MalformedReply {
                    backend: NAME.to_string(),
                    detail: e.to_string(),
                })?;

        parsed.text().ok_or_else(|| InferenceError::EmptyReply {
            backend: NAME.to_string(),
        })
    }
}
