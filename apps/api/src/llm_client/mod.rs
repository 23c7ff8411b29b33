//! LLM Client: the single point of entry for all Gemini API calls.
//!
//! No other module may call the provider directly. The pipeline talks to the
//! `GenerativeProvider` trait; `GeminiClient` is the production backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
#[cfg(test)]
pub mod stub;

use prompts::JSON_ONLY_SYSTEM;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const RESPONSE_MIME_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Could not read staged file: {0}")]
    Io(#[from] std::io::Error),

    #[error("File upload did not return an upload URL")]
    MissingUploadUrl,

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }
}

/// Reference to a file already stored on the provider side.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    pub uri: String,
    pub mime_type: String,
}

/// One non-text part of a generation request.
#[derive(Debug, Clone)]
pub enum ContentPart {
    File(FileHandle),
    InlineImage { mime_type: String, data: Bytes },
}

/// A generative model that takes a prompt plus attachments and returns text.
///
/// Carried in `AppState` as `Arc<dyn GenerativeProvider>`, built once at startup.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Uploads a local file to the provider's file store.
    async fn upload_file(&self, path: &Path, mime_type: &str)
        -> Result<FileHandle, ProviderError>;

    /// Makes one generation call. Never retries; the caller owns the retry policy.
    async fn generate(&self, prompt: &str, parts: &[ContentPart]) -> Result<String, ProviderError>;

    fn model(&self) -> &str;
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateResponse {
    /// Concatenates the text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadStart<'a> {
    file: UploadDisplayName<'a>,
}

#[derive(Debug, Serialize)]
struct UploadDisplayName<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// GeminiClient
// ────────────────────────────────────────────────────────────────────────────

/// The single Gemini client shared by every request.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, api_base: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            model,
            api_base,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.api_base)
    }
}

#[async_trait]
impl GenerativeProvider for GeminiClient {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<FileHandle, ProviderError> {
        let data = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment");

        // Resumable upload: the start call hands back a session URL.
        let start = self
            .client
            .post(self.upload_url())
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStart {
                file: UploadDisplayName { display_name },
            })
            .send()
            .await?;
        let start = check_status(start).await?;

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or(ProviderError::MissingUploadUrl)?
            .to_string();

        let size = data.len();
        let finished = self
            .client
            .post(session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await?;
        let finished = check_status(finished).await?;

        let uploaded: UploadResponse = finished.json().await?;
        debug!("Uploaded {size} bytes to provider file store: {}", uploaded.file.uri);

        Ok(FileHandle {
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }

    async fn generate(&self, prompt: &str, parts: &[ContentPart]) -> Result<String, ProviderError> {
        let mut request_parts = vec![RequestPart::Text { text: prompt }];
        for part in parts {
            request_parts.push(match part {
                ContentPart::File(handle) => RequestPart::File {
                    file_data: FileData {
                        mime_type: &handle.mime_type,
                        file_uri: &handle.uri,
                    },
                },
                ContentPart::InlineImage { mime_type, data } => RequestPart::Inline {
                    inline_data: InlineData {
                        mime_type,
                        data: STANDARD.encode(data),
                    },
                },
            });
        }

        let request_body = GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![RequestPart::Text {
                    text: JSON_ONLY_SYSTEM,
                }],
            },
            contents: vec![RequestContent {
                role: "user",
                parts: request_parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: RESPONSE_MIME_TYPE,
            },
        };

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let generated: GenerateResponse = response.json().await?;
        if let Some(usage) = &generated.usage_metadata {
            debug!(
                "LLM call succeeded: prompt_tokens={}, output_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        generated.text().ok_or(ProviderError::EmptyContent)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Maps non-success statuses onto `ProviderError`, keeping 429 distinct.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GeminiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("LLM API returned {status}: {message}");
        return Err(ProviderError::RateLimited(message));
    }

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Strips a leading ```json / ``` fence and a trailing ``` fence from LLM output.
/// Only the outermost delimiters are touched; fence text inside the payload survives.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let body = if let Some(stripped) = text.strip_prefix("```json") {
        stripped
    } else if let Some(stripped) = text.strip_prefix("```JSON") {
        stripped
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
    } else {
        return text;
    };

    let body = body.trim_start();
    body.strip_suffix("```").map(str::trim).unwrap_or(body)
}
