//! Model Invoker: stages attachments, calls the provider with bounded retry,
//! and decodes the reply into an `EvaluationResult`.
//!
//! One invocation moves through:
//! `Attempting(n) -> Success | RateLimited -> Attempting(n+1) | Failed | Busy`,
//! then `Success -> Decoded | DecodeFailed`.

use std::time::Duration;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::evaluation::models::{Attachment, AudioAttachment, EvaluationResult};
use crate::llm_client::{strip_json_fences, ContentPart, GenerativeProvider, ProviderError};

/// Total generation attempts when the provider keeps rate limiting.
pub const MAX_ATTEMPTS: u32 = 3;

const TEMP_AUDIO_PREFIX: &str = "coach-audio-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Provider still rate limited after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Could not stage attachment: {0}")]
    Attachment(String),

    #[error("Model reply is not a JSON evaluation: {source}")]
    Decode {
        source: serde_json::Error,
        raw_text: String,
    },
}

/// Attachments ready to send. Temporary files live exactly as long as this value.
struct StagedAttachments {
    parts: Vec<ContentPart>,
    _temp_files: Vec<NamedTempFile>,
}

/// Runs one evaluation against the provider.
pub async fn invoke(
    provider: &dyn GenerativeProvider,
    prompt: &str,
    attachments: &[Attachment],
    policy: RetryPolicy,
) -> Result<EvaluationResult, InvokeError> {
    // Dropped on every return path below, which removes any temp audio file.
    let staged = stage(provider, attachments).await?;

    let raw_text = generate_with_retry(provider, prompt, &staged.parts, policy).await?;

    decode_reply(&raw_text)
}

async fn stage(
    provider: &dyn GenerativeProvider,
    attachments: &[Attachment],
) -> Result<StagedAttachments, InvokeError> {
    let mut staged = StagedAttachments {
        parts: Vec::with_capacity(attachments.len()),
        _temp_files: Vec::new(),
    };

    for attachment in attachments {
        match attachment {
            Attachment::Audio(audio) => {
                let temp = write_temp_audio(audio).await?;
                let handle = provider.upload_file(temp.path(), &audio.mime_type).await;
                // Keep the guard before bailing out so the file is removed either way.
                staged._temp_files.push(temp);
                let handle = handle?;
                debug!("Audio attachment uploaded as {}", handle.uri);
                staged.parts.push(ContentPart::File(handle));
            }
            Attachment::Image(bytes) => {
                let mime_type = decode_image_mime(bytes)?;
                staged.parts.push(ContentPart::InlineImage {
                    mime_type,
                    data: bytes.clone(),
                });
            }
        }
    }

    Ok(staged)
}

async fn write_temp_audio(audio: &AudioAttachment) -> Result<NamedTempFile, InvokeError> {
    let suffix = mime_guess::get_mime_extensions_str(&audio.mime_type)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(TEMP_AUDIO_PREFIX)
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| InvokeError::Attachment(format!("temp file: {e}")))?;

    tokio::fs::write(temp.path(), &audio.bytes)
        .await
        .map_err(|e| InvokeError::Attachment(format!("temp file write: {e}")))?;

    debug!(
        "Staged {} bytes of {} at {}",
        audio.bytes.len(),
        audio.mime_type,
        temp.path().display()
    );
    Ok(temp)
}

/// Decodes the snapshot to make sure it is a real image and reports its MIME type.
fn decode_image_mime(bytes: &[u8]) -> Result<String, InvokeError> {
    let format = image::guess_format(bytes)
        .map_err(|e| InvokeError::Attachment(format!("camera frame: {e}")))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| InvokeError::Attachment(format!("camera frame: {e}")))?;
    debug!(
        "Camera frame decoded: {}x{} {:?}",
        decoded.width(),
        decoded.height(),
        format
    );
    Ok(format.to_mime_type().to_string())
}

async fn generate_with_retry(
    provider: &dyn GenerativeProvider,
    prompt: &str,
    parts: &[ContentPart],
    policy: RetryPolicy,
) -> Result<String, InvokeError> {
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            warn!(
                "Rate limit hit (attempt {}/{}), retrying after {}ms...",
                attempt - 1,
                policy.max_attempts,
                policy.backoff.as_millis()
            );
            tokio::time::sleep(policy.backoff).await;
        }

        match provider.generate(prompt, parts).await {
            Ok(text) => {
                info!(
                    "Model {} replied on attempt {attempt} ({} chars)",
                    provider.model(),
                    text.len()
                );
                return Ok(text);
            }
            Err(e) if e.is_rate_limited() => continue,
            Err(e) => return Err(InvokeError::Provider(e)),
        }
    }

    Err(InvokeError::Busy {
        attempts: policy.max_attempts,
    })
}

/// Strips code fences, then parses the remainder as an evaluation object.
pub fn decode_reply(raw_text: &str) -> Result<EvaluationResult, InvokeError> {
    let result: EvaluationResult =
        serde_json::from_str(strip_json_fences(raw_text)).map_err(|source| InvokeError::Decode {
            source,
            raw_text: raw_text.to_string(),
        })?;

    if !result.score_in_range() {
        warn!("Model returned an out-of-range score: {:?}", result.score);
    }
    Ok(result)
}
