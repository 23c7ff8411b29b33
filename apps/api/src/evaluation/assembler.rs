//! Input Assembler: turns buffered multipart fields into an `EvaluationRequest`.
//!
//! Reading the stream can fail (malformed body); assembling never does.

use std::collections::HashMap;

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::evaluation::models::{
    AudioAttachment, EvaluationRequest, DEFAULT_GOAL, DEFAULT_SUB_TYPE,
};

pub const FIELD_GOAL: &str = "goal";
pub const FIELD_SUB_TYPE: &str = "sub_type";
pub const FIELD_TEXT_INPUT: &str = "text_input";
pub const FIELD_CONTEXT_TEXT: &str = "context_text";
pub const PART_RESUME: &str = "file";
/// Audio part names, in order of preference.
pub const PARTS_AUDIO: [&str; 2] = ["audio_response", "audio_recording"];
pub const PART_CAMERA_FRAME: &str = "camera_frame";

const FALLBACK_AUDIO_MIME: &str = "audio/webm";

/// Audio and audio/video containers the provider accepts for a spoken answer.
pub const ALLOWED_AUDIO_MIME_TYPES: &[&str] = &[
    "audio/webm",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/mpeg",
    "audio/mp3",
    "audio/mp4",
    "audio/x-m4a",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
    "audio/aiff",
    "video/webm",
    "video/mp4",
];

/// A file part buffered from the request.
#[derive(Debug, Clone, Default)]
pub struct UploadedPart {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

/// The multipart body, fully buffered.
///
/// A part is a file when it carries a filename or uses one of the file part
/// names. Everything else is text, whatever its Content-Type says.
#[derive(Debug, Clone, Default)]
pub struct RawForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedPart>,
}

/// Buffers every part of the request. Repeated names keep the first occurrence.
pub async fn read_form(mut multipart: Multipart) -> Result<RawForm, AppError> {
    let mut form = RawForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| read_error("Failed to read multipart field", e))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let data = field
            .bytes()
            .await
            .map_err(|e| read_error(&format!("Failed to read part '{name}'"), e))?;

        if filename.is_some() || is_file_part(&name) {
            debug!("Received file part '{name}' ({} bytes)", data.len());
            form.files.entry(name).or_insert(UploadedPart {
                bytes: data,
                content_type,
                filename,
            });
        } else {
            let text = String::from_utf8_lossy(&data).into_owned();
            form.fields.entry(name).or_insert(text);
        }
    }

    Ok(form)
}

fn is_file_part(name: &str) -> bool {
    name == PART_RESUME || name == PART_CAMERA_FRAME || PARTS_AUDIO.contains(&name)
}

/// Keeps the body-limit rejection distinct from a malformed body.
fn read_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("{context}: {}", e.body_text()))
    } else {
        AppError::Multipart(format!("{context}: {e}"))
    }
}

/// Builds the request, applying defaults. Never fails.
pub fn assemble(form: RawForm) -> EvaluationRequest {
    let RawForm { mut fields, mut files } = form;

    let goal = non_blank(fields.remove(FIELD_GOAL)).unwrap_or_else(|| DEFAULT_GOAL.to_string());
    let sub_type =
        non_blank(fields.remove(FIELD_SUB_TYPE)).unwrap_or_else(|| DEFAULT_SUB_TYPE.to_string());

    let resume_document = take_file(&mut files, PART_RESUME).map(|part| part.bytes);

    let audio_attachment = PARTS_AUDIO
        .iter()
        .find_map(|name| take_file(&mut files, name))
        .and_then(audio_from_part);

    let image_attachment = take_file(&mut files, PART_CAMERA_FRAME).map(|part| part.bytes);

    EvaluationRequest {
        goal,
        sub_type,
        user_response_text: fields.remove(FIELD_TEXT_INPUT).unwrap_or_default(),
        context_notes: fields.remove(FIELD_CONTEXT_TEXT).unwrap_or_default(),
        resume_document,
        audio_attachment,
        image_attachment,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Browsers submit empty parts for unselected file inputs; those count as absent.
fn take_file(files: &mut HashMap<String, UploadedPart>, name: &str) -> Option<UploadedPart> {
    files.remove(name).filter(|part| !part.bytes.is_empty())
}

fn audio_from_part(part: UploadedPart) -> Option<AudioAttachment> {
    let mime_type = resolve_audio_mime(part.content_type.as_deref(), part.filename.as_deref());

    if !ALLOWED_AUDIO_MIME_TYPES.contains(&mime_type.as_str()) {
        warn!("Dropping audio attachment with unsupported type '{mime_type}'");
        return None;
    }

    Some(AudioAttachment {
        bytes: part.bytes,
        mime_type,
        filename: part.filename,
    })
}

/// Declared type (parameters stripped), else a guess from the filename, else webm.
pub fn resolve_audio_mime(content_type: Option<&str>, filename: Option<&str>) -> String {
    let declared = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    if let Some(declared) = declared {
        return declared;
    }

    filename
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_AUDIO_MIME.to_string())
}
