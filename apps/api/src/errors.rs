use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::evaluation::invoker::InvokeError;
use crate::evaluation::models::EvaluationResult;

pub const BUSY_MESSAGE: &str = "Server busy, please try again";
const DECODE_MESSAGE: &str = "Error parsing AI response. Please try again.";

/// Application-level error type.
/// Implements `IntoResponse` so every failure still reaches the caller as parseable JSON.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Provider busy after {attempts} attempts")]
    Busy { attempts: u32 },

    #[error("Malformed form data: {0}")]
    Multipart(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Could not decode model reply: {0}")]
    Decode(String),
}

impl From<InvokeError> for AppError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Busy { attempts } => AppError::Busy { attempts },
            InvokeError::Provider(e) => AppError::Llm(e.to_string()),
            InvokeError::Attachment(msg) => AppError::Attachment(msg),
            InvokeError::Decode { source, raw_text } => {
                tracing::debug!("Undecodable model reply: {raw_text}");
                AppError::Decode(source.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Busy { attempts } => {
                tracing::warn!("Provider rate limited on all {attempts} attempts");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": BUSY_MESSAGE })),
                )
                    .into_response();
            }
            AppError::PayloadTooLarge(msg) => {
                tracing::warn!("Rejected oversized upload: {msg}");
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(EvaluationResult::failure(format!("Backend Error: {self}"))),
                )
                    .into_response();
            }
            AppError::Decode(msg) => {
                tracing::error!("JSON parse error: {msg}");
                DECODE_MESSAGE.to_string()
            }
            AppError::Multipart(msg) => {
                tracing::error!("Multipart error: {msg}");
                format!("Backend Error: {self}")
            }
            AppError::Attachment(msg) => {
                tracing::error!("Attachment error: {msg}");
                format!("Backend Error: {self}")
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                format!("Backend Error: {self}")
            }
        };

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(EvaluationResult::failure(message)),
        )
            .into_response()
    }
}
