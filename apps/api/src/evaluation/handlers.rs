//! Axum route handlers for the Evaluation API.

use std::time::Duration;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::errors::AppError;
use crate::evaluation::assembler::{assemble, read_form};
use crate::evaluation::extractor::{extract_off_thread, NO_RESUME};
use crate::evaluation::invoker::{invoke, RetryPolicy};
use crate::evaluation::models::EvaluationResult;
use crate::evaluation::prompt_builder::build;
use crate::state::AppState;

/// POST /api/evaluate
///
/// Multipart form in, EvaluationResult out. Failures are converted by `AppError`
/// into a 429 busy body or a zeroed EvaluationResult with status 500.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<EvaluationResult>, AppError> {
    let multipart = multipart.map_err(|e| AppError::Multipart(e.body_text()))?;
    let request = assemble(read_form(multipart).await?);

    info!(
        "Evaluating response for {} ({}): text={} chars, resume={}, audio={}, camera={}",
        request.goal,
        request.sub_type,
        request.user_response_text.len(),
        request.resume_document.is_some(),
        request
            .audio_attachment
            .as_ref()
            .map(|a| a.mime_type.as_str())
            .unwrap_or("none"),
        request.image_attachment.is_some(),
    );

    let resume_text = match &request.resume_document {
        Some(document) => extract_off_thread(document.clone()).await,
        None => NO_RESUME.to_string(),
    };

    let prompt = build(&request, &resume_text);
    let policy = RetryPolicy::with_backoff(Duration::from_millis(state.config.retry_backoff_ms));

    let result = invoke(
        state.provider.as_ref(),
        &prompt,
        &request.attachments(),
        policy,
    )
    .await?;

    info!("Evaluation complete: score={:?}", result.score);
    Ok(Json(result))
}

/// OPTIONS /api/evaluate
///
/// Cross-origin preflight; CORS headers are added by the router's CORS layer.
pub async fn handle_preflight() -> StatusCode {
    StatusCode::OK
}
