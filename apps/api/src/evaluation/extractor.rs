//! Document Extractor: best-effort resume text. Failures become text, never errors.

use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use tracing::{debug, warn};

pub const NO_RESUME: &str = "No resume provided.";

/// Extracts the text of a PDF, page by page in order.
///
/// Returns `"Could not read PDF: <cause>"` on any failure. `pdf-extract` can
/// panic on hostile input, so the parse runs under `catch_unwind`.
pub fn extract(document: &[u8]) -> String {
    let parsed = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(document)));

    match parsed {
        Ok(Ok(text)) => {
            debug!("Extracted {} chars from resume", text.len());
            text
        }
        Ok(Err(e)) => {
            warn!("Resume PDF could not be parsed: {e}");
            could_not_read(e)
        }
        Err(panic) => {
            let cause = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "parser panicked".to_string());
            warn!("Resume PDF parser panicked: {cause}");
            could_not_read(cause)
        }
    }
}

/// Runs `extract` on the blocking pool. Still never fails.
pub async fn extract_off_thread(document: Bytes) -> String {
    tokio::task::spawn_blocking(move || extract(&document))
        .await
        .unwrap_or_else(could_not_read)
}

fn could_not_read(cause: impl std::fmt::Display) -> String {
    format!("Could not read PDF: {cause}")
}
