use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::GenerativeProvider;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Built once at startup and shared read-only by every request.
    pub provider: Arc<dyn GenerativeProvider>,
}
