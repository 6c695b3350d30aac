use std::sync::Arc;

use crate::{config::Config, sanitizer::HtmlSanitizer};
use axum::extract::FromRef;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    /// Built before the server starts; read-only afterwards.
    pub sanitizer: Arc<HtmlSanitizer>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<HtmlSanitizer> {
    fn from_ref(state: &AppState) -> Self {
        state.sanitizer.clone()
    }
}
