//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use study_assistant_core::StudyService;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StudyService>,
    pub config: Arc<Config>,
    /// False when the server runs without a language-model key.
    pub generation_configured: bool,
}
