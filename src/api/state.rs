//! Application state for the API server

use crate::config::Config;
use crate::service::MirrorService;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state accessible to all route handlers
///
/// Cloned per request (cheap Arc clones); provides access to the mirror
/// service, configuration, and the process start time for the liveness
/// endpoint.
#[derive(Clone)]
pub struct AppState {
    /// The mirror service core
    pub service: Arc<MirrorService>,

    /// Configuration (read access)
    pub config: Arc<Config>,

    /// When this API instance came up
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<MirrorService>, config: Arc<Config>) -> Self {
        Self {
            service,
            config,
            started_at: Instant::now(),
        }
    }
}
