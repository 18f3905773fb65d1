//! Shared application state.

use std::sync::Arc;

use omnirace_scheduler::RaceScheduler;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The race engine behind `POST /v1/race`.
    pub scheduler: Arc<RaceScheduler>,
}

impl AppState {
    /// Create application state around a scheduler.
    #[must_use]
    pub fn new(scheduler: RaceScheduler) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }
}
