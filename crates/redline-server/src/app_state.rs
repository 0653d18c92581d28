//! Shared application state.
//!
//! Both listeners receive a clone of the same `AppState`, so the application
//! server writes into the registry the metrics server reads from.

use std::sync::Arc;

use crate::obs::Registry;

#[derive(Clone)]
pub struct AppState {
    metrics: Arc<Registry>,
}

impl AppState {
    pub fn new(metrics: Arc<Registry>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Registry {
        &self.metrics
    }

    pub fn metrics_handle(&self) -> Arc<Registry> {
        Arc::clone(&self.metrics)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(Registry::new()))
    }
}
