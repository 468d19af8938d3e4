//! Tokenkeeper: token registration, activation and validity service.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! in `tests/` drive them directly.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod errors;
pub mod expiry;
pub mod jobs;
pub mod models;
pub mod registry;
pub mod store;

use registry::TokenRegistry;

/// Shared application state passed to handlers.
pub struct AppState {
    pub registry: Arc<TokenRegistry>,
    pub config: config::Config,
}

impl AppState {
    pub fn new(registry: Arc<TokenRegistry>, config: config::Config) -> Arc<Self> {
        Arc::new(Self { registry, config })
    }
}
