//! Shared Application State
//!
//! This module defines the `AppState` struct holding the shared HTTP
//! client and the loaded configuration.

use crate::config::Config;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}
