//! HTTP API
//!
//! Thin axum layer over the session manager. Every route maps onto one
//! manager operation.

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::runtime::ProductionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<ProductionManager>,
}

impl AppState {
    pub fn new(sessions: ProductionManager) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }
}
