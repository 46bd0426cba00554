//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use tutoring_core::ports::DatabaseService;
use tutoring_core::service::AccessService;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
/// Handlers keep no per-request state of their own; all coordination happens in
/// the store.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub access: AccessService,
}

impl AppState {
    pub fn new(db: Arc<dyn DatabaseService>, config: Arc<Config>) -> Self {
        let routes = Arc::new(config.routing_table.clone());
        let access = AccessService::new(db.clone(), routes);
        Self { db, config, access }
    }
}
