// HTTP handlers for the usage API.
//
// Tenant and plan identifiers arrive as request parameters from the
// upstream identity layer; an unknown plan id is evaluated as `free`.

pub mod usage;

use std::sync::Arc;

use crate::database::DatabaseManager;
use crate::usage::enforcement::LimitEnforcer;

/// Injected services shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// None when running against the in-memory store (local development)
    pub db: Option<Arc<DatabaseManager>>,
    pub enforcer: LimitEnforcer,
}
