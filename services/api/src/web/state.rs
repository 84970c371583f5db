//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use music_school_core::entitlement::EntitlementResolver;
use music_school_core::ports::{CatalogStore, IdentityDirectory};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub resolver: Arc<EntitlementResolver>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the state from its parts; the entitlement resolver is
    /// constructed here from the configured admin allow-list so the list is
    /// injected exactly once.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        directory: Arc<dyn IdentityDirectory>,
        config: Arc<Config>,
    ) -> Self {
        let resolver = Arc::new(EntitlementResolver::new(config.admin_emails.iter()));
        Self {
            store,
            directory,
            resolver,
            config,
        }
    }
}
