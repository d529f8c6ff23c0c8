//! Application state: validated configuration and the optional datastore.
//!
//! Built once in `main` and shared read-only behind an `Arc`. When the
//! datastore URL or key is missing the service still runs: scoring endpoints
//! work, dashboard reads report zeroed metrics, and datastore-backed
//! endpoints answer 503.

use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::error::DbError;
use crate::store::Store;
use crate::supabase::SupabaseClient;

pub struct AppState {
    pub config: AppConfig,
    pub store: Option<Store>,
}

impl AppState {
    #[instrument(level = "info", skip_all)]
    pub fn new(config: AppConfig) -> Self {
        let store = SupabaseClient::from_settings(&config.datastore).map(Store::new);
        if let Some(s) = &store {
            info!(target: "ibrani_dashboard", rest_url = %s.client().rest_url(), "Datastore enabled.");
        } else {
            warn!(target: "ibrani_dashboard", "Datastore disabled (SUPABASE_URL or key missing). Dashboard will report empty metrics.");
        }

        for (tier, level) in &config.levels {
            info!(target: "ibrani_dashboard", %tier, cefr = ?level.cefr, min_s = level.minimum_seconds, rec_s = level.recommended_seconds, "Level mapping");
        }

        Self { config, store }
    }

    /// State without a datastore, for tests.
    #[cfg(test)]
    pub fn offline() -> Self {
        Self { config: AppConfig::default(), store: None }
    }

    /// The datastore, or `DbError::Disabled` when not configured.
    pub fn store(&self) -> Result<&Store, DbError> {
        self.store.as_ref().ok_or(DbError::Disabled)
    }
}
