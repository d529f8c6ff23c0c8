//! Ibrani · Hebrew Assessment Dashboard & Scoring Service
//!
//! - Axum HTTP API: CEFR mapping, weighted scoring, session aggregation
//! - Dashboard metrics over a Supabase (PostgREST) datastore
//! - Server-rendered dashboard page at `/`
//!
//! Important env variables:
//!   PORT                       : u16 (default 3000)
//!   DASHBOARD_CONFIG_PATH      : path to TOML config (weights + level mapping)
//!   {DIMENSION}_WEIGHT         : per-dimension weight override, e.g. GRAMMAR_MORPHOLOGY_WEIGHT=23
//!   LEVEL_{TIER}               : comma list of CEFR labels for a tier, e.g. LEVEL_EASY=A1.1,A1.2
//!   MIN_SECONDS_{TIER}         : minimum recording length for a tier
//!   RECOMMENDED_SECONDS_{TIER} : recommended recording length for a tier
//!   SUPABASE_URL               : datastore base URL; dashboard reads are disabled without it
//!   SUPABASE_SERVICE_ROLE_KEY  : datastore key (falls back to SUPABASE_ANON_KEY)
//!   LOG_LEVEL                  : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                 : "pretty" (default) or "json"

mod telemetry;
mod error;
mod domain;
mod scoring;
mod config;
mod session;
mod supabase;
mod store;
mod dashboard;
mod debug;
mod page;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Weights are validated here; a bad table stops the process.
  let config = AppConfig::from_env().map_err(|e| {
    error!(target: "ibrani_dashboard", error = %e, "Invalid configuration");
    e
  })?;
  info!(target: "ibrani_dashboard", weights = ?config.weights, "Scoring weights loaded");

  let state = Arc::new(AppState::new(config));
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "ibrani_dashboard", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
