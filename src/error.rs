//! Error types for scoring, configuration, the datastore, and HTTP handlers.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

/// Strict validation failures raised by the CEFR mapper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
  #[error("score must be between 0 and 100, got {score}")]
  InvalidScoreRange { score: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read { path: String, source: std::io::Error },
  #[error("failed to parse config file {path}: {source}")]
  Parse { path: String, source: toml::de::Error },
  #[error("invalid value for {key}: {value:?}")]
  InvalidOverride { key: String, value: String },
  #[error("dimension weights must sum to 100, got {sum}")]
  WeightSum { sum: u32 },
}

#[derive(Debug, Error)]
pub enum DbError {
  #[error("datastore is not configured")]
  Disabled,
  #[error("datastore request failed: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("datastore HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("failed to decode datastore response: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("no {table} row matching {filter}")]
  NotFound { table: String, filter: String },
  #[error("no free test code after {attempts} attempts")]
  TestCodeExhausted { attempts: usize },
}

/// Handler-facing error, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum AppError {
  #[error(transparent)]
  Score(#[from] ScoreError),
  #[error(transparent)]
  Db(#[from] DbError),
  #[error("bad request: {0}")]
  BadRequest(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      AppError::Score(e) => (StatusCode::BAD_REQUEST, e.to_string()),
      AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
      AppError::Db(DbError::NotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
      AppError::Db(DbError::Disabled) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
      AppError::Db(e) => {
        tracing::error!(target: "ibrani_dashboard", error = %e, "Datastore error");
        (StatusCode::BAD_GATEWAY, "Datastore error occurred".to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
