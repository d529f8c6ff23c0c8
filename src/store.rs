//! Typed access to the assessment tables and database functions.
//!
//! This owns:
//!   - CRUD wrappers for assessments, sessions, scores and results
//!   - per-tier level results of a session and persisted session summaries
//!   - wrappers for the database functions exposed over RPC
//!
//! All calls go through `SupabaseClient`; nothing here is cached.

use std::future::Future;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::domain::{
  Assessment, AssessmentResult, Difficulty, ParameterScore, SessionStatus, UserQuestion, V3Session, V3SessionPatch,
};
use crate::error::DbError;
use crate::session::{LevelResult, SessionSummary, TierMap};
use crate::supabase::{Query, SupabaseClient};

pub const ASSESSMENTS: &str = "assessments";
pub const V3_SESSIONS: &str = "v3_sessions";
pub const PARAMETER_SCORES: &str = "parameter_scores";
pub const ASSESSMENT_RESULTS: &str = "assessment_results";
pub const LEVEL_RESULTS: &str = "level_results";
pub const SESSION_RESULTS: &str = "session_results";

const TEST_CODE_LEN: usize = 6;
const TEST_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const TEST_CODE_ATTEMPTS: usize = 5;

/// One stored tier result of a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LevelResultRow {
  pub session_id: String,
  pub level: Difficulty,
  #[serde(default)]
  pub result: LevelResult,
}

#[derive(Serialize)]
struct NewV3Session<'a> {
  total_questions: u32,
  completed_questions: u32,
  failed_questions: u32,
  processing_questions: u32,
  status: SessionStatus,
  can_aggregate: bool,
  user_test_code: &'a str,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StuckCleanup {
  pub cleanup_count: u32,
  pub error_count: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ParameterScoreRow {
  pub assessment_id: String,
  pub raw_score: f64,
  pub cefr_level: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SummaryMetric {
  pub metric_name: String,
  pub metric_value: f64,
  #[serde(default)]
  pub metric_description: Option<String>,
}

/// Random, human-friendly code shown to test takers (no 0/O/1/I).
pub fn generate_test_code<R: Rng>(rng: &mut R) -> String {
  (0..TEST_CODE_LEN)
    .map(|_| TEST_CODE_ALPHABET[rng.gen_range(0..TEST_CODE_ALPHABET.len())] as char)
    .collect()
}

/// Draw codes until `is_taken` reports a free one. Every candidate is checked.
async fn first_free_code<G, F, Fut>(mut next_code: G, mut is_taken: F) -> Result<String, DbError>
where
  G: FnMut() -> String,
  F: FnMut(String) -> Fut,
  Fut: Future<Output = Result<bool, DbError>>,
{
  for attempt in 1..=TEST_CODE_ATTEMPTS {
    let code = next_code();
    if !is_taken(code.clone()).await? {
      return Ok(code);
    }
    warn!(target: "store", attempt, "Test code collision; regenerating");
  }
  Err(DbError::TestCodeExhausted { attempts: TEST_CODE_ATTEMPTS })
}

#[derive(Clone)]
pub struct Store {
  db: SupabaseClient,
}

impl Store {
  pub fn new(db: SupabaseClient) -> Self {
    Self { db }
  }

  pub fn client(&self) -> &SupabaseClient {
    &self.db
  }

  // --- Assessments ---

  pub async fn get_assessment(&self, id: &str) -> Result<Option<Assessment>, DbError> {
    self.db.select_one(ASSESSMENTS, &Query::new().eq("id", id)).await
  }

  /// Assessments created at or after `since` (RFC 3339 or a date), optionally before `until`.
  #[instrument(level = "debug", skip(self))]
  pub async fn assessments_between(
    &self,
    columns: &str,
    since: &str,
    until: Option<&str>,
  ) -> Result<Vec<Assessment>, DbError> {
    let mut q = Query::new().select(columns).gte("created_at", since);
    if let Some(until) = until {
      q = q.lt("created_at", until);
    }
    self.db.select(ASSESSMENTS, &q.order("created_at", true)).await
  }

  // --- Sessions ---

  /// Create a session with the default counters and a fresh unique test code.
  #[instrument(level = "info", skip(self))]
  pub async fn create_v3_session(&self) -> Result<V3Session, DbError> {
    let code = self.unique_test_code().await?;
    let row = NewV3Session {
      total_questions: Difficulty::ALL.len() as u32,
      completed_questions: 0,
      failed_questions: 0,
      processing_questions: 0,
      status: SessionStatus::InProgress,
      can_aggregate: false,
      user_test_code: &code,
    };
    let created: V3Session = self.db.insert(V3_SESSIONS, &row).await?;
    info!(target: "store", session_id = %created.session_id, "Created session");
    Ok(created)
  }

  async fn unique_test_code(&self) -> Result<String, DbError> {
    first_free_code(
      || generate_test_code(&mut rand::thread_rng()),
      |code| async move {
        let taken: Option<V3Session> = self
          .db
          .select_one(V3_SESSIONS, &Query::new().select("session_id").eq("user_test_code", &code))
          .await?;
        Ok(taken.is_some())
      },
    )
    .await
  }

  pub async fn get_v3_session(&self, session_id: &str) -> Result<Option<V3Session>, DbError> {
    self.db.select_one(V3_SESSIONS, &Query::new().eq("session_id", session_id)).await
  }

  pub async fn update_v3_session(&self, session_id: &str, patch: &V3SessionPatch) -> Result<V3Session, DbError> {
    self.db.update(V3_SESSIONS, &Query::new().eq("session_id", session_id), patch).await
  }

  pub async fn delete_v3_session(&self, session_id: &str) -> Result<bool, DbError> {
    Ok(self.db.delete(V3_SESSIONS, &Query::new().eq("session_id", session_id)).await? > 0)
  }

  // --- Scores and results ---

  pub async fn parameter_scores_for_assessment(&self, assessment_id: &str) -> Result<Vec<ParameterScore>, DbError> {
    self.db.select(PARAMETER_SCORES, &Query::new().eq("assessment_id", assessment_id)).await
  }

  pub async fn assessment_result(&self, assessment_id: &str) -> Result<Option<AssessmentResult>, DbError> {
    self.db.select_one(ASSESSMENT_RESULTS, &Query::new().eq("assessment_id", assessment_id)).await
  }

  /// Stored tier results of a session, keyed by tier in storage order.
  #[instrument(level = "info", skip(self))]
  pub async fn level_results_for_session(&self, session_id: &str) -> Result<TierMap<LevelResult>, DbError> {
    let rows: Vec<LevelResultRow> = self
      .db
      .select(LEVEL_RESULTS, &Query::new().eq("session_id", session_id).order("created_at", true))
      .await?;
    Ok(rows.into_iter().map(|r| (r.level, r.result)).collect())
  }

  #[instrument(level = "info", skip(self, summary), fields(session_id = %summary.session_id))]
  pub async fn save_session_summary(&self, summary: &SessionSummary) -> Result<SessionSummary, DbError> {
    self.db.upsert(SESSION_RESULTS, "session_id", summary).await
  }

  pub async fn get_session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>, DbError> {
    self.db.select_one(SESSION_RESULTS, &Query::new().eq("session_id", session_id)).await
  }

  // --- Database functions ---

  pub async fn check_assessment_has_valid_transcript(&self, assessment_id: &str) -> Result<bool, DbError> {
    self.db.rpc("check_assessment_has_valid_transcript", &json!({ "assessment_uuid": assessment_id })).await
  }

  pub async fn process_stuck_assessments(&self, stuck_threshold_hours: u32) -> Result<Option<StuckCleanup>, DbError> {
    let rows: Vec<StuckCleanup> = self
      .db
      .rpc("process_stuck_assessments", &json!({ "stuck_threshold_hours": stuck_threshold_hours }))
      .await?;
    Ok(rows.into_iter().next())
  }

  pub async fn parameter_scores(&self, assessment_ids: &[String], param_type: &str) -> Result<Vec<ParameterScoreRow>, DbError> {
    self
      .db
      .rpc("get_parameter_scores", &json!({ "assessment_ids": assessment_ids, "param_type": param_type }))
      .await
  }

  pub async fn assessment_summary_metrics(&self) -> Result<Vec<SummaryMetric>, DbError> {
    self.db.rpc("get_assessment_summary_metrics", &json!({})).await
  }

  /// One random prompt whose level is in `levels`, skipping `exclude_ids`.
  #[instrument(level = "info", skip(self))]
  pub async fn random_prompt(&self, levels: &[String], exclude_ids: &[i64]) -> Result<Option<UserQuestion>, DbError> {
    let rows: Vec<UserQuestion> = self
      .db
      .rpc(
        "get_random_prompt_by_levels_excluding_ids",
        &json!({ "level_inputs": levels, "exclude_ids": exclude_ids }),
      )
      .await?;
    Ok(rows.into_iter().next())
  }
}
