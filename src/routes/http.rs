//! HTTP endpoint handlers. These are thin wrappers that forward to scoring,
//! aggregation and the store. Each handler is instrumented and logs its key
//! parameters and a short result line.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  response::{Html, IntoResponse},
  Json,
};
use chrono::Utc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::dashboard::{get_dashboard_metrics, get_weekly_trends};
use crate::debug::{debug_data, debug_snapshot};
use crate::domain::{AiParameter, SessionStatus, V3SessionPatch};
use crate::error::{AppError, AppResult, DbError};
use crate::page::render_dashboard;
use crate::protocol::*;
use crate::scoring::{
  calculate_overall_score, map_score_to_cefr, weighted_score_for_dimension, DimensionScore, Dimensions,
};
use crate::session::build_session_summary;
use crate::state::AppState;
use crate::store::{ASSESSMENTS, LEVEL_RESULTS, SESSION_RESULTS, V3_SESSIONS};

fn not_found(table: &str, filter: String) -> AppError {
  AppError::Db(DbError::NotFound { table: table.to_string(), filter })
}

fn session_uuid(raw: &str) -> AppResult<String> {
  Uuid::parse_str(raw)
    .map(|u| u.to_string())
    .map_err(|_| AppError::BadRequest(format!("invalid session id: {raw}")))
}

// --- Dashboard ---

#[instrument(level = "info", skip(state))]
pub async fn http_dashboard_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let now = Utc::now();
  let metrics = get_dashboard_metrics(state.store.as_ref(), now).await;
  let trends = get_weekly_trends(state.store.as_ref(), now).await;
  info!(target: "ibrani_dashboard", total = metrics.total_assessments, days = trends.len(), "Dashboard page rendered");
  Html(render_dashboard(&metrics, &trends))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_dashboard_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(get_dashboard_metrics(state.store.as_ref(), Utc::now()).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_dashboard_trends(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(get_weekly_trends(state.store.as_ref(), Utc::now()).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_summary_metrics(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
  let metrics = state.store()?.assessment_summary_metrics().await?;
  Ok(Json(metrics))
}

// --- Scoring ---

#[instrument(level = "info", fields(score = q.score))]
pub async fn http_cefr(Query(q): Query<CefrQuery>) -> AppResult<impl IntoResponse> {
  let cefr_level = map_score_to_cefr(q.score)?;
  Ok(Json(CefrOut { score: q.score, cefr_level }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_score_overall(
  State(state): State<Arc<AppState>>,
  Json(body): Json<Dimensions<f64>>,
) -> AppResult<impl IntoResponse> {
  let scores = calculate_overall_score(&state.config.weights, &body)?;
  info!(target: "scoring", final_score = scores.final_score, cefr = %scores.final_score_cefr_level, "Overall score calculated");
  Ok(Json(scores))
}

#[instrument(level = "info", skip(state, body), fields(dimension = %body.dimension, raw_score = body.raw_score))]
pub async fn http_score_dimension(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DimensionIn>,
) -> AppResult<impl IntoResponse> {
  let score = match AiParameter::parse(&body.dimension) {
    Some(parameter) => weighted_score_for_dimension(&state.config.weights, parameter, body.raw_score)?,
    None => {
      error!(target: "scoring", dimension = %body.dimension, "Unknown dimension; no weight defined");
      DimensionScore::not_available()
    }
  };
  info!(target: "scoring", weighted = score.weighted_score, cefr = score.label(), "Dimension score calculated");
  Ok(Json(score))
}

// --- Sessions ---

#[instrument(level = "info", skip(body), fields(session_id = %body.session_id, tiers = body.assessments.len()))]
pub async fn http_session_summary(Json(body): Json<SessionSummaryIn>) -> impl IntoResponse {
  let summary = build_session_summary(&body.assessments, body.improvement_tip, &body.session_id);
  info!(target: "scoring", session_id = %summary.session_id, final_score = summary.final_score_raw_score, "Session summary built");
  Json(summary)
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
  let session = state.store()?.create_v3_session().await?;
  Ok(Json(session))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
  let id = session_uuid(&session_id)?;
  let session = state.store()?.get_v3_session(&id).await?;
  session.map(Json).ok_or_else(|| not_found(V3_SESSIONS, format!("session_id={id}")))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
  let id = session_uuid(&session_id)?;
  let deleted = state.store()?.delete_v3_session(&id).await?;
  info!(target: "store", session_id = %id, deleted, "Session delete requested");
  Ok(Json(DeletedOut { deleted }))
}

/// Load the stored tier results, build and persist the summary, then close the session.
#[instrument(level = "info", skip(state, body))]
pub async fn http_aggregate_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  body: Option<Json<AggregateIn>>,
) -> AppResult<impl IntoResponse> {
  let id = session_uuid(&session_id)?;
  let store = state.store()?;
  let tip = body.and_then(|Json(b)| b.improvement_tip);

  let levels = store.level_results_for_session(&id).await?;
  if levels.is_empty() {
    return Err(not_found(LEVEL_RESULTS, format!("session_id={id}")));
  }

  let summary = build_session_summary(&levels, tip, &id);
  let saved = store.save_session_summary(&summary).await?;

  let patch = V3SessionPatch { status: Some(SessionStatus::Completed), can_aggregate: Some(false), ..Default::default() };
  store.update_v3_session(&id, &patch).await?;

  info!(target: "scoring", session_id = %id, tiers = levels.len(), final_score = saved.final_score_raw_score, cefr = %saved.final_score_cerf_score, "Session aggregated");
  Ok(Json(saved))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session_summary(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
  let id = session_uuid(&session_id)?;
  let summary = state.store()?.get_session_summary(&id).await?;
  summary.map(Json).ok_or_else(|| not_found(SESSION_RESULTS, format!("session_id={id}")))
}

// --- Assessments ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_assessment(
  State(state): State<Arc<AppState>>,
  Path(assessment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
  let store = state.store()?;
  let assessment = store
    .get_assessment(&assessment_id)
    .await?
    .ok_or_else(|| not_found(ASSESSMENTS, format!("id={assessment_id}")))?;

  let parameter_scores = store.parameter_scores_for_assessment(&assessment_id).await?;
  let result = store.assessment_result(&assessment_id).await?;
  let has_valid_transcript = store.check_assessment_has_valid_transcript(&assessment_id).await?;

  Ok(Json(AssessmentDetailOut { assessment, parameter_scores, result, has_valid_transcript }))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_parameter_scores(
  State(state): State<Arc<AppState>>,
  Path(param_type): Path<String>,
  Query(q): Query<ParameterScoresQuery>,
) -> AppResult<impl IntoResponse> {
  let ids: Vec<String> = split_list(&q.assessment_ids).map(str::to_string).collect();
  if ids.is_empty() {
    return Err(AppError::BadRequest("assessment_ids must not be empty".into()));
  }
  let rows = state.store()?.parameter_scores(&ids, &param_type).await?;
  info!(target: "store", %param_type, requested = ids.len(), rows = rows.len(), "Parameter scores fetched");
  Ok(Json(rows))
}

#[instrument(level = "info", skip(state))]
pub async fn http_process_stuck(
  State(state): State<Arc<AppState>>,
  Query(q): Query<StuckQuery>,
) -> AppResult<impl IntoResponse> {
  let hours = q.hours.unwrap_or(DEFAULT_STUCK_HOURS);
  let outcome = state.store()?.process_stuck_assessments(hours).await?;
  info!(target: "store", hours, ?outcome, "Stuck assessment cleanup ran");
  Ok(Json(outcome))
}

// --- Levels and prompts ---

#[instrument(level = "info", skip(state))]
pub async fn http_levels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(LevelsOut { levels: state.config.levels.clone() })
}

#[instrument(level = "info", skip(state), fields(difficulty = %q.difficulty))]
pub async fn http_random_prompt(
  State(state): State<Arc<AppState>>,
  Query(q): Query<RandomPromptQuery>,
) -> AppResult<impl IntoResponse> {
  let exclude = parse_exclude_ids(q.exclude.as_deref())
    .map_err(|bad| AppError::BadRequest(format!("invalid prompt id in exclude: {bad}")))?;
  let level = state.config.level(q.difficulty);

  let prompt = state
    .store()?
    .random_prompt(&level.cefr, &exclude)
    .await?
    .ok_or_else(|| not_found("user_questions", format!("level in {:?}", level.cefr)))?;

  info!(target: "ibrani_dashboard", difficulty = %q.difficulty, prompt_id = prompt.id, "Random prompt served");
  Ok(Json(RandomPromptOut {
    difficulty: q.difficulty,
    minimum_seconds: level.minimum_seconds,
    recommended_seconds: level.recommended_seconds,
    prompt,
  }))
}

// --- Diagnostics ---

#[instrument(level = "info", skip(state))]
pub async fn http_debug(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(debug_snapshot(&state.config, state.store.as_ref(), Utc::now()).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_debug_data(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
  let report = debug_data(state.store()?, Utc::now()).await?;
  Ok(Json(report))
}
