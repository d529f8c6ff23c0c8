//! Router assembly: dashboard page, JSON API, diagnostics, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - the server-rendered dashboard at `/`
/// - the JSON API under `/api/v1/...`
/// - diagnostics at `/debug` and `/debug-data`
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(http::http_dashboard_page))
        .route("/api/v1/health", get(http::http_health))
        // Dashboard
        .route("/api/v1/dashboard/metrics", get(http::http_dashboard_metrics))
        .route("/api/v1/dashboard/trends", get(http::http_dashboard_trends))
        .route("/api/v1/dashboard/summary-metrics", get(http::http_summary_metrics))
        // Scoring
        .route("/api/v1/cefr", get(http::http_cefr))
        .route("/api/v1/score/overall", post(http::http_score_overall))
        .route("/api/v1/score/dimension", post(http::http_score_dimension))
        // Sessions
        .route("/api/v1/sessions", post(http::http_create_session))
        .route("/api/v1/sessions/summary", post(http::http_session_summary))
        .route(
            "/api/v1/sessions/:session_id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/sessions/:session_id/aggregate", post(http::http_aggregate_session))
        .route("/api/v1/sessions/:session_id/summary", get(http::http_get_session_summary))
        // Assessments
        .route("/api/v1/assessments/:assessment_id", get(http::http_get_assessment))
        .route("/api/v1/scores/:param_type", get(http::http_parameter_scores))
        .route("/api/v1/maintenance/stuck-assessments", post(http::http_process_stuck))
        // Levels and prompts
        .route("/api/v1/levels", get(http::http_levels))
        .route("/api/v1/prompts/random", get(http::http_random_prompt))
        // Diagnostics
        .route("/debug", get(http::http_debug))
        .route("/debug-data", get(http::http_debug_data))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(Arc::new(AppState::offline()))
    }

    async fn send(req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let res = app().oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let (status, body) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(uri: &str, payload: Value) -> (StatusCode, Value) {
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = send(req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get_json("/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn cefr_maps_and_rejects() {
        let (status, body) = get_json("/api/v1/cefr?score=67").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cefr_level"], "B1.2");

        let (status, body) = get_json("/api/v1/cefr?score=101").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("between 0 and 100"));
    }

    #[tokio::test]
    async fn overall_score_uses_default_weights() {
        let (status, body) = post_json(
            "/api/v1/score/overall",
            json!({
                "grammar_morphology": 80, "vocabulary_sophistication": 70,
                "fluency_coherence": 60, "syntax_word_order": 65,
                "pause_patterns": 55, "task_completion": 60
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["final_score"], 67);
        assert_eq!(body["final_score_cefr_level"], "B1.2");
    }

    #[tokio::test]
    async fn dimension_score_handles_unweighted_names() {
        let (status, body) =
            post_json("/api/v1/score/dimension", json!({ "dimension": "grammar_morphology", "raw_score": 50 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["weighted_score"], 11.5);
        assert_eq!(body["raw_score_cefr_level"], "A2.1");

        for name in ["overall_proficiency", "made_up"] {
            let (status, body) =
                post_json("/api/v1/score/dimension", json!({ "dimension": name, "raw_score": 50 })).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["weighted_score"], 0.0);
            assert_eq!(body["raw_score_cefr_level"], "N/A");
        }
    }

    #[tokio::test]
    async fn session_summary_divides_by_four() {
        let (status, body) = post_json(
            "/api/v1/sessions/summary",
            json!({
                "session_id": "s-1",
                "assessments": {
                    "easy": { "evaluationResult": { "grammar_morphology": { "raw_score": 80 } }, "overall_score": { "final_score": 80 } },
                    "medium": { "evaluationResult": { "grammar_morphology": { "raw_score": 80 } }, "overall_score": { "final_score": 80 } }
                }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "s-1");
        assert_eq!(body["grammar_morphology_raw_score"], 40);
        assert_eq!(body["final_score_raw_score"], 40);
        assert_eq!(body["final_score_cerf_score"], "A1.1");
    }

    #[tokio::test]
    async fn dashboard_degrades_without_datastore() {
        let (status, body) = get_json("/api/v1/dashboard/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalAssessments"], 0);
        assert_eq!(body["successRate"], 0.0);

        let (status, body) = get_json("/api/v1/dashboard/trends").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, html) = send(Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(html).unwrap();
        assert!(html.contains("Ibrani Dashboard"));
        assert!(html.contains("No data available for the past week"));
    }

    #[tokio::test]
    async fn datastore_routes_report_unavailable() {
        let id = "6f1c2a9e-3b7d-4c1e-9a55-0d2f8b7e4c11";
        let (status, body) = post_json(&format!("/api/v1/sessions/{id}/aggregate"), json!({})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "datastore is not configured");

        let (status, _) = get_json("/api/v1/prompts/random?difficulty=easy").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn malformed_session_id_is_rejected() {
        let (status, body) = get_json("/api/v1/sessions/not-a-uuid/summary").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid session id"));
    }

    #[tokio::test]
    async fn levels_list_every_tier() {
        let (status, body) = get_json("/api/v1/levels").await;
        assert_eq!(status, StatusCode::OK);
        for tier in ["easy", "medium", "hard", "difficult"] {
            assert!(body["levels"].get(tier).is_some(), "{tier}");
        }
    }

    #[tokio::test]
    async fn debug_snapshot_reports_disabled_datastore() {
        let (status, body) = get_json("/debug").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connectionOk"], false);
        assert_eq!(body["env"]["datastoreEnabled"], false);
    }
}
