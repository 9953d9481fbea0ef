//! Run handlers: submission, lookup, cancellation and listing.
//!
//! Submission returns as soon as the run is recorded and queued; clients
//! poll `GET /runs/{id}` for the outcome.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use skillrun_core::service::run::SubmitRun;
use skillrun_types::error::RunError;
use skillrun_types::run::{Run, RunId};
use skillrun_types::skill::{SkillId, VersionSelector};

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedPrincipal;
use crate::http::extractors::query::RunListQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of `POST /skills/{id}/runs`.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRunBody {
    /// `"latest"` or a version number. Defaults to latest.
    #[serde(default)]
    pub version: VersionSelector,
    #[serde(default)]
    pub input: Value,
}

fn parse_run_id(raw: &str) -> Result<RunId, AppError> {
    raw.parse().map_err(|_| AppError::Run(RunError::NotFound))
}

/// POST /api/v1/skills/{id}/runs - Queue a run of a skill version.
pub async fn submit_run(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(skill_id): Path<String>,
    Json(body): Json<SubmitRunBody>,
) -> Result<(StatusCode, Json<ApiResponse<Run>>), AppError> {
    let start = Instant::now();
    let skill_id: SkillId = skill_id.parse().map_err(|_| {
        AppError::Run(RunError::InvalidReference(format!(
            "'{skill_id}' is not a skill id"
        )))
    })?;

    let run = state
        .run_service
        .submit(
            &principal.id,
            SubmitRun {
                skill_id,
                version: body.version,
                input: body.input,
            },
        )
        .await?;

    let link = format!("/api/v1/runs/{}", run.id);
    let resp = ApiResponse::timed(run, start).with_link("self", &link);
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// GET /api/v1/runs/{id} - Current state of a run.
pub async fn get_run(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<Run>>, AppError> {
    let start = Instant::now();
    let run_id = parse_run_id(&run_id)?;
    let run = state.run_service.get(&principal.id, &run_id).await?;

    let skill_link = format!("/api/v1/skills/{}", run.skill_id);
    let self_link = format!("/api/v1/runs/{}", run.id);
    Ok(Json(
        ApiResponse::timed(run, start)
            .with_link("self", &self_link)
            .with_link("skill", &skill_link),
    ))
}

/// POST /api/v1/runs/{id}/cancel - Cancel a queued or running run.
///
/// Cancelling a run that already finished returns it unchanged.
pub async fn cancel_run(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<Run>>, AppError> {
    let start = Instant::now();
    let run_id = parse_run_id(&run_id)?;
    let run = state.run_service.cancel(&principal.id, &run_id).await?;

    let link = format!("/api/v1/runs/{}", run.id);
    Ok(Json(ApiResponse::timed(run, start).with_link("self", &link)))
}

/// GET /api/v1/runs - Runs visible to the caller, newest first.
pub async fn list_runs(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<RunListQuery>,
) -> Result<Json<ApiResponse<Vec<Run>>>, AppError> {
    let start = Instant::now();
    let page = state
        .run_service
        .list(&principal.id, query.into_run_query()?)
        .await?;

    let next_cursor = page.next_cursor.map(|c| c.to_string());
    Ok(Json(
        ApiResponse::timed(page.runs, start)
            .with_link("self", "/api/v1/runs")
            .with_next_cursor(next_cursor),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use skillrun_types::config::GlobalConfig;

    use crate::http::test_support::TestApp;

    #[tokio::test]
    async fn test_submit_returns_queued_run() {
        let app = TestApp::new().await;
        let (alice, key) = app.principal("alice").await;
        let skill_id = app.create_skill(&key, "summarize", "private").await;

        let (status, body) = app
            .post(
                &format!("/api/v1/skills/{skill_id}/runs"),
                &key,
                json!({"input": {"text": "hello"}}),
            )
            .await;

        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        assert_eq!(body["data"]["state"], "queued");
        assert_eq!(body["data"]["version"], 1);
        assert_eq!(body["data"]["requested_by"], alice.id.to_string());
        assert_eq!(body["data"]["input"]["text"], "hello");
        assert_eq!(app.state.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_to_private_skill_of_other_principal_is_invalid_reference() {
        let app = TestApp::new().await;
        let (_, owner_key) = app.principal("owner").await;
        let (_, other_key) = app.principal("other").await;
        let skill_id = app.create_skill(&owner_key, "secret", "private").await;

        let (status, body) = app
            .post(&format!("/api/v1/skills/{skill_id}/runs"), &other_key, json!({}))
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["code"], "INVALID_REFERENCE");
        assert!(app.state.queue.is_empty());
    }

    #[tokio::test]
    async fn test_submit_with_missing_version_is_invalid_reference() {
        let app = TestApp::new().await;
        let (_, key) = app.principal("alice").await;
        let skill_id = app.create_skill(&key, "summarize", "private").await;

        let (status, _) = app
            .post(
                &format!("/api/v1/skills/{skill_id}/runs"),
                &key,
                json!({"version": 9}),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_submit_to_malformed_skill_id_is_invalid_reference() {
        let app = TestApp::new().await;
        let (_, key) = app.principal("alice").await;
        let (status, _) = app
            .post("/api/v1/skills/not-a-uuid/runs", &key, json!({}))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_full_queue_returns_503_with_retry_after() {
        let mut config = GlobalConfig::default();
        config.runner.queue_capacity = 1;
        config.runner.enqueue_timeout_ms = 10;
        let app = TestApp::with_config(config).await;
        let (_, key) = app.principal("alice").await;
        let skill_id = app.create_skill(&key, "summarize", "private").await;
        let path = format!("/api/v1/skills/{skill_id}/runs");

        let (first, _) = app.post(&path, &key, json!({})).await;
        assert_eq!(first, StatusCode::ACCEPTED);

        let (second, body) = app.post(&path, &key, json!({})).await;
        assert_eq!(second, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["errors"][0]["code"], "BACKPRESSURE");

        let (_, listed) = app.get("/api/v1/runs", Some(&key)).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_run_hidden_from_other_principal() {
        let app = TestApp::new().await;
        let (_, owner_key) = app.principal("owner").await;
        let (_, other_key) = app.principal("other").await;
        let skill_id = app.create_skill(&owner_key, "secret", "private").await;
        let (_, submitted) = app
            .post(&format!("/api/v1/skills/{skill_id}/runs"), &owner_key, json!({}))
            .await;
        let run_id = submitted["data"]["id"].as_str().unwrap();

        let (status, body) = app.get(&format!("/api/v1/runs/{run_id}"), Some(&owner_key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], run_id);

        let (status, _) = app.get(&format!("/api/v1/runs/{run_id}"), Some(&other_key)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_get_unknown_run_is_not_found() {
        let app = TestApp::new().await;
        let (_, key) = app.principal("alice").await;
        let (status, body) = app
            .get(&format!("/api/v1/runs/{}", uuid::Uuid::now_v7()), Some(&key))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "RUN_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cancel_queued_run_then_cancel_again_is_noop() {
        let app = TestApp::new().await;
        let (_, key) = app.principal("alice").await;
        let skill_id = app.create_skill(&key, "summarize", "private").await;
        let (_, submitted) = app
            .post(&format!("/api/v1/skills/{skill_id}/runs"), &key, json!({}))
            .await;
        let run_id = submitted["data"]["id"].as_str().unwrap();
        let path = format!("/api/v1/runs/{run_id}/cancel");

        let (status, body) = app.post(&path, &key, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "cancelled");
        let finished_at = body["data"]["finished_at"].clone();

        let (status, body) = app.post(&path, &key, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "cancelled");
        assert_eq!(body["data"]["finished_at"], finished_at);
    }

    #[tokio::test]
    async fn test_cancel_rights_follow_skill_access() {
        let app = TestApp::new().await;
        let (_, owner_key) = app.principal("owner").await;
        let (viewer, viewer_key) = app.principal("viewer").await;
        let (_, stranger_key) = app.principal("stranger").await;
        let skill_id = app.create_skill(&owner_key, "summarize", "private").await;
        app.put(
            &format!("/api/v1/skills/{skill_id}/collaborators/{}", viewer.id),
            &owner_key,
            json!({"role": "viewer"}),
        )
        .await;
        let (_, submitted) = app
            .post(&format!("/api/v1/skills/{skill_id}/runs"), &owner_key, json!({}))
            .await;
        let run_id = submitted["data"]["id"].as_str().unwrap();
        let path = format!("/api/v1/runs/{run_id}/cancel");

        let (status, _) = app.post(&path, &stranger_key, json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Viewers may run the skill, which is enough to cancel
        let (status, body) = app.post(&path, &viewer_key, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "cancelled");
    }

    #[tokio::test]
    async fn test_list_runs_paginates_with_cursor() {
        let app = TestApp::new().await;
        let (_, key) = app.principal("alice").await;
        let skill_id = app.create_skill(&key, "summarize", "private").await;
        for _ in 0..3 {
            app.post(&format!("/api/v1/skills/{skill_id}/runs"), &key, json!({}))
                .await;
        }

        let (status, first) = app.get("/api/v1/runs?limit=2", Some(&key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"].as_array().unwrap().len(), 2);
        let cursor = first["meta"]["next_cursor"].as_str().unwrap().to_string();

        let (_, second) = app
            .get(&format!("/api/v1/runs?limit=2&cursor={cursor}"), Some(&key))
            .await;
        assert_eq!(second["data"].as_array().unwrap().len(), 1);
        assert!(second["meta"].get("next_cursor").is_none());
    }

    #[tokio::test]
    async fn test_list_runs_rejects_bad_filters() {
        let app = TestApp::new().await;
        let (_, key) = app.principal("alice").await;

        let (status, _) = app.get("/api/v1/runs?state=paused", Some(&key)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app.get("/api/v1/runs?limit=0", Some(&key)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }
}
