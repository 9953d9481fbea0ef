//! Skill authoring handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use skillrun_core::service::skill::{CreateSkill, SkillDetail, UpdateSkill};
use skillrun_types::error::SkillError;
use skillrun_types::principal::PrincipalId;
use skillrun_types::skill::{CollaboratorRole, Skill, SkillId, SkillVersion};

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedPrincipal;
use crate::http::extractors::query::SkillListQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of `PUT /skills/{id}/collaborators/{principal_id}`.
#[derive(Debug, Deserialize)]
pub struct CollaboratorBody {
    pub role: CollaboratorRole,
}

fn parse_skill_id(raw: &str) -> Result<SkillId, AppError> {
    raw.parse().map_err(|_| AppError::Skill(SkillError::NotFound))
}

fn parse_principal_id(raw: &str) -> Result<PrincipalId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid principal id: '{raw}'")))
}

fn detail_response(detail: SkillDetail, start: Instant) -> ApiResponse<SkillDetail> {
    let id = detail.skill.id;
    ApiResponse::timed(detail, start)
        .with_link("self", &format!("/api/v1/skills/{id}"))
        .with_link("versions", &format!("/api/v1/skills/{id}/versions"))
        .with_link("runs", &format!("/api/v1/skills/{id}/runs"))
}

/// POST /api/v1/skills - Create a skill owned by the caller.
pub async fn create_skill(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Json(body): Json<CreateSkill>,
) -> Result<(StatusCode, Json<ApiResponse<SkillDetail>>), AppError> {
    let start = Instant::now();
    let detail = state.skill_service.create_skill(&principal.id, body).await?;
    Ok((StatusCode::CREATED, Json(detail_response(detail, start))))
}

/// GET /api/v1/skills - Skills the caller owns or collaborates on.
pub async fn list_skills(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<SkillListQuery>,
) -> Result<Json<ApiResponse<Vec<Skill>>>, AppError> {
    let start = Instant::now();
    let skills = state
        .skill_service
        .list_skills(&principal.id, query.include_public)
        .await?;
    Ok(Json(
        ApiResponse::timed(skills, start).with_link("self", "/api/v1/skills"),
    ))
}

/// GET /api/v1/skills/{id} - A skill, its latest version and the caller's permissions.
pub async fn get_skill(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SkillDetail>>, AppError> {
    let start = Instant::now();
    let id = parse_skill_id(&id)?;
    let detail = state.skill_service.get_skill(&principal.id, &id).await?;
    Ok(Json(detail_response(detail, start)))
}

/// PUT /api/v1/skills/{id} - Update metadata and/or publish new content.
pub async fn update_skill(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(body): Json<UpdateSkill>,
) -> Result<Json<ApiResponse<SkillDetail>>, AppError> {
    let start = Instant::now();
    let id = parse_skill_id(&id)?;
    let detail = state
        .skill_service
        .update_skill(&principal.id, &id, body)
        .await?;
    Ok(Json(detail_response(detail, start)))
}

/// GET /api/v1/skills/{id}/versions - All versions, newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<SkillVersion>>>, AppError> {
    let start = Instant::now();
    let id = parse_skill_id(&id)?;
    let versions = state.skill_service.list_versions(&principal.id, &id).await?;
    Ok(Json(
        ApiResponse::timed(versions, start)
            .with_link("skill", &format!("/api/v1/skills/{id}")),
    ))
}

/// PUT /api/v1/skills/{id}/collaborators/{principal_id} - Grant or change a role.
pub async fn set_collaborator(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path((id, collaborator)): Path<(String, String)>,
    Json(body): Json<CollaboratorBody>,
) -> Result<Json<ApiResponse<Skill>>, AppError> {
    let start = Instant::now();
    let id = parse_skill_id(&id)?;
    let collaborator = parse_principal_id(&collaborator)?;
    let skill = state
        .skill_service
        .set_collaborator(&principal.id, &id, &collaborator, body.role)
        .await?;
    Ok(Json(ApiResponse::timed(skill, start)))
}

/// DELETE /api/v1/skills/{id}/collaborators/{principal_id} - Revoke a collaborator.
pub async fn remove_collaborator(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path((id, collaborator)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Skill>>, AppError> {
    let start = Instant::now();
    let id = parse_skill_id(&id)?;
    let collaborator = parse_principal_id(&collaborator)?;
    let skill = state
        .skill_service
        .remove_collaborator(&principal.id, &id, &collaborator)
        .await?;
    Ok(Json(ApiResponse::timed(skill, start)))
}
