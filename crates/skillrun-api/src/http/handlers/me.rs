//! Identity of the calling principal.

use std::time::Instant;

use axum::Json;

use skillrun_types::principal::Principal;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedPrincipal;
use crate::http::response::ApiResponse;

/// GET /api/v1/me - The principal behind the API key.
pub async fn get_me(
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> Result<Json<ApiResponse<Principal>>, AppError> {
    let start = Instant::now();
    Ok(Json(ApiResponse::timed(principal, start).with_link("self", "/api/v1/me")))
}
