//! Query parameter extractors for list endpoints.

use serde::Deserialize;

use skillrun_core::service::run::RunQuery;
use skillrun_types::principal::PrincipalId;
use skillrun_types::run::{RunId, RunState};
use skillrun_types::skill::SkillId;

use crate::http::error::AppError;

/// Query parameters for `GET /runs`.
#[derive(Debug, Deserialize, Default)]
pub struct RunListQuery {
    /// Filter by skill id.
    pub skill: Option<String>,
    /// Filter by state (queued, running, succeeded, failed, cancelled).
    pub state: Option<String>,
    /// Filter by the principal that requested the run.
    pub principal: Option<String>,
    /// Page size (default 20, max 100).
    pub limit: Option<u32>,
    /// Opaque cursor from the previous page's `meta.next_cursor`.
    pub cursor: Option<String>,
}

impl RunListQuery {
    /// Parse the string filters into a service query.
    pub fn into_run_query(self) -> Result<RunQuery, AppError> {
        let skill_id = match self.skill.as_deref() {
            Some(s) => Some(
                s.parse::<SkillId>()
                    .map_err(|_| AppError::Validation(format!("invalid skill id: '{s}'")))?,
            ),
            None => None,
        };
        let state = match self.state.as_deref() {
            Some(s) => Some(s.parse::<RunState>().map_err(AppError::Validation)?),
            None => None,
        };
        let requested_by = match self.principal.as_deref() {
            Some(s) => Some(
                s.parse::<PrincipalId>()
                    .map_err(|_| AppError::Validation(format!("invalid principal id: '{s}'")))?,
            ),
            None => None,
        };
        let cursor = match self.cursor.as_deref() {
            Some(s) => Some(
                s.parse::<RunId>()
                    .map_err(|_| AppError::Validation(format!("invalid cursor: '{s}'")))?,
            ),
            None => None,
        };

        Ok(RunQuery {
            skill_id,
            state,
            requested_by,
            cursor,
            limit: self.limit,
        })
    }
}

/// Query parameters for `GET /skills`.
#[derive(Debug, Deserialize, Default)]
pub struct SkillListQuery {
    /// Also list public skills owned by others.
    #[serde(default)]
    pub include_public: bool,
}
