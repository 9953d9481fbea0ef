//! SQLite run record store.
//!
//! Every state change is one `UPDATE ... WHERE id = ? AND state = ?` on the
//! single-connection writer pool, returning the updated row. When no row
//! matches, the current state is read back to distinguish `NotFound` from a
//! lost race (`Stale`).

use chrono::{DateTime, Utc};
use skillrun_core::repository::run::{RunFilter, RunRepository, Transition};
use skillrun_types::error::RepositoryError;
use skillrun_types::principal::PrincipalId;
use skillrun_types::run::{FailureKind, Run, RunFailure, RunId, RunState};
use skillrun_types::skill::SkillId;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error, write_error};

/// SQLite-backed implementation of `RunRepository`.
pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded update matched no row.
    async fn miss(&self, id: &RunId, expected: RunState) -> RepositoryError {
        let current = sqlx::query("SELECT state FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.writer)
            .await;

        match current {
            Ok(Some(row)) => RepositoryError::Stale {
                expected: expected.to_string(),
                actual: row.try_get::<String, _>("state").unwrap_or_default(),
            },
            Ok(None) => RepositoryError::NotFound,
            Err(e) => query_error(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    skill_id: String,
    version: i64,
    requested_by: String,
    input: String,
    state: String,
    attempt: i64,
    output: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    updated_at: String,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            skill_id: row.try_get("skill_id")?,
            version: row.try_get("version")?,
            requested_by: row.try_get("requested_by")?,
            input: row.try_get("input")?,
            state: row.try_get("state")?,
            attempt: row.try_get("attempt")?,
            output: row.try_get("output")?,
            error_kind: row.try_get("error_kind")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_run(self) -> Result<Run, RepositoryError> {
        let state: RunState = self.state.parse().map_err(RepositoryError::Query)?;

        let input = serde_json::from_str(&self.input)
            .map_err(|e| RepositoryError::Query(format!("invalid run input: {e}")))?;
        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid run output: {e}")))
            })
            .transpose()?;

        let error = match self.error_kind {
            Some(kind) => {
                let kind: FailureKind = serde_json::from_value(serde_json::Value::String(kind.clone()))
                    .map_err(|_| RepositoryError::Query(format!("invalid failure kind: {kind}")))?;
                Some(RunFailure::new(kind, self.error_message.unwrap_or_default()))
            }
            None => None,
        };

        Ok(Run {
            id: RunId(parse_uuid(&self.id)?),
            skill_id: SkillId(parse_uuid(&self.skill_id)?),
            version: to_u32(self.version, "version")?,
            requested_by: PrincipalId(parse_uuid(&self.requested_by)?),
            input,
            state,
            attempt: to_u32(self.attempt, "attempt")?,
            output,
            error,
            created_at: parse_datetime(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_datetime).transpose()?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Run, RepositoryError> {
    RunRow::from_row(row).map_err(query_error)?.into_run()
}

fn to_u32(value: i64, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Query(format!("invalid {field}: {value}")))
}

fn failure_kind_str(kind: FailureKind) -> Result<String, RepositoryError> {
    match serde_json::to_value(kind) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        _ => Err(RepositoryError::Query(format!("unencodable failure kind {kind:?}"))),
    }
}

fn to_json(value: &serde_json::Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize: {e}")))
}

// ---------------------------------------------------------------------------
// RunRepository impl
// ---------------------------------------------------------------------------

impl RunRepository for SqliteRunRepository {
    async fn create(&self, run: &Run) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO runs (id, skill_id, version, requested_by, input, state, attempt, output, error_kind, error_message, created_at, started_at, finished_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.skill_id.to_string())
        .bind(i64::from(run.version))
        .bind(run.requested_by.to_string())
        .bind(to_json(&run.input)?)
        .bind(run.state.as_str())
        .bind(i64::from(run.attempt))
        .bind(run.output.as_ref().map(to_json).transpose()?)
        .bind(run.error.as_ref().map(|e| failure_kind_str(e.kind)).transpose()?)
        .bind(run.error.as_ref().map(|e| e.message.clone()))
        .bind(format_datetime(&run.created_at))
        .bind(run.started_at.as_ref().map(format_datetime))
        .bind(run.finished_at.as_ref().map(format_datetime))
        .bind(format_datetime(&run.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn get(&self, id: &RunId) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(decode).transpose()
    }

    async fn transition(&self, id: &RunId, t: &Transition) -> Result<Run, RepositoryError> {
        t.validate()?;

        let now = format_datetime(&Utc::now());
        let claiming = t.to == RunState::Running;
        let terminal = t.to.is_terminal();
        let attempt = t.attempt.map(i64::from);

        let row = sqlx::query(
            "UPDATE runs SET
                state = ?,
                updated_at = ?,
                attempt = attempt + ?,
                started_at = CASE WHEN ? THEN ? ELSE started_at END,
                finished_at = CASE WHEN ? THEN ? ELSE finished_at END,
                output = ?,
                error_kind = ?,
                error_message = ?
             WHERE id = ? AND state = ? AND (? IS NULL OR attempt = ?)
             RETURNING *",
        )
        .bind(t.to.as_str())
        .bind(&now)
        .bind(i64::from(claiming))
        .bind(claiming)
        .bind(&now)
        .bind(terminal)
        .bind(&now)
        .bind(t.output.as_ref().map(to_json).transpose()?)
        .bind(t.error.as_ref().map(|e| failure_kind_str(e.kind)).transpose()?)
        .bind(t.error.as_ref().map(|e| e.message.clone()))
        .bind(id.to_string())
        .bind(t.from.as_str())
        .bind(attempt)
        .bind(attempt)
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => decode(&row),
            None => Err(self.miss(id, t.from).await),
        }
    }

    async fn requeue(&self, id: &RunId, attempt: u32) -> Result<Run, RepositoryError> {
        let row = sqlx::query(
            "UPDATE runs SET state = 'queued', started_at = NULL, updated_at = ?
             WHERE id = ? AND state = 'running' AND attempt = ?
             RETURNING *",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .bind(i64::from(attempt))
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => decode(&row),
            None => Err(self.miss(id, RunState::Running).await),
        }
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM runs");
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(skill_id) = &filter.skill_id {
            conditions.push("skill_id = ?");
            binds.push(skill_id.to_string());
        }
        if let Some(state) = &filter.state {
            conditions.push("state = ?");
            binds.push(state.as_str().to_string());
        }
        if let Some(principal) = &filter.requested_by {
            conditions.push("requested_by = ?");
            binds.push(principal.to_string());
        }
        if let Some(before) = &filter.before {
            conditions.push("id < ?");
            binds.push(before.to_string());
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        // UUIDv7 text order is creation order.
        sql.push_str(" ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(value.as_str());
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(decode).collect()
    }

    async fn list_stale(
        &self,
        state: RunState,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM runs WHERE state = ? AND updated_at < ? ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(state.as_str())
        .bind(format_datetime(&cutoff))
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;
        rows.iter().map(decode).collect()
    }

    async fn count_by_state(&self) -> Result<Vec<(RunState, u64)>, RepositoryError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM runs GROUP BY state")
                .fetch_all(&self.pool.reader)
                .await
                .map_err(query_error)?;

        rows.into_iter()
            .map(|(state, n)| {
                let state: RunState = state.parse().map_err(RepositoryError::Query)?;
                Ok((state, n.max(0) as u64))
            })
            .collect()
    }
}
