//! SQLite skill repository implementation.
//!
//! Skills and their collaborator lists live in `skills` and
//! `skill_collaborators`; versions are append-only rows in `skill_versions`
//! keyed by `(skill_id, version)`.

use std::collections::HashMap;

use skillrun_core::repository::skill::{SkillRegistry, SkillRepository};
use skillrun_types::error::RepositoryError;
use skillrun_types::principal::PrincipalId;
use skillrun_types::skill::{
    Collaborator, CollaboratorRole, Skill, SkillContent, SkillId, SkillVersion, Visibility,
};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error, write_error};

/// SQLite-backed implementation of `SkillRegistry` and `SkillRepository`.
pub struct SqliteSkillRepository {
    pool: DatabasePool,
}

impl SqliteSkillRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn collaborators(&self, id: &SkillId) -> Result<Vec<Collaborator>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT skill_id, principal_id, role, added_at FROM skill_collaborators WHERE skill_id = ? ORDER BY added_at",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                CollaboratorRow::from_row(row)
                    .map_err(query_error)?
                    .into_collaborator()
                    .map(|(_, c)| c)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct SkillRow {
    id: String,
    owner_id: String,
    name: String,
    description: String,
    visibility: String,
    created_at: String,
    updated_at: String,
}

impl SkillRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            visibility: row.try_get("visibility")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_skill(self, collaborators: Vec<Collaborator>) -> Result<Skill, RepositoryError> {
        let visibility: Visibility = self
            .visibility
            .parse()
            .map_err(RepositoryError::Query)?;
        Ok(Skill {
            id: SkillId(parse_uuid(&self.id)?),
            owner: PrincipalId(parse_uuid(&self.owner_id)?),
            name: self.name,
            description: self.description,
            visibility,
            collaborators,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct CollaboratorRow {
    skill_id: String,
    principal_id: String,
    role: String,
    added_at: String,
}

impl CollaboratorRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            skill_id: row.try_get("skill_id")?,
            principal_id: row.try_get("principal_id")?,
            role: row.try_get("role")?,
            added_at: row.try_get("added_at")?,
        })
    }

    fn into_collaborator(self) -> Result<(SkillId, Collaborator), RepositoryError> {
        let role: CollaboratorRole = self.role.parse().map_err(RepositoryError::Query)?;
        Ok((
            SkillId(parse_uuid(&self.skill_id)?),
            Collaborator {
                principal_id: PrincipalId(parse_uuid(&self.principal_id)?),
                role,
                added_at: parse_datetime(&self.added_at)?,
            },
        ))
    }
}

struct VersionRow {
    skill_id: String,
    version: i64,
    skill_md: String,
    manifest: String,
    content_hash: String,
    created_by: String,
    created_at: String,
}

impl VersionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            skill_id: row.try_get("skill_id")?,
            version: row.try_get("version")?,
            skill_md: row.try_get("skill_md")?,
            manifest: row.try_get("manifest")?,
            content_hash: row.try_get("content_hash")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_version(self) -> Result<SkillVersion, RepositoryError> {
        Ok(SkillVersion {
            skill_id: SkillId(parse_uuid(&self.skill_id)?),
            version: u32::try_from(self.version)
                .map_err(|_| RepositoryError::Query(format!("invalid version: {}", self.version)))?,
            content: SkillContent {
                skill_md: self.skill_md,
                manifest: self.manifest,
            },
            content_hash: self.content_hash,
            created_by: PrincipalId(parse_uuid(&self.created_by)?),
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn decode_version(row: &sqlx::sqlite::SqliteRow) -> Result<SkillVersion, RepositoryError> {
    VersionRow::from_row(row).map_err(query_error)?.into_version()
}

const VERSION_COLUMNS: &str =
    "skill_id, version, skill_md, manifest, content_hash, created_by, created_at";

async fn insert_version<'e, E>(executor: E, version: &SkillVersion) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO skill_versions (skill_id, version, skill_md, manifest, content_hash, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(version.skill_id.to_string())
    .bind(i64::from(version.version))
    .bind(&version.content.skill_md)
    .bind(&version.content.manifest)
    .bind(&version.content_hash)
    .bind(version.created_by.to_string())
    .bind(format_datetime(&version.created_at))
    .execute(executor)
    .await
    .map_err(write_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl SkillRegistry for SqliteSkillRepository {
    async fn get_skill(&self, id: &SkillId) -> Result<Option<Skill>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM skills WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let skill_row = SkillRow::from_row(&row).map_err(query_error)?;
                let collaborators = self.collaborators(id).await?;
                Ok(Some(skill_row.into_skill(collaborators)?))
            }
            None => Ok(None),
        }
    }

    async fn get_version(
        &self,
        id: &SkillId,
        version: u32,
    ) -> Result<Option<SkillVersion>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM skill_versions WHERE skill_id = ? AND version = ?"
        ))
        .bind(id.to_string())
        .bind(i64::from(version))
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;
        row.as_ref().map(decode_version).transpose()
    }

    async fn latest_version(&self, id: &SkillId) -> Result<Option<SkillVersion>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM skill_versions WHERE skill_id = ? ORDER BY version DESC LIMIT 1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;
        row.as_ref().map(decode_version).transpose()
    }
}

impl SkillRepository for SqliteSkillRepository {
    async fn create_skill(
        &self,
        skill: &Skill,
        first_version: &SkillVersion,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            "INSERT INTO skills (id, owner_id, name, description, visibility, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(skill.id.to_string())
        .bind(skill.owner.to_string())
        .bind(&skill.name)
        .bind(&skill.description)
        .bind(skill.visibility.to_string())
        .bind(format_datetime(&skill.created_at))
        .bind(format_datetime(&skill.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        insert_version(&mut *tx, first_version).await?;

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn update_skill(&self, skill: &Skill) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE skills SET description = ?, visibility = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&skill.description)
        .bind(skill.visibility.to_string())
        .bind(format_datetime(&skill.updated_at))
        .bind(skill.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn append_version(&self, version: &SkillVersion) -> Result<(), RepositoryError> {
        insert_version(&self.pool.writer, version).await
    }

    async fn upsert_collaborator(
        &self,
        skill_id: &SkillId,
        collaborator: &Collaborator,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO skill_collaborators (skill_id, principal_id, role, added_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(skill_id, principal_id) DO UPDATE SET role = excluded.role",
        )
        .bind(skill_id.to_string())
        .bind(collaborator.principal_id.to_string())
        .bind(collaborator.role.to_string())
        .bind(format_datetime(&collaborator.added_at))
        .execute(&self.pool.writer)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn remove_collaborator(
        &self,
        skill_id: &SkillId,
        principal: &PrincipalId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM skill_collaborators WHERE skill_id = ? AND principal_id = ?")
                .bind(skill_id.to_string())
                .bind(principal.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_versions(&self, skill_id: &SkillId) -> Result<Vec<SkillVersion>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM skill_versions WHERE skill_id = ? ORDER BY version DESC"
        ))
        .bind(skill_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;
        rows.iter().map(decode_version).collect()
    }

    async fn list_skills(&self) -> Result<Vec<Skill>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM skills ORDER BY updated_at DESC, id DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let collaborator_rows = sqlx::query(
            "SELECT skill_id, principal_id, role, added_at FROM skill_collaborators ORDER BY added_at",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut by_skill: HashMap<SkillId, Vec<Collaborator>> = HashMap::new();
        for row in &collaborator_rows {
            let (skill_id, collaborator) = CollaboratorRow::from_row(row)
                .map_err(query_error)?
                .into_collaborator()?;
            by_skill.entry(skill_id).or_default().push(collaborator);
        }

        let mut skills = Vec::with_capacity(rows.len());
        for row in &rows {
            let skill_row = SkillRow::from_row(row).map_err(query_error)?;
            let id = SkillId(parse_uuid(&skill_row.id)?);
            skills.push(skill_row.into_skill(by_skill.remove(&id).unwrap_or_default())?);
        }
        Ok(skills)
    }
}
