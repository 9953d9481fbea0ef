//! Skill authoring service.
//!
//! Creates skills, appends immutable versions and manages collaborators.
//! Every operation is gated by the same evaluator the run path uses. A skill
//! the caller cannot view is reported as `NotFound`.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skillrun_types::error::{RepositoryError, SkillError};
use skillrun_types::principal::PrincipalId;
use skillrun_types::skill::{
    Collaborator, CollaboratorRole, Permissions, Skill, SkillContent, SkillId, SkillVersion,
    Visibility,
};

use crate::access;
use crate::repository::principal::PrincipalRepository;
use crate::repository::skill::SkillRepository;

const MAX_NAME_LEN: usize = 120;
const VERSION_RETRIES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSkill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub content: SkillContent,
}

/// Partial update. New `content` appends a version; metadata edits do not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSkill {
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub content: Option<SkillContent>,
}

/// A skill as seen by one principal.
#[derive(Debug, Clone, Serialize)]
pub struct SkillDetail {
    pub skill: Skill,
    pub latest_version: Option<SkillVersion>,
    pub permissions: Permissions,
}

/// Lowercase hex SHA-256 of a skill version's content.
pub fn content_hash(content: &SkillContent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.skill_md.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.manifest.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SkillService<S: SkillRepository, P: PrincipalRepository> {
    skills: Arc<S>,
    principals: Arc<P>,
}

impl<S: SkillRepository, P: PrincipalRepository> SkillService<S, P> {
    pub fn new(skills: Arc<S>, principals: Arc<P>) -> Self {
        Self { skills, principals }
    }

    /// Create a skill owned by `principal`, with version 1.
    pub async fn create_skill(
        &self,
        principal: &PrincipalId,
        request: CreateSkill,
    ) -> Result<SkillDetail, SkillError> {
        let name = request.name.trim().to_string();
        validate_name(&name)?;
        validate_content(&request.content)?;

        let now = Utc::now();
        let skill = Skill {
            id: SkillId::new(),
            owner: *principal,
            name: name.clone(),
            description: request.description,
            visibility: request.visibility,
            collaborators: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let version = SkillVersion {
            skill_id: skill.id,
            version: 1,
            content_hash: content_hash(&request.content),
            content: request.content,
            created_by: *principal,
            created_at: now,
        };

        self.skills
            .create_skill(&skill, &version)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => SkillError::NameConflict(name),
                other => storage(other),
            })?;

        tracing::info!(skill_id = %skill.id, name = %skill.name, "skill created");
        Ok(SkillDetail {
            skill,
            latest_version: Some(version),
            permissions: Permissions::ALL,
        })
    }

    pub async fn get_skill(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
    ) -> Result<SkillDetail, SkillError> {
        let (skill, permissions) = self.visible(principal, id).await?;
        let latest_version = self.skills.latest_version(id).await.map_err(storage)?;
        Ok(SkillDetail {
            skill,
            latest_version,
            permissions,
        })
    }

    /// Update metadata and/or append a new version. Requires edit rights.
    ///
    /// Content identical to the latest version does not create a version.
    pub async fn update_skill(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
        request: UpdateSkill,
    ) -> Result<SkillDetail, SkillError> {
        let (mut skill, permissions) = self.visible(principal, id).await?;
        if !permissions.can_edit {
            return Err(SkillError::Unauthorized { action: "edit" });
        }
        if let Some(content) = &request.content {
            validate_content(content)?;
        }

        let mut latest = self.skills.latest_version(id).await.map_err(storage)?;
        if let Some(content) = request.content {
            let hash = content_hash(&content);
            if latest.as_ref().is_none_or(|v| v.content_hash != hash) {
                latest = Some(self.append_version(principal, id, content, hash).await?);
            }
        }

        let metadata_changed = request.description.is_some() || request.visibility.is_some();
        if let Some(description) = request.description {
            skill.description = description;
        }
        if let Some(visibility) = request.visibility {
            skill.visibility = visibility;
        }
        skill.updated_at = Utc::now();
        self.skills.update_skill(&skill).await.map_err(storage)?;

        tracing::info!(
            skill_id = %id,
            version = latest.as_ref().map(|v| v.version),
            metadata_changed,
            "skill updated"
        );
        Ok(SkillDetail {
            skill,
            latest_version: latest,
            permissions,
        })
    }

    /// Append `max + 1`, retrying if a concurrent edit took the number.
    async fn append_version(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
        content: SkillContent,
        content_hash: String,
    ) -> Result<SkillVersion, SkillError> {
        for _ in 0..VERSION_RETRIES {
            let next = self
                .skills
                .latest_version(id)
                .await
                .map_err(storage)?
                .map_or(1, |v| v.version + 1);
            let version = SkillVersion {
                skill_id: *id,
                version: next,
                content: content.clone(),
                content_hash: content_hash.clone(),
                created_by: *principal,
                created_at: Utc::now(),
            };
            match self.skills.append_version(&version).await {
                Ok(()) => return Ok(version),
                Err(RepositoryError::Conflict(_)) => continue,
                Err(e) => return Err(storage(e)),
            }
        }
        Err(SkillError::Storage(format!(
            "could not allocate a version number for skill {id}"
        )))
    }

    /// Add a collaborator or change its role. Owner only.
    pub async fn set_collaborator(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
        collaborator: &PrincipalId,
        role: CollaboratorRole,
    ) -> Result<Skill, SkillError> {
        let skill = self.managed(principal, id).await?;
        if collaborator == &skill.owner {
            return Err(SkillError::Validation(
                "the owner cannot be a collaborator".to_string(),
            ));
        }
        if self
            .principals
            .get(collaborator)
            .await
            .map_err(storage)?
            .is_none()
        {
            return Err(SkillError::Validation(format!(
                "principal {collaborator} does not exist"
            )));
        }

        self.skills
            .upsert_collaborator(
                id,
                &Collaborator {
                    principal_id: *collaborator,
                    role,
                    added_at: Utc::now(),
                },
            )
            .await
            .map_err(storage)?;
        tracing::info!(skill_id = %id, collaborator = %collaborator, %role, "collaborator set");
        self.reload(id).await
    }

    /// Remove a collaborator. Removing someone who is not one is a no-op.
    pub async fn remove_collaborator(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
        collaborator: &PrincipalId,
    ) -> Result<Skill, SkillError> {
        self.managed(principal, id).await?;
        let removed = self
            .skills
            .remove_collaborator(id, collaborator)
            .await
            .map_err(storage)?;
        if removed {
            tracing::info!(skill_id = %id, collaborator = %collaborator, "collaborator removed");
        }
        self.reload(id).await
    }

    pub async fn list_versions(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
    ) -> Result<Vec<SkillVersion>, SkillError> {
        self.visible(principal, id).await?;
        self.skills.list_versions(id).await.map_err(storage)
    }

    /// Skills the principal owns or collaborates on, plus public ones when
    /// `include_public` is set. Shared skills are reachable by id only.
    pub async fn list_skills(
        &self,
        principal: &PrincipalId,
        include_public: bool,
    ) -> Result<Vec<Skill>, SkillError> {
        let skills = self.skills.list_skills().await.map_err(storage)?;
        Ok(skills
            .into_iter()
            .filter(|s| {
                &s.owner == principal
                    || s.collaborator_role(principal).is_some()
                    || (include_public && s.visibility == Visibility::Public)
            })
            .collect())
    }

    async fn visible(
        &self,
        principal: &PrincipalId,
        id: &SkillId,
    ) -> Result<(Skill, Permissions), SkillError> {
        let skill = self
            .skills
            .get_skill(id)
            .await
            .map_err(storage)?
            .ok_or(SkillError::NotFound)?;
        let permissions = access::evaluate(principal, &skill);
        if !permissions.can_view {
            return Err(SkillError::NotFound);
        }
        Ok((skill, permissions))
    }

    async fn managed(&self, principal: &PrincipalId, id: &SkillId) -> Result<Skill, SkillError> {
        let (skill, _) = self.visible(principal, id).await?;
        if !access::can_manage_collaborators(principal, &skill) {
            return Err(SkillError::Unauthorized {
                action: "manage collaborators of",
            });
        }
        Ok(skill)
    }

    async fn reload(&self, id: &SkillId) -> Result<Skill, SkillError> {
        self.skills
            .get_skill(id)
            .await
            .map_err(storage)?
            .ok_or(SkillError::NotFound)
    }
}

fn validate_name(name: &str) -> Result<(), SkillError> {
    if name.is_empty() {
        return Err(SkillError::Validation("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(SkillError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_content(content: &SkillContent) -> Result<(), SkillError> {
    if content.skill_md.trim().is_empty() {
        return Err(SkillError::Validation("skill_md cannot be empty".to_string()));
    }
    if content.manifest.trim().is_empty() {
        return Err(SkillError::Validation("manifest cannot be empty".to_string()));
    }
    Ok(())
}

fn storage(e: RepositoryError) -> SkillError {
    SkillError::Storage(e.to_string())
}
