//! Skill registry and skill repository trait definitions.
//!
//! The run subsystem only ever reads skills through [`SkillRegistry`]. The
//! authoring surface writes through [`SkillRepository`], which extends it.

use skillrun_types::error::RepositoryError;
use skillrun_types::principal::PrincipalId;
use skillrun_types::skill::{Collaborator, Skill, SkillId, SkillVersion};

/// Read-only view of skills and their immutable versions.
///
/// Implementations must offer read-your-writes: a version is visible here
/// as soon as the call that created it has returned.
pub trait SkillRegistry: Send + Sync {
    /// Skill metadata including its current collaborator list.
    fn get_skill(
        &self,
        id: &SkillId,
    ) -> impl std::future::Future<Output = Result<Option<Skill>, RepositoryError>> + Send;

    fn get_version(
        &self,
        id: &SkillId,
        version: u32,
    ) -> impl std::future::Future<Output = Result<Option<SkillVersion>, RepositoryError>> + Send;

    /// Highest-numbered version of the skill.
    fn latest_version(
        &self,
        id: &SkillId,
    ) -> impl std::future::Future<Output = Result<Option<SkillVersion>, RepositoryError>> + Send;
}

/// Write side of the skill catalog.
pub trait SkillRepository: SkillRegistry {
    /// Insert a skill with its first version. `Conflict` if the owner already
    /// has a skill with the same name.
    fn create_skill(
        &self,
        skill: &Skill,
        first_version: &SkillVersion,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update description, visibility and `updated_at`.
    fn update_skill(
        &self,
        skill: &Skill,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append a new version. `Conflict` if the number is already taken.
    fn append_version(
        &self,
        version: &SkillVersion,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Add a collaborator or change its role.
    fn upsert_collaborator(
        &self,
        skill_id: &SkillId,
        collaborator: &Collaborator,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Returns `true` if the collaborator existed.
    fn remove_collaborator(
        &self,
        skill_id: &SkillId,
        principal: &PrincipalId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Versions of a skill, newest first.
    fn list_versions(
        &self,
        skill_id: &SkillId,
    ) -> impl std::future::Future<Output = Result<Vec<SkillVersion>, RepositoryError>> + Send;

    /// All skills, most recently updated first.
    fn list_skills(&self) -> impl std::future::Future<Output = Result<Vec<Skill>, RepositoryError>> + Send;
}
