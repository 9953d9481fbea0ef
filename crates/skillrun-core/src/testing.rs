//! In-memory repositories for unit tests.
//!
//! Each store keeps its state behind a `std::sync::Mutex` that is never held
//! across an await point, so a transition is atomic exactly like the
//! single-statement compare-and-swap of the SQLite adapter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use skillrun_types::error::RepositoryError;
use skillrun_types::principal::{Principal, PrincipalId};
use skillrun_types::run::{Run, RunId, RunState};
use skillrun_types::skill::{
    Collaborator, CollaboratorRole, Skill, SkillContent, SkillId, SkillVersion, Visibility,
};

use crate::repository::principal::PrincipalRepository;
use crate::repository::run::{RunFilter, RunRepository, Transition};
use crate::repository::skill::{SkillRegistry, SkillRepository};
use crate::service::skill::content_hash;

#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<BTreeMap<RunId, Run>>,
}

impl InMemoryRunRepository {
    pub fn snapshot(&self, id: &RunId) -> Option<Run> {
        self.runs.lock().unwrap().get(id).cloned()
    }

    /// Overwrite a stored run, bypassing the lifecycle guard.
    pub fn force(&self, run: Run) {
        self.runs.lock().unwrap().insert(run.id, run);
    }
}

impl RunRepository for InMemoryRunRepository {
    async fn create(&self, run: &Run) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        if runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict(format!("run {} exists", run.id)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get(&self, id: &RunId) -> Result<Option<Run>, RepositoryError> {
        Ok(self.runs.lock().unwrap().get(id).cloned())
    }

    async fn transition(&self, id: &RunId, t: &Transition) -> Result<Run, RepositoryError> {
        t.validate()?;
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if run.state != t.from || t.attempt.is_some_and(|a| a != run.attempt) {
            return Err(RepositoryError::Stale {
                expected: t.from.to_string(),
                actual: run.state.to_string(),
            });
        }

        let now = Utc::now();
        run.state = t.to;
        run.updated_at = now;
        if t.to == RunState::Running {
            run.attempt += 1;
            run.started_at = Some(now);
        }
        if t.to.is_terminal() {
            run.finished_at = Some(now);
            run.output = t.output.clone();
            run.error = t.error.clone();
        }
        Ok(run.clone())
    }

    async fn requeue(&self, id: &RunId, attempt: u32) -> Result<Run, RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if run.state != RunState::Running || run.attempt != attempt {
            return Err(RepositoryError::Stale {
                expected: RunState::Running.to_string(),
                actual: run.state.to_string(),
            });
        }
        run.state = RunState::Queued;
        run.started_at = None;
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, RepositoryError> {
        let runs = self.runs.lock().unwrap();
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(runs
            .values()
            .rev()
            .filter(|r| filter.before.is_none_or(|b| r.id < b))
            .filter(|r| filter.skill_id.is_none_or(|s| r.skill_id == s))
            .filter(|r| filter.state.is_none_or(|s| r.state == s))
            .filter(|r| filter.requested_by.is_none_or(|p| r.requested_by == p))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_stale(
        &self,
        state: RunState,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Run>, RepositoryError> {
        let runs = self.runs.lock().unwrap();
        let mut stale: Vec<Run> = runs
            .values()
            .filter(|r| r.state == state && r.updated_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn count_by_state(&self) -> Result<Vec<(RunState, u64)>, RepositoryError> {
        let runs = self.runs.lock().unwrap();
        Ok(RunState::ALL
            .into_iter()
            .map(|s| (s, runs.values().filter(|r| r.state == s).count() as u64))
            .filter(|(_, n)| *n > 0)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySkillRepository {
    skills: Mutex<HashMap<SkillId, Skill>>,
    versions: Mutex<BTreeMap<(SkillId, u32), SkillVersion>>,
}

impl InMemorySkillRepository {
    /// Insert a skill and its first version directly.
    pub fn seed(&self, skill: Skill, content: SkillContent) -> SkillVersion {
        let version = version_of(&skill, 1, content);
        self.versions
            .lock()
            .unwrap()
            .insert((skill.id, 1), version.clone());
        self.skills.lock().unwrap().insert(skill.id, skill);
        version
    }

    pub fn set_visibility(&self, id: &SkillId, visibility: Visibility) {
        if let Some(skill) = self.skills.lock().unwrap().get_mut(id) {
            skill.visibility = visibility;
        }
    }

    pub fn add_collaborator(&self, id: &SkillId, who: PrincipalId, role: CollaboratorRole) {
        if let Some(skill) = self.skills.lock().unwrap().get_mut(id) {
            skill.collaborators.retain(|c| c.principal_id != who);
            skill.collaborators.push(Collaborator {
                principal_id: who,
                role,
                added_at: Utc::now(),
            });
        }
    }
}

impl SkillRegistry for InMemorySkillRepository {
    async fn get_skill(&self, id: &SkillId) -> Result<Option<Skill>, RepositoryError> {
        Ok(self.skills.lock().unwrap().get(id).cloned())
    }

    async fn get_version(
        &self,
        id: &SkillId,
        version: u32,
    ) -> Result<Option<SkillVersion>, RepositoryError> {
        Ok(self.versions.lock().unwrap().get(&(*id, version)).cloned())
    }

    async fn latest_version(&self, id: &SkillId) -> Result<Option<SkillVersion>, RepositoryError> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .range((*id, 0)..=(*id, u32::MAX))
            .next_back()
            .map(|(_, v)| v.clone()))
    }
}

impl SkillRepository for InMemorySkillRepository {
    async fn create_skill(
        &self,
        skill: &Skill,
        first_version: &SkillVersion,
    ) -> Result<(), RepositoryError> {
        let mut skills = self.skills.lock().unwrap();
        if skills
            .values()
            .any(|s| s.owner == skill.owner && s.name == skill.name)
        {
            return Err(RepositoryError::Conflict(skill.name.clone()));
        }
        skills.insert(skill.id, skill.clone());
        self.versions
            .lock()
            .unwrap()
            .insert((skill.id, first_version.version), first_version.clone());
        Ok(())
    }

    async fn update_skill(&self, skill: &Skill) -> Result<(), RepositoryError> {
        let mut skills = self.skills.lock().unwrap();
        let stored = skills.get_mut(&skill.id).ok_or(RepositoryError::NotFound)?;
        stored.description = skill.description.clone();
        stored.visibility = skill.visibility;
        stored.updated_at = skill.updated_at;
        Ok(())
    }

    async fn append_version(&self, version: &SkillVersion) -> Result<(), RepositoryError> {
        let mut versions = self.versions.lock().unwrap();
        let key = (version.skill_id, version.version);
        if versions.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!("v{}", version.version)));
        }
        versions.insert(key, version.clone());
        Ok(())
    }

    async fn upsert_collaborator(
        &self,
        skill_id: &SkillId,
        collaborator: &Collaborator,
    ) -> Result<(), RepositoryError> {
        self.add_collaborator(skill_id, collaborator.principal_id, collaborator.role);
        Ok(())
    }

    async fn remove_collaborator(
        &self,
        skill_id: &SkillId,
        principal: &PrincipalId,
    ) -> Result<bool, RepositoryError> {
        let mut skills = self.skills.lock().unwrap();
        let skill = skills.get_mut(skill_id).ok_or(RepositoryError::NotFound)?;
        let before = skill.collaborators.len();
        skill.collaborators.retain(|c| &c.principal_id != principal);
        Ok(skill.collaborators.len() != before)
    }

    async fn list_versions(&self, skill_id: &SkillId) -> Result<Vec<SkillVersion>, RepositoryError> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .range((*skill_id, 0)..=(*skill_id, u32::MAX))
            .rev()
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn list_skills(&self) -> Result<Vec<Skill>, RepositoryError> {
        let mut skills: Vec<Skill> = self.skills.lock().unwrap().values().cloned().collect();
        skills.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(skills)
    }
}

#[derive(Default)]
pub struct InMemoryPrincipalRepository {
    principals: Mutex<Vec<(Principal, String)>>,
}

impl InMemoryPrincipalRepository {
    pub fn add(&self, name: &str) -> Principal {
        let principal = Principal::new(name);
        self.principals
            .lock()
            .unwrap()
            .push((principal.clone(), format!("hash-{name}")));
        principal
    }
}

impl PrincipalRepository for InMemoryPrincipalRepository {
    async fn create(&self, principal: &Principal, key_hash: &str) -> Result<(), RepositoryError> {
        self.principals
            .lock()
            .unwrap()
            .push((principal.clone(), key_hash.to_string()));
        Ok(())
    }

    async fn get(&self, id: &PrincipalId) -> Result<Option<Principal>, RepositoryError> {
        Ok(self
            .principals
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| &p.id == id)
            .map(|(p, _)| p.clone()))
    }

    async fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<Principal>, RepositoryError> {
        Ok(self
            .principals
            .lock()
            .unwrap()
            .iter()
            .find(|(_, h)| h == key_hash)
            .map(|(p, _)| p.clone()))
    }

    async fn list(&self) -> Result<Vec<Principal>, RepositoryError> {
        let mut all: Vec<Principal> = self
            .principals
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

pub fn sample_content() -> SkillContent {
    SkillContent {
        skill_md: "# Echo\nReturns its input.".to_string(),
        manifest: "name: echo\n".to_string(),
    }
}

pub fn sample_skill(owner: PrincipalId, visibility: Visibility) -> Skill {
    let now = Utc::now();
    Skill {
        id: SkillId::new(),
        owner,
        name: format!("skill-{}", SkillId::new()),
        description: String::new(),
        visibility,
        collaborators: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn version_of(skill: &Skill, version: u32, content: SkillContent) -> SkillVersion {
    SkillVersion {
        skill_id: skill.id,
        version,
        content_hash: content_hash(&content),
        content,
        created_by: skill.owner,
        created_at: Utc::now(),
    }
}
