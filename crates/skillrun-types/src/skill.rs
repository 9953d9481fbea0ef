//! Skill domain types.
//!
//! A [`Skill`] is an ownable, versioned unit of logic carrying an access
//! policy (owner, visibility, collaborators). Its logic lives in immutable
//! [`SkillVersion`] snapshots; runs always reference one exact version.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::PrincipalId;

/// Stable skill identifier, shared by every version of the skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(pub Uuid);

impl SkillId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SkillId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SkillId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Who may see and run a skill besides its owner and collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Owner and explicit collaborators only.
    #[default]
    Private,
    /// Any authenticated principal may view and run it by reference.
    Shared,
    /// Any authenticated principal may view and run it; listed for discovery.
    Public,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Shared => write!(f, "shared"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "shared" => Ok(Visibility::Shared),
            "public" => Ok(Visibility::Public),
            other => Err(format!("invalid visibility: '{other}'")),
        }
    }
}

/// Role granted to an explicit collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Editor,
    Viewer,
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorRole::Editor => write!(f, "editor"),
            CollaboratorRole::Viewer => write!(f, "viewer"),
        }
    }
}

impl FromStr for CollaboratorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "editor" => Ok(CollaboratorRole::Editor),
            "viewer" => Ok(CollaboratorRole::Viewer),
            other => Err(format!("invalid collaborator role: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub principal_id: PrincipalId,
    pub role: CollaboratorRole,
    pub added_at: DateTime<Utc>,
}

/// Skill metadata: identity, ownership, and access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub owner: PrincipalId,
    /// Unique per owner.
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    /// Role of `principal` if it is an explicit collaborator.
    pub fn collaborator_role(&self, principal: &PrincipalId) -> Option<CollaboratorRole> {
        self.collaborators
            .iter()
            .find(|c| &c.principal_id == principal)
            .map(|c| c.role)
    }
}

/// The logic definition of a skill version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillContent {
    /// SKILL.md body: instructions and documentation.
    pub skill_md: String,
    /// Manifest describing inputs and runtime hints (YAML text).
    pub manifest: String,
}

/// Immutable snapshot of a skill's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillVersion {
    pub skill_id: SkillId,
    /// 1-based, strictly increasing per skill.
    pub version: u32,
    pub content: SkillContent,
    /// Lowercase hex SHA-256 of the content.
    pub content_hash: String,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Utc>,
}

/// Which version of a skill a run request targets.
///
/// Serialized as the string `"latest"` or a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawSelector", into = "RawSelector")]
pub enum VersionSelector {
    #[default]
    Latest,
    Exact(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Number(u32),
    Text(String),
}

impl TryFrom<RawSelector> for VersionSelector {
    type Error = String;

    fn try_from(raw: RawSelector) -> Result<Self, Self::Error> {
        match raw {
            RawSelector::Number(0) => Err("version numbers start at 1".to_string()),
            RawSelector::Number(n) => Ok(VersionSelector::Exact(n)),
            RawSelector::Text(s) => s.parse(),
        }
    }
}

impl From<VersionSelector> for RawSelector {
    fn from(selector: VersionSelector) -> Self {
        match selector {
            VersionSelector::Latest => RawSelector::Text("latest".to_string()),
            VersionSelector::Exact(n) => RawSelector::Number(n),
        }
    }
}

impl FromStr for VersionSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionSelector::Latest);
        }
        match s.trim_start_matches('v').parse::<u32>() {
            Ok(0) => Err("version numbers start at 1".to_string()),
            Ok(n) => Ok(VersionSelector::Exact(n)),
            Err(_) => Err(format!("invalid version selector: '{s}'")),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => write!(f, "latest"),
            VersionSelector::Exact(n) => write!(f, "v{n}"),
        }
    }
}

/// Actions a principal may take on a skill, as decided by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_run: bool,
}

impl Permissions {
    pub const NONE: Permissions = Permissions {
        can_view: false,
        can_edit: false,
        can_run: false,
    };

    pub const ALL: Permissions = Permissions {
        can_view: true,
        can_edit: true,
        can_run: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_serde() {
        assert_eq!(serde_json::to_string(&Visibility::Shared).unwrap(), "\"shared\"");
        let v: Visibility = serde_json::from_str("\"public\"").unwrap();
        assert_eq!(v, Visibility::Public);
        assert!("secret".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_version_selector_accepts_latest_and_numbers() {
        let latest: VersionSelector = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(latest, VersionSelector::Latest);
        let exact: VersionSelector = serde_json::from_str("3").unwrap();
        assert_eq!(exact, VersionSelector::Exact(3));
        let text: VersionSelector = serde_json::from_str("\"v2\"").unwrap();
        assert_eq!(text, VersionSelector::Exact(2));
    }

    #[test]
    fn test_version_selector_rejects_zero_and_garbage() {
        assert!(serde_json::from_str::<VersionSelector>("0").is_err());
        assert!(serde_json::from_str::<VersionSelector>("\"newest\"").is_err());
    }

    #[test]
    fn test_version_selector_serializes_back() {
        assert_eq!(serde_json::to_string(&VersionSelector::Latest).unwrap(), "\"latest\"");
        assert_eq!(serde_json::to_string(&VersionSelector::Exact(7)).unwrap(), "7");
    }

    #[test]
    fn test_collaborator_role_lookup() {
        let viewer = PrincipalId::new();
        let skill = Skill {
            id: SkillId::new(),
            owner: PrincipalId::new(),
            name: "summarize".to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            collaborators: vec![Collaborator {
                principal_id: viewer,
                role: CollaboratorRole::Viewer,
                added_at: Utc::now(),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(skill.collaborator_role(&viewer), Some(CollaboratorRole::Viewer));
        assert_eq!(skill.collaborator_role(&PrincipalId::new()), None);
    }
}
