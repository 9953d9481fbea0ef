//! Access control evaluator.
//!
//! One pure function decides what a principal may do with a skill. Every
//! boundary (submit, read, cancel, list, skill edits) consults it, keyed off
//! the skill metadata as it is *now*, so revoking a collaborator or making a
//! skill private immediately hides existing runs without touching them.

use skillrun_types::principal::PrincipalId;
use skillrun_types::skill::{CollaboratorRole, Permissions, Skill, Visibility};

/// Compute the permitted action set of `principal` on `skill`.
///
/// | Relationship          | view | run | edit |
/// |-----------------------|------|-----|------|
/// | owner                 | yes  | yes | yes  |
/// | editor collaborator   | yes  | yes | yes  |
/// | viewer collaborator   | yes  | yes | no   |
/// | anyone, public/shared | yes  | yes | no   |
/// | anyone, private       | no   | no  | no   |
pub fn evaluate(principal: &PrincipalId, skill: &Skill) -> Permissions {
    if &skill.owner == principal {
        return Permissions::ALL;
    }

    match skill.collaborator_role(principal) {
        Some(CollaboratorRole::Editor) => Permissions::ALL,
        Some(CollaboratorRole::Viewer) => read_and_run(),
        None => match skill.visibility {
            Visibility::Public | Visibility::Shared => read_and_run(),
            Visibility::Private => Permissions::NONE,
        },
    }
}

/// Cancelling a run requires either run or edit rights on its skill.
pub fn can_cancel(permissions: &Permissions) -> bool {
    permissions.can_run || permissions.can_edit
}

/// Only the owner manages the collaborator list.
pub fn can_manage_collaborators(principal: &PrincipalId, skill: &Skill) -> bool {
    &skill.owner == principal
}

fn read_and_run() -> Permissions {
    Permissions {
        can_view: true,
        can_edit: false,
        can_run: true,
    }
}
