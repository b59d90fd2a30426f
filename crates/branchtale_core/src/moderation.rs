//! crates/branchtale_core/src/moderation.rs
//!
//! Role checks and the keyword moderation gate.
//!
//! [`resolve_capabilities`] is the one place a viewer's role is interpreted; every
//! gated mutation asks it instead of matching on roles itself.

use serde_json::Value;

use crate::domain::{Chapter, Role, Viewer};
use crate::keywords::{keywords_from_json, validate_keyword, KeywordSet};
use crate::ports::{PortError, PortResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub is_admin: bool,
    pub is_moderator: bool,
    pub is_owner: bool,
}

impl Capabilities {
    /// Admins and moderators.
    pub fn is_privileged(&self) -> bool {
        self.is_admin || self.is_moderator
    }
}

/// What `viewer` may do to content written by `owner_name`. Anonymous viewers get
/// nothing.
pub fn resolve_capabilities(viewer: Option<&Viewer>, owner_name: &str) -> Capabilities {
    match viewer {
        None => Capabilities::default(),
        Some(viewer) => Capabilities {
            is_admin: viewer.role == Role::Admin,
            is_moderator: viewer.role == Role::Moderator,
            is_owner: viewer.name == owner_name,
        },
    }
}

/// Whether a keyword change from `actor_name` lands at once or waits for review.
pub fn can_apply_immediately(
    capabilities: &Capabilities,
    chapter_owner_name: &str,
    actor_name: &str,
) -> bool {
    capabilities.is_privileged() || actor_name == chapter_owner_name
}

/// A keyword change that passed validation, ready to apply or to queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPlan {
    /// The keywords named by the request.
    pub requested: Vec<String>,
    /// The chapter's keyword set after the change.
    pub result: KeywordSet,
}

/// Validates a raw addition body and merges it into the chapter's keywords.
/// Keywords already present are dropped without complaint.
pub fn plan_addition(chapter: &Chapter, body: &Value) -> PortResult<KeywordPlan> {
    let requested = keywords_from_json(body)?;
    let mut result = chapter.keywords.clone();
    result.extend(requested.iter().cloned());
    Ok(KeywordPlan { requested, result })
}

/// Removes one keyword. Fails with `NotFound` before any permission is consulted
/// if the chapter does not carry it.
pub fn plan_deletion(chapter: &Chapter, keyword: &str) -> PortResult<KeywordPlan> {
    validate_keyword(keyword)?;
    let mut result = chapter.keywords.clone();
    if !result.remove(keyword) {
        return Err(PortError::NotFound(format!(
            "Keyword '{}' not found in chapter {}.",
            keyword, chapter.id
        )));
    }
    Ok(KeywordPlan {
        requested: vec![keyword.to_string()],
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChapterDraft, ChapterId, UserId};
    use chrono::Utc;
    use serde_json::json;

    fn viewer(name: &str, role: Role) -> Viewer {
        Viewer {
            id: UserId::generate(),
            name: name.to_string(),
            role,
        }
    }

    fn chapter(keywords: &[&str]) -> Chapter {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        ChapterDraft::story("alice", "Tale", "Body.", &keywords)
            .unwrap()
            .into_chapter(ChapterId::generate(), Utc::now())
    }

    #[test]
    fn capabilities_follow_role_and_name() {
        let admin = viewer("root", Role::Admin);
        let caps = resolve_capabilities(Some(&admin), "alice");
        assert!(caps.is_admin && !caps.is_owner);

        let owner = viewer("alice", Role::User);
        let caps = resolve_capabilities(Some(&owner), "alice");
        assert!(caps.is_owner && !caps.is_privileged());

        assert_eq!(resolve_capabilities(None, "alice"), Capabilities::default());
    }

    #[test]
    fn gate_admits_privileged_and_owner_only() {
        for (name, role, expected) in [
            ("root", Role::Admin, true),
            ("mod", Role::Moderator, true),
            ("alice", Role::User, true),
            ("mallory", Role::User, false),
        ] {
            let actor = viewer(name, role);
            let caps = resolve_capabilities(Some(&actor), "alice");
            assert_eq!(can_apply_immediately(&caps, "alice", name), expected, "{name}");
        }
    }

    #[test]
    fn addition_is_a_set_union() {
        let plan = plan_addition(&chapter(&["b"]), &json!(["a", "a", "b"])).unwrap();
        let mut result: Vec<_> = plan.result.iter().collect();
        result.sort();
        assert_eq!(result, vec!["a", "b"]);
    }

    #[test]
    fn addition_rejects_bad_shapes() {
        let target = chapter(&[]);
        for body in [json!({"k": "a"}), json!(["ok", "not ok"]), json!([null])] {
            assert!(matches!(
                plan_addition(&target, &body),
                Err(PortError::Validation(_))
            ));
        }
    }

    #[test]
    fn deletion_of_absent_keyword_is_not_found() {
        let target = chapter(&["kept"]);
        let err = plan_deletion(&target, "missing").unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert!(target.keywords.contains("kept"));

        let plan = plan_deletion(&target, "kept").unwrap();
        assert!(plan.result.is_empty());
    }
}
