//! crates/branchtale_core/src/domain.rs
//!
//! Defines the pure, core data structures for the chapter tree.
//! These structs are independent of any database; serialization is limited to the
//! identifiers, which travel through paths and JSON bodies as plain strings.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keywords::{validate_keywords, KeywordSet};
use crate::ports::{PortError, PortResult};

//=========================================================================================
// Identifiers
//=========================================================================================

static RECORD_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{24}$").expect("record id pattern is valid"));

static ID_COUNTER: LazyLock<AtomicU32> = LazyLock::new(|| {
    let seed = Uuid::new_v4();
    let seed = seed.as_bytes();
    AtomicU32::new(u32::from_be_bytes([0, seed[0], seed[1], seed[2]]))
});

// Fixed for the life of the process so ids from one process sort by creation.
static PROCESS_BYTES: LazyLock<[u8; 5]> = LazyLock::new(|| {
    let random = Uuid::new_v4();
    let mut bytes = [0u8; 5];
    bytes.copy_from_slice(&random.as_bytes()[..5]);
    bytes
});

/// Returns true if `raw` is a 24-character lowercase hex record id.
pub fn is_valid_record_id(raw: &str) -> bool {
    RECORD_ID_PATTERN.is_match(raw)
}

/// Builds a 12-byte id: 4 bytes of unix seconds, 5 per-process random bytes, 3 bytes
/// of a process-wide counter. Later ids compare greater within one process.
fn generate_record_id() -> String {
    let seconds = Utc::now().timestamp().max(0) as u32;
    let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    bytes[4..9].copy_from_slice(&*PROCESS_BYTES);
    bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        pub struct $name(String);

        impl $name {
            pub fn generate() -> Self {
                Self(generate_record_id())
            }

            /// Validates the 24-hex format before anything touches a store.
            pub fn parse(raw: &str) -> PortResult<Self> {
                if is_valid_record_id(raw) {
                    Ok(Self(raw.to_string()))
                } else {
                    Err(PortError::Validation(format!(
                        "Invalid {} id '{}'.",
                        $label, raw
                    )))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = PortError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Self::parse(raw)
            }
        }

        impl TryFrom<String> for $name {
            type Error = PortError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(
    /// Identifies a chapter. Root chapters double as story ids.
    ChapterId,
    "chapter"
);
record_id!(UserId, "user");
record_id!(FlagId, "flag");

//=========================================================================================
// Chapters
//=========================================================================================

/// A node of narrative text in a story tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: ChapterId,
    /// The id of the tree's root chapter; equal to `id` for roots.
    pub story_id: ChapterId,
    pub previous_chapter_id: Option<ChapterId>,
    pub author_name: String,
    pub story_title: String,
    /// `None` exactly when the chapter is a root.
    pub chapter_title: Option<String>,
    pub body_text: String,
    pub keywords: KeywordSet,
    pub create_date: DateTime<Utc>,
}

impl Chapter {
    pub fn is_root(&self) -> bool {
        self.previous_chapter_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ParentLink {
    id: ChapterId,
    story_id: ChapterId,
}

/// A chapter that has passed validation but has not been stored yet.
///
/// The only ways to build one are [`ChapterDraft::story`] and
/// [`ChapterDraft::continuation`], so a store never sees an invalid chapter and a
/// continuation can only point at a parent that already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDraft {
    parent: Option<ParentLink>,
    author_name: String,
    story_title: String,
    chapter_title: Option<String>,
    body_text: String,
    keywords: KeywordSet,
}

impl ChapterDraft {
    /// A new root chapter.
    pub fn story(
        author_name: &str,
        story_title: &str,
        body_text: &str,
        keywords: &[String],
    ) -> PortResult<Self> {
        require_text(body_text, "Body text is required.")?;
        require_text(story_title, "Story title is required.")?;
        validate_keywords(keywords)?;

        Ok(Self {
            parent: None,
            author_name: author_name.to_string(),
            story_title: story_title.to_string(),
            chapter_title: None,
            body_text: body_text.to_string(),
            keywords: KeywordSet::from_valid(keywords.iter().cloned()),
        })
    }

    /// A continuation of `parent`. Story id and story title are copied forward.
    pub fn continuation(
        parent: &Chapter,
        author_name: &str,
        chapter_title: Option<&str>,
        body_text: &str,
        keywords: &[String],
    ) -> PortResult<Self> {
        require_text(body_text, "Body text is required.")?;
        require_text(&parent.story_title, "Story title is required.")?;
        let chapter_title = chapter_title.unwrap_or_default();
        require_text(chapter_title, "Chapter title is required for a continuation.")?;
        validate_keywords(keywords)?;

        Ok(Self {
            parent: Some(ParentLink {
                id: parent.id.clone(),
                story_id: parent.story_id.clone(),
            }),
            author_name: author_name.to_string(),
            story_title: parent.story_title.clone(),
            chapter_title: Some(chapter_title.to_string()),
            body_text: body_text.to_string(),
            keywords: KeywordSet::from_valid(keywords.iter().cloned()),
        })
    }

    pub fn previous_chapter_id(&self) -> Option<&ChapterId> {
        self.parent.as_ref().map(|p| &p.id)
    }

    /// Turns the draft into a stored chapter once the store has picked an id.
    pub fn into_chapter(self, id: ChapterId, create_date: DateTime<Utc>) -> Chapter {
        let (story_id, previous_chapter_id) = match self.parent {
            Some(parent) => (parent.story_id, Some(parent.id)),
            None => (id.clone(), None),
        };
        Chapter {
            id,
            story_id,
            previous_chapter_id,
            author_name: self.author_name,
            story_title: self.story_title,
            chapter_title: self.chapter_title,
            body_text: self.body_text,
            keywords: self.keywords,
            create_date,
        }
    }
}

fn require_text(value: &str, message: &str) -> PortResult<()> {
    if value.trim().is_empty() {
        Err(PortError::Validation(message.to_string()))
    } else {
        Ok(())
    }
}

//=========================================================================================
// Relations, flags and moderation requests
//=========================================================================================

/// The two (user, chapter) relations that are unique per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Like,
    Bookmark,
}

impl RelationKind {
    pub fn noun(self) -> &'static str {
        match self {
            RelationKind::Like => "like",
            RelationKind::Bookmark => "bookmark",
        }
    }
}

/// A report against a chapter. Anonymous viewers may flag too.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Flag {
    pub id: FlagId,
    pub user_id: Option<UserId>,
    pub chapter_id: ChapterId,
    pub reason: String,
    pub create_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum KeywordAction {
    Add,
    Delete,
}

impl KeywordAction {
    pub fn as_str(self) -> &'static str {
        match self {
            KeywordAction::Add => "add",
            KeywordAction::Delete => "delete",
        }
    }
}

/// A keyword change held back for review because the actor may not apply it directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KeywordRequest {
    pub chapter_id: ChapterId,
    pub requested_by: UserId,
    pub action: KeywordAction,
    pub keywords: Vec<String>,
    pub create_date: DateTime<Utc>,
}

//=========================================================================================
// Viewers
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    /// Unknown role names fall back to a plain user.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "moderator" => Role::Moderator,
            _ => Role::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

/// The identity behind a request, as handed over by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}
