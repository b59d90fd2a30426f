//! crates/branchtale_core/src/ports.rs
//!
//! Defines the storage contracts (traits) for the chapter engine.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database that actually holds chapters and relations.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::domain::{
    Chapter, ChapterDraft, ChapterId, Flag, FlagId, KeywordRequest, RelationKind, UserId, Viewer,
};
use crate::keywords::KeywordSet;
use crate::query::{ChapterFilter, SortKey};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error type shared by every port and every engine operation.
///
/// Adapters collapse driver-specific failures into `Storage`; everything else is a
/// client error with a single-sentence reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Malformed search query: {0}")]
    MalformedQuery(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Storage failure: {0}")]
    Storage(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Persists a validated draft, assigning its id and creation date.
    async fn create(&self, draft: ChapterDraft) -> PortResult<Chapter>;

    async fn find_by_id(&self, id: &ChapterId) -> PortResult<Option<Chapter>>;

    /// Returns one page of chapters matching `filter`, ordered by `sort` in key order.
    async fn find_filtered(
        &self,
        filter: &ChapterFilter,
        sort: &[SortKey],
        offset: u64,
        limit: u64,
    ) -> PortResult<Vec<Chapter>>;

    /// Direct continuations of `parent_id`, oldest first.
    async fn find_children(&self, parent_id: &ChapterId) -> PortResult<Vec<Chapter>>;

    /// Replaces the keyword set; returns the updated chapter, or `None` if it is gone.
    async fn update_keywords(
        &self,
        id: &ChapterId,
        keywords: &KeywordSet,
    ) -> PortResult<Option<Chapter>>;

    /// Physically removes one chapter. Returns whether a row existed. Never cascades.
    async fn delete_by_id(&self, id: &ChapterId) -> PortResult<bool>;
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    // --- Likes and bookmarks ---
    /// Fails with `Conflict` if the (user, chapter) pair already exists.
    async fn add_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<()>;

    /// Fails with `NotFound` if the pair does not exist.
    async fn remove_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<()>;

    async fn has_relation(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_id: &ChapterId,
    ) -> PortResult<bool>;

    /// The subset of `chapter_ids` the user holds a relation of `kind` with.
    async fn relations_among(
        &self,
        kind: RelationKind,
        user_id: &UserId,
        chapter_ids: &[ChapterId],
    ) -> PortResult<HashSet<ChapterId>>;

    /// Like counts for every id in one round trip. Ids without likes may be absent.
    async fn count_likes(&self, chapter_ids: &[ChapterId]) -> PortResult<HashMap<ChapterId, u64>>;

    async fn delete_relations_for(
        &self,
        kind: RelationKind,
        chapter_id: &ChapterId,
    ) -> PortResult<u64>;

    // --- Flags ---
    async fn add_flag(
        &self,
        user_id: Option<&UserId>,
        chapter_id: &ChapterId,
        reason: &str,
    ) -> PortResult<Flag>;

    /// Newest first.
    async fn list_flags(&self, offset: u64, limit: u64) -> PortResult<Vec<Flag>>;

    async fn delete_flag(&self, id: &FlagId) -> PortResult<bool>;

    async fn delete_flags_for(&self, chapter_id: &ChapterId) -> PortResult<u64>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves author names to user ids in one round trip. Unknown names are absent.
    async fn author_ids(&self, names: &[String]) -> PortResult<HashMap<String, UserId>>;
}

#[async_trait]
pub trait ViewerResolver: Send + Sync {
    /// Resolves an opaque session token to the viewer it belongs to.
    async fn viewer_for_session(&self, token: &str) -> PortResult<Option<Viewer>>;
}

#[async_trait]
pub trait KeywordReviewQueue: Send + Sync {
    /// Hands a gated keyword change to the moderators.
    async fn enqueue(&self, request: KeywordRequest) -> PortResult<()>;
}
