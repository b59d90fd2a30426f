//! crates/branchtale_core/src/views.rs
//!
//! The response shapes the aggregator produces. Field names are camelCase on the wire.
//! Viewer-relative flags are left out entirely when the request has no viewer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ChapterId, KeywordRequest, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterSummary {
    pub story_id: ChapterId,
    pub chapter_id: ChapterId,
    pub story_title: String,
    pub chapter_title: Option<String>,
    pub author_name: String,
    /// `None` when no user record carries the author name.
    pub author_id: Option<UserId>,
    pub previous_chapter_id: Option<ChapterId>,
    pub like_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterInfo {
    #[serde(flatten)]
    pub summary: ChapterSummary,
    pub body_text: String,
    pub keywords: Vec<String>,
    pub create_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by_viewer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked_by_viewer: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterDetail {
    #[serde(flatten)]
    pub info: ChapterInfo,
    /// Direct continuations, oldest first.
    pub continuation_chapters: Vec<ChapterSummary>,
}

/// One row of a search result page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterListItem {
    #[serde(flatten)]
    pub summary: ChapterSummary,
    pub create_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by_viewer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked_by_viewer: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterPage {
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<ChapterListItem>,
}

/// What happened to a keyword change.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordOutcome {
    Applied(ChapterInfo),
    Queued(KeywordRequest),
}
