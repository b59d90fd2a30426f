//! services/api/src/web/chapters.rs
//!
//! Handlers for reading, writing and deleting chapters.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use branchtale_core::domain::ChapterId;
use branchtale_core::query::ListParams;
use branchtale_core::views::{ChapterDetail, ChapterInfo, ChapterPage};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::web::state::{AppState, CurrentViewer};

//=========================================================================================
// Request and Response Payloads
//=========================================================================================

/// Query string of the chapter listing. Values are kept raw so that the engine can
/// report bad ones with its own messages.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ListQuery {
    /// 1-based page number.
    pub page: Option<String>,
    /// Only root chapters unless this is `false`.
    pub stories_only: Option<String>,
    /// Search tokens such as `sc:dragon` and one optional `o:` sort token.
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewStoryRequest {
    #[serde(default)]
    pub story_title: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationRequest {
    pub chapter_title: Option<String>,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedResponse {
    /// Number of chapters removed, the target included.
    pub removed: usize,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Search and page through chapters.
#[utoipa::path(
    get,
    path = "/chapters",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of chapters", body = ChapterPage),
        (status = 400, description = "Bad page number or malformed search")
    ),
    tag = "chapters"
)]
pub async fn list_chapters(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ChapterPage>, ApiError> {
    let params = ListParams::from_raw(
        query.page.as_deref(),
        query.stories_only.as_deref(),
        query.search.as_deref(),
    )?;
    let page = state.service.list_chapters(viewer.get(), &params).await?;
    Ok(Json(page))
}

/// One chapter with its direct continuations.
#[utoipa::path(
    get,
    path = "/chapters/{id}",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 200, body = ChapterDetail),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "No such chapter")
    ),
    tag = "chapters"
)]
pub async fn get_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<Json<ChapterDetail>, ApiError> {
    let id = ChapterId::parse(&id)?;
    Ok(Json(state.service.chapter_detail(viewer.get(), &id).await?))
}

/// The path from the story root down to this chapter.
#[utoipa::path(
    get,
    path = "/chapters/{id}/chain",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 200, description = "Root first, requested chapter last", body = Vec<ChapterDetail>),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "No such chapter")
    ),
    tag = "chapters"
)]
pub async fn get_chain(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChapterDetail>>, ApiError> {
    let id = ChapterId::parse(&id)?;
    Ok(Json(state.service.chain(viewer.get(), &id).await?))
}

/// Start a new story.
#[utoipa::path(
    post,
    path = "/stories",
    request_body = NewStoryRequest,
    responses(
        (status = 201, body = ChapterInfo),
        (status = 400, description = "Missing text or invalid keyword"),
        (status = 401, description = "Not signed in")
    ),
    tag = "chapters"
)]
pub async fn create_story(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    payload: Result<Json<NewStoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let info = state
        .service
        .create_story(
            viewer.get(),
            &body.story_title,
            &body.body_text,
            &body.keywords,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// Continue an existing chapter.
#[utoipa::path(
    post,
    path = "/chapters/{id}/continuations",
    params(("id" = String, Path, description = "Parent chapter id")),
    request_body = ContinuationRequest,
    responses(
        (status = 201, body = ChapterInfo),
        (status = 400, description = "Missing text or invalid keyword"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No such parent")
    ),
    tag = "chapters"
)]
pub async fn create_continuation(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
    payload: Result<Json<ContinuationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let parent_id = ChapterId::parse(&id)?;
    let Json(body) = payload?;
    let info = state
        .service
        .continue_chapter(
            viewer.get(),
            &parent_id,
            body.chapter_title.as_deref(),
            &body.body_text,
            &body.keywords,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// Delete a chapter and every continuation below it.
#[utoipa::path(
    delete,
    path = "/chapters/{id}",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 200, body = DeletedResponse),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not a moderator"),
        (status = 404, description = "No such chapter")
    ),
    tag = "chapters"
)]
pub async fn delete_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = ChapterId::parse(&id)?;
    let removed = state.service.delete_chapter(viewer.get(), &id).await?;
    Ok(Json(DeletedResponse { removed }))
}
