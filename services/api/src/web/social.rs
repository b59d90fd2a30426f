//! services/api/src/web/social.rs
//!
//! Likes, bookmarks, and the flag moderation queue.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use branchtale_core::domain::{ChapterId, Flag, FlagId, RelationKind};
use branchtale_core::query::ListParams;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::web::state::{AppState, CurrentViewer};

#[derive(Debug, Deserialize, ToSchema)]
pub struct FlagRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FlagPageQuery {
    /// 1-based page number.
    pub page: Option<String>,
}

async fn relate(
    state: &AppState,
    viewer: &CurrentViewer,
    kind: RelationKind,
    raw_id: &str,
) -> Result<StatusCode, ApiError> {
    let id = ChapterId::parse(raw_id)?;
    state.service.relate(viewer.get(), kind, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unrelate(
    state: &AppState,
    viewer: &CurrentViewer,
    kind: RelationKind,
    raw_id: &str,
) -> Result<StatusCode, ApiError> {
    let id = ChapterId::parse(raw_id)?;
    state.service.unrelate(viewer.get(), kind, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Likes and Bookmarks
//=========================================================================================

#[utoipa::path(
    post,
    path = "/chapters/{id}/like",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 204, description = "Liked"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No such chapter"),
        (status = 409, description = "Already liked")
    ),
    tag = "social"
)]
pub async fn like_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    relate(&state, &viewer, RelationKind::Like, &id).await
}

#[utoipa::path(
    delete,
    path = "/chapters/{id}/like",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 204, description = "Like removed"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Not liked")
    ),
    tag = "social"
)]
pub async fn unlike_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    unrelate(&state, &viewer, RelationKind::Like, &id).await
}

#[utoipa::path(
    post,
    path = "/chapters/{id}/bookmark",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 204, description = "Bookmarked"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No such chapter"),
        (status = 409, description = "Already bookmarked")
    ),
    tag = "social"
)]
pub async fn bookmark_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    relate(&state, &viewer, RelationKind::Bookmark, &id).await
}

#[utoipa::path(
    delete,
    path = "/chapters/{id}/bookmark",
    params(("id" = String, Path, description = "24-hex chapter id")),
    responses(
        (status = 204, description = "Bookmark removed"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Not bookmarked")
    ),
    tag = "social"
)]
pub async fn unbookmark_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    unrelate(&state, &viewer, RelationKind::Bookmark, &id).await
}

//=========================================================================================
// Flags
//=========================================================================================

/// Report a chapter. Anonymous visitors may flag too.
#[utoipa::path(
    post,
    path = "/chapters/{id}/flags",
    params(("id" = String, Path, description = "24-hex chapter id")),
    request_body = FlagRequest,
    responses(
        (status = 201, body = Flag),
        (status = 400, description = "Missing reason"),
        (status = 404, description = "No such chapter")
    ),
    tag = "moderation"
)]
pub async fn flag_chapter(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
    payload: Result<Json<FlagRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ChapterId::parse(&id)?;
    let Json(body) = payload?;
    let flag = state.service.flag(viewer.get(), &id, &body.reason).await?;
    Ok((StatusCode::CREATED, Json(flag)))
}

/// The flag queue, newest first.
#[utoipa::path(
    get,
    path = "/flags",
    params(FlagPageQuery),
    responses(
        (status = 200, body = Vec<Flag>),
        (status = 400, description = "Bad page number"),
        (status = 403, description = "Not a moderator")
    ),
    tag = "moderation"
)]
pub async fn list_flags(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Query(query): Query<FlagPageQuery>,
) -> Result<Json<Vec<Flag>>, ApiError> {
    let page = ListParams::from_raw(query.page.as_deref(), None, None)?.page;
    Ok(Json(state.service.list_flags(viewer.get(), page).await?))
}

/// Dismiss a flag.
#[utoipa::path(
    delete,
    path = "/flags/{id}",
    params(("id" = String, Path, description = "24-hex flag id")),
    responses(
        (status = 204, description = "Flag removed"),
        (status = 403, description = "Not a moderator"),
        (status = 404, description = "No such flag")
    ),
    tag = "moderation"
)]
pub async fn delete_flag(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = FlagId::parse(&id)?;
    state.service.delete_flag(viewer.get(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
