//! services/api/src/web/keywords.rs
//!
//! Keyword handlers. Additions and deletions either apply at once (200) or land in
//! the review queue (202), depending on who asks.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use branchtale_core::domain::{ChapterId, KeywordRequest};
use branchtale_core::views::{ChapterInfo, KeywordOutcome};
use serde_json::Value;

use crate::error::ApiError;
use crate::web::state::{AppState, CurrentViewer};

fn outcome_response(outcome: KeywordOutcome) -> Response {
    match outcome {
        KeywordOutcome::Applied(info) => (StatusCode::OK, Json(info)).into_response(),
        KeywordOutcome::Queued(request) => (StatusCode::ACCEPTED, Json(request)).into_response(),
    }
}

/// Add keywords to a chapter. The body must be a bare JSON array of strings.
#[utoipa::path(
    post,
    path = "/chapters/{id}/keywords",
    params(("id" = String, Path, description = "24-hex chapter id")),
    request_body(content = Vec<String>, description = "For example [\"dragons\", \"sea\"]"),
    responses(
        (status = 200, description = "Applied", body = ChapterInfo),
        (status = 202, description = "Queued for review", body = KeywordRequest),
        (status = 400, description = "Body is not an array or a keyword is invalid"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No such chapter")
    ),
    tag = "keywords"
)]
pub async fn add_keywords(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = ChapterId::parse(&id)?;
    let Json(body) = payload?;
    let outcome = state.service.add_keywords(viewer.get(), &id, &body).await?;
    Ok(outcome_response(outcome))
}

/// Replace the whole keyword set. Moderators only; never queued.
#[utoipa::path(
    put,
    path = "/chapters/{id}/keywords",
    params(("id" = String, Path, description = "24-hex chapter id")),
    request_body(content = Vec<String>),
    responses(
        (status = 200, body = ChapterInfo),
        (status = 400, description = "Body is not an array or a keyword is invalid"),
        (status = 403, description = "Not a moderator"),
        (status = 404, description = "No such chapter")
    ),
    tag = "keywords"
)]
pub async fn replace_keywords(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChapterInfo>, ApiError> {
    let id = ChapterId::parse(&id)?;
    let Json(body) = payload?;
    Ok(Json(
        state
            .service
            .replace_keywords(viewer.get(), &id, &body)
            .await?,
    ))
}

/// Remove one keyword from a chapter.
#[utoipa::path(
    delete,
    path = "/chapters/{id}/keywords/{keyword}",
    params(
        ("id" = String, Path, description = "24-hex chapter id"),
        ("keyword" = String, Path, description = "The keyword to remove")
    ),
    responses(
        (status = 200, description = "Applied", body = ChapterInfo),
        (status = 202, description = "Queued for review", body = KeywordRequest),
        (status = 400, description = "Invalid keyword"),
        (status = 404, description = "No such chapter or keyword")
    ),
    tag = "keywords"
)]
pub async fn delete_keyword(
    State(state): State<Arc<AppState>>,
    Extension(viewer): Extension<CurrentViewer>,
    Path((id, keyword)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id = ChapterId::parse(&id)?;
    let outcome = state
        .service
        .delete_keyword(viewer.get(), &id, &keyword)
        .await?;
    Ok(outcome_response(outcome))
}
