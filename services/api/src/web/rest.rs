//! services/api/src/web/rest.rs
//!
//! Assembles the REST router and holds the master definition for the OpenAPI
//! specification.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use branchtale_core::domain::{ChapterId, Flag, FlagId, KeywordAction, KeywordRequest, UserId};
use branchtale_core::views::{
    ChapterDetail, ChapterInfo, ChapterListItem, ChapterPage, ChapterSummary,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::chapters::{self, ContinuationRequest, DeletedResponse, NewStoryRequest};
use crate::web::keywords;
use crate::web::middleware::resolve_viewer;
use crate::web::social::{self, FlagRequest};
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chapters::list_chapters,
        chapters::get_chapter,
        chapters::get_chain,
        chapters::create_story,
        chapters::create_continuation,
        chapters::delete_chapter,
        keywords::add_keywords,
        keywords::replace_keywords,
        keywords::delete_keyword,
        social::like_chapter,
        social::unlike_chapter,
        social::bookmark_chapter,
        social::unbookmark_chapter,
        social::flag_chapter,
        social::list_flags,
        social::delete_flag,
    ),
    components(
        schemas(
            ChapterId, UserId, FlagId,
            ChapterSummary, ChapterInfo, ChapterDetail, ChapterListItem, ChapterPage,
            Flag, KeywordAction, KeywordRequest,
            NewStoryRequest, ContinuationRequest, FlagRequest, DeletedResponse
        )
    ),
    tags(
        (name = "chapters", description = "Reading and writing branching stories."),
        (name = "keywords", description = "Keyword edits, applied or queued for review."),
        (name = "social", description = "Likes and bookmarks."),
        (name = "moderation", description = "Flags and the moderation queue.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Every API route behind the session middleware. Cross-cutting layers (CORS,
/// tracing) are added by the binary.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chapters", get(chapters::list_chapters))
        .route("/stories", post(chapters::create_story))
        .route(
            "/chapters/{id}",
            get(chapters::get_chapter).delete(chapters::delete_chapter),
        )
        .route("/chapters/{id}/chain", get(chapters::get_chain))
        .route(
            "/chapters/{id}/continuations",
            post(chapters::create_continuation),
        )
        .route(
            "/chapters/{id}/keywords",
            post(keywords::add_keywords).put(keywords::replace_keywords),
        )
        .route(
            "/chapters/{id}/keywords/{keyword}",
            delete(keywords::delete_keyword),
        )
        .route(
            "/chapters/{id}/like",
            post(social::like_chapter).delete(social::unlike_chapter),
        )
        .route(
            "/chapters/{id}/bookmark",
            post(social::bookmark_chapter).delete(social::unbookmark_chapter),
        )
        .route("/chapters/{id}/flags", post(social::flag_chapter))
        .route("/flags", get(social::list_flags))
        .route("/flags/{id}", delete(social::delete_flag))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_viewer,
        ))
        .with_state(state)
}

/// The API merged with the Swagger UI.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api_router(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
