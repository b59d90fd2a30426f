//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler, and the per-request viewer.

use std::sync::Arc;

use branchtale_core::domain::Viewer;
use branchtale_core::ports::ViewerResolver;
use branchtale_core::service::ChapterService;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChapterService>,
    pub viewers: Arc<dyn ViewerResolver>,
}

impl AppState {
    pub fn new(service: ChapterService, viewers: Arc<dyn ViewerResolver>) -> Self {
        Self {
            service: Arc::new(service),
            viewers,
        }
    }
}

//=========================================================================================
// CurrentViewer (Specific to One Request)
//=========================================================================================

/// The identity resolved from the session cookie, placed in the request extensions
/// by [`crate::web::middleware::resolve_viewer`]. `None` is an anonymous visitor.
#[derive(Debug, Clone, Default)]
pub struct CurrentViewer(pub Option<Viewer>);

impl CurrentViewer {
    pub fn get(&self) -> Option<&Viewer> {
        self.0.as_ref()
    }
}
