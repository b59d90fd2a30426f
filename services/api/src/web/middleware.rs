//! services/api/src/web/middleware.rs
//!
//! Session middleware that turns the `session` cookie into a [`CurrentViewer`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use branchtale_core::ports::PortError;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::web::state::{AppState, CurrentViewer};

/// Resolves the viewer for every request.
///
/// Without a `session` cookie the request proceeds anonymously. A cookie that does
/// not resolve to a live session is rejected with 401 rather than silently downgraded.
pub async fn resolve_viewer(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let viewer = match session_token(req.headers()) {
        None => None,
        Some(token) => match state.viewers.viewer_for_session(token).await? {
            Some(viewer) => {
                debug!(viewer = %viewer.name, "Session resolved.");
                Some(viewer)
            }
            None => {
                warn!("Rejected a session cookie that does not resolve.");
                return Err(PortError::Unauthorized.into());
            }
        },
    };

    req.extensions_mut().insert(CurrentViewer(viewer));
    Ok(next.run(req).await)
}

/// The value of the first `session=` pair across all `Cookie` headers.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|c| c.trim().strip_prefix("session="))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_the_session_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers), Some("abc123"));
    }

    #[test]
    fn no_cookie_means_no_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(session_token(&headers), None);
    }
}
