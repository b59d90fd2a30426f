pub mod chapters;
pub mod keywords;
pub mod middleware;
pub mod rest;
pub mod social;
pub mod state;

// Re-export what the binaries need to build the web server.
pub use rest::{api_router, app, ApiDoc};
pub use state::{AppState, CurrentViewer};
