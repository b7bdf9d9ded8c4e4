//! Admission webhook HTTP server

pub mod handlers;
pub mod state;

pub use handlers::create_router;
pub use state::AppState;

/// Admission review endpoint
pub const VALIDATE_PATH: &str = "/validate";
