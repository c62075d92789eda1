use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod repo;

/// The `:username` segment mirrors the original URL scheme; identity always
/// comes from the session user, never from the path.
pub fn router() -> Router<AppState> {
    handlers::dashboard_routes()
}
