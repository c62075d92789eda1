use crate::state::AppState;
use axum::Router;

pub mod blacklist;
mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
