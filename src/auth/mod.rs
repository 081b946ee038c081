use axum::Router;

use crate::state::AppState;

mod dto;
pub mod handlers;
pub(crate) mod extractors;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod session;

pub use dto::ProfileResponse;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
