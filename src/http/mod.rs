use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{bearer_token, AuthUser};
pub use error::AppError;
pub use handlers::VIDEO_FIELD;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::videos(state.upload_max_bytes))
        .with_state(state)
}
