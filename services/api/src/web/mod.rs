pub mod health;
pub mod rest;
pub mod sessions;
pub mod state;
pub mod students;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use health::health_handler;
pub use sessions::sessions_handler;
pub use state::AppState;
pub use students::students_handler;

/// Builds the API router. The binary merges the Swagger UI on top of it.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    let cors = match app_state
        .config
        .cors_allow_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => cors.allow_origin(origin),
        None => cors.allow_origin(Any),
    };

    Router::new()
        .route("/sessions", get(sessions_handler))
        .route("/students", get(students_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(app_state)
}
