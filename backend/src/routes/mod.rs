use crate::middleware::auth::auth_middleware;
use crate::middleware::response::wrap_response_middleware;
use crate::state::AppState;
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod appointment;
pub mod auth;
pub mod reference;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(reference::router())
        .merge(appointment::router())
        .merge(admin::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn(wrap_response_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
