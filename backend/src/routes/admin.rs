use crate::commands;
use crate::middleware::auth::require_admin;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Management screens. Only administrators and directors get past the layer.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/branches/create",
            post(commands::branch::create_branch),
        )
        .route(
            "/api/admin/branches/update",
            post(commands::branch::update_branch),
        )
        .route(
            "/api/admin/branches/delete",
            post(commands::branch::delete_branch),
        )
        .route(
            "/api/admin/subjects/create",
            post(commands::subject::create_subject),
        )
        .route(
            "/api/admin/subjects/update",
            post(commands::subject::update_subject),
        )
        .route(
            "/api/admin/subjects/delete",
            post(commands::subject::delete_subject),
        )
        .route("/api/admin/teams/create", post(commands::team::create_team))
        .route("/api/admin/teams/update", post(commands::team::update_team))
        .route("/api/admin/teams/delete", post(commands::team::delete_team))
        .route("/api/admin/users", get(commands::user::get_all_users))
        .route("/api/admin/users/update", post(commands::user::update_user))
        .route(
            "/api/admin/db-counts",
            get(commands::daily_count::get_daily_counts),
        )
        .route(
            "/api/admin/db-counts/save",
            post(commands::daily_count::save_daily_count),
        )
        .route(
            "/api/admin/db-counts/delete",
            post(commands::daily_count::delete_daily_count),
        )
        .route(
            "/api/admin/analytics",
            get(commands::analytics::get_analytics),
        )
        .route(
            "/api/admin/logs",
            get(commands::activity_log::get_recent_logs),
        )
        .route_layer(middleware::from_fn(require_admin))
}
