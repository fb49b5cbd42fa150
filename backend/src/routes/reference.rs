use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

/// Lookup lists every signed-in user needs to fill in the appointment form.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/branches", get(commands::branch::get_branches))
        .route("/api/subjects", get(commands::subject::get_subjects))
        .route("/api/teams", get(commands::team::get_teams))
}
