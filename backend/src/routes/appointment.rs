use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/appointments/events",
            get(commands::appointment::get_events),
        )
        .route(
            "/api/appointments/today",
            get(commands::appointment::get_today_summary),
        )
        .route(
            "/api/appointments/options",
            get(commands::appointment::get_form_options),
        )
        .route(
            "/api/appointments/create",
            post(commands::appointment::create_appointment),
        )
        .route(
            "/api/appointments/:id",
            get(commands::appointment::get_appointment),
        )
        .route(
            "/api/appointments/:id/update",
            post(commands::appointment::update_appointment),
        )
        .route(
            "/api/appointments/:id/delete",
            post(commands::appointment::delete_appointment),
        )
        .route(
            "/api/calendar/holidays",
            get(commands::holiday::get_holidays),
        )
}
