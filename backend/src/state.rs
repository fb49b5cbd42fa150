use crate::commands::holiday::Holiday;
use crate::config::AppConfig;
use crate::db::DbPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
    pub holidays: Arc<Mutex<HashMap<i32, Vec<Holiday>>>>, // fetched years
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig) -> Self {
        AppState {
            pool,
            config: Arc::new(config),
            http: reqwest::Client::new(),
            holidays: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl axum::extract::FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
