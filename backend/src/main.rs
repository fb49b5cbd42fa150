use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod calendar;
mod commands;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod state;

#[cfg(test)]
mod integration_tests;

use config::AppConfig;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting counsel center backend...");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return;
        }
    };

    let pool = match db::init_pool(&config.database_url) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to create database pool: {}", e);
            return;
        }
    };

    if let Err(e) = db::init_database(&pool, &config).await {
        tracing::error!("Failed to prepare database: {}", e);
        return;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = routes::create_router(AppState::new(pool, config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    tracing::info!("listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server stopped: {}", e);
    }
}
