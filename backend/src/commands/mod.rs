pub mod activity_log;
pub mod analytics;
pub mod appointment;
pub mod auth;
pub mod branch;
pub mod client;
pub mod daily_count;
pub mod holiday;
pub mod subject;
pub mod team;
pub mod user;
pub mod utils;
