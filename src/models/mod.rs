pub mod app_config;
pub mod oauth;
pub mod user;

pub use app_config::{AppConfig, AppState};
