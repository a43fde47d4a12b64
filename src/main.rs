mod error;
mod handlers;
mod models;
mod oauth1;
mod pipeline;
mod session;
#[cfg(test)]
mod test_utils;

use std::net::SocketAddr;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use models::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app_config = AppConfig::load()?;
    init_tracing(&app_config.log_level);
    tracing::debug!(config = %app_config, "Loaded configuration");

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let app = handlers::router(AppState::new(app_config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("authentication_server={log_level},access={log_level}"))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
