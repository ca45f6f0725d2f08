//! # Swauth - Main Entry Point
//!
//! Initializes and runs the Axum web server.

use std::net::SocketAddr;

use swauth::config::AppConfig;
use swauth::error::AppError;
use swauth::router::build_router;
use swauth::state::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
  let config = AppConfig::load().map_err(|e| AppError::Configuration(e.to_string()))?;

  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer())
    .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
    .init();

  let bind_address = config.server.bind_address.clone();
  let port = config.server.port;

  let app_state = AppState::try_new(config).await?;
  let app = build_router(app_state);

  let addr: SocketAddr = format!("{bind_address}:{port}")
    .parse()
    .map_err(|e| AppError::Configuration(format!("invalid bind address: {e}")))?;
  info!(%addr, "swauth listening");

  let listener = TcpListener::bind(addr)
    .await
    .map_err(|e| AppError::Internal(format!("failed to bind {addr}: {e}")))?;
  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .await
  .map_err(|e| AppError::Internal(format!("server error: {e}")))?;

  Ok(())
}
