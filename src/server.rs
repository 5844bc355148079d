//! Server module for Argus
//!
//! Configuration loading, state wiring, and the axum runtime.

use anyhow::{Context, Result};
use axum::{routing::get, Extension, Json, Router};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use argus_core::{
    ConversationStore, EchoEngine, Engine, MemoryConversationStore, RunController,
    SessionRegistry, TokenStore,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Event stream settings
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Authentication settings
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Accepted bearer tokens. Empty disables authentication entirely.
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Event stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Keepalive ping interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8790
}

fn default_keepalive() -> u64 {
    15
}

impl AppConfig {
    /// Load configuration from an optional file plus `ARGUS_*` environment
    /// overrides (e.g. `ARGUS_SERVER__PORT=9000`).
    pub fn load(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("ARGUS").separator("__"))
            .build()
            .context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Transcript store
    pub store: Arc<dyn ConversationStore>,
    /// Per-conversation session registry
    pub registry: Arc<SessionRegistry>,
    /// Run controller
    pub controller: Arc<RunController>,
    /// Keepalive interval for event streams
    pub keepalive: Duration,
}

impl AppState {
    /// Wire up state around the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, config: &AppConfig) -> Self {
        let store: Arc<dyn ConversationStore> = Arc::new(MemoryConversationStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let controller = Arc::new(
            RunController::new(store.clone(), registry.clone(), engine).with_event_logging(true),
        );
        Self {
            store,
            registry,
            controller,
            keepalive: Duration::from_secs(config.stream.keepalive_secs),
        }
    }
}

/// Health endpoint, unauthenticated.
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the full application router.
pub fn build_router(state: AppState, auth: Arc<TokenStore>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(crate::api::router(state))
        .layer(Extension(auth))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

/// Run the server until interrupted.
pub async fn run(config: AppConfig) -> Result<()> {
    let auth = Arc::new(TokenStore::new(&config.server.auth.tokens));
    if auth.is_enabled() {
        info!("Authentication enabled ({} credentials)", auth.credential_count());
    } else {
        warn!("No bearer tokens configured; authentication is DISABLED");
    }

    let state = AppState::new(Arc::new(EchoEngine), &config);
    let app = build_router(state, auth);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid bind address")?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8790);
        assert!(config.server.auth.tokens.is_empty());
        assert_eq!(config.stream.keepalive_secs, 15);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.server.port, 8790);
    }
}
