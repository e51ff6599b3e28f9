//! crgate web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - Directory-backed login issuing bearer sessions
//! - Change-request listing
//! - Batch approve / reject acknowledgements
//! - Health endpoint

pub mod api;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crgate_core::config::AppConfig;
use crgate_core::directory::{self, CredentialSource};
use crgate_core::errors::ConfigError;
use crgate_core::records::ChangeRequestStore;
use crgate_core::roles::RoleMapper;
use crgate_core::session::SessionStore;
use crgate_core::verifier::CredentialVerifier;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub verifier: CredentialVerifier,
    /// Active sessions (token -> identity).
    pub sessions: SessionStore,
    pub records: ChangeRequestStore,
}

impl AppState {
    /// Build the state from configuration, selecting the credential source
    /// it names.
    pub fn from_config(config: AppConfig) -> Result<Self, ConfigError> {
        let source = directory::from_config(&config.directory)?;
        Ok(Self::with_source(config, source))
    }

    /// Build the state around an explicit credential source.
    pub fn with_source(config: AppConfig, source: Arc<dyn CredentialSource>) -> Self {
        let verifier = CredentialVerifier::new(
            source,
            RoleMapper::new(&config.roles),
            Duration::from_secs(config.directory.timeout_secs),
        );
        Self {
            sessions: SessionStore::new(config.session.ttl_secs),
            records: ChangeRequestStore::seeded(),
            verifier,
            config,
        }
    }
}

/// Build the full router with middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = state.config.web.max_body_bytes;

    Router::new()
        .merge(api::status::routes())
        .merge(api::auth::routes())
        .merge(api::change_requests::routes())
        .fallback(api::status::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(api::status::panic_response))
        .layer(cors)
        .with_state(state)
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Shared state, e.g. for background maintenance tasks.
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Start the web server and run until `shutdown` resolves.
    pub async fn start<F>(self, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listen_addr.parse()?;
        let app = build_router(self.state);

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
