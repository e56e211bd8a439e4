//! Fedinbox - federation inbox and identity discovery service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - POST /ap/@:username/inbox                                │
//! │  - /.well-known/webfinger, host-meta, nodeinfo              │
//! │  - /health, /metrics                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Federation Layer                          │
//! │  - Trust list authorization                                 │
//! │  - Timestamp freshness                                      │
//! │  - Inbox dispatch, WebFinger resolution                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Backend Collaborators                       │
//! │  - Article ingestion, follow service, user directory        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: inbox, trust list, freshness and WebFinger
//! - `backend`: collaborator traits and their HTTP client
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

use federation::{IdentityResolver, InboxCollaborators, InboxDispatcher, InboxSettings, TrustList};

/// Application state shared across all handlers
///
/// Everything in here is immutable after startup and cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Untrusted host list
    pub trust_list: Arc<TrustList>,

    /// Inbox protocol dispatcher
    pub inbox: Arc<InboxDispatcher>,

    /// WebFinger identity resolver
    pub resolver: Arc<IdentityResolver>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Load the trust list
    /// 2. Build the inbox dispatcher
    /// 3. Build the identity resolver
    ///
    /// # Errors
    /// Returns error if the trust list cannot be read
    pub fn new(config: config::AppConfig, backends: backend::Backends) -> error::Result<Self> {
        tracing::info!("Initializing application state...");

        let trust_list = TrustList::load_file(&config.federation.trust_list_path)?;
        Ok(Self::with_trust_list(config, trust_list, backends))
    }

    /// Initialize application state around an already loaded trust list.
    pub fn with_trust_list(
        config: config::AppConfig,
        trust_list: TrustList,
        backends: backend::Backends,
    ) -> Self {
        let trust_list = Arc::new(trust_list);

        let inbox = InboxDispatcher::new(
            trust_list.clone(),
            InboxCollaborators {
                articles: backends.articles,
                follows: backends.follows,
            },
            InboxSettings::from_config(&config.federation),
        );

        let resolver = IdentityResolver::new(
            &config.server,
            backends.users,
            config.federation.backend_timeout(),
        );

        tracing::info!(
            hostname = %config.server.hostname,
            untrusted_hosts = trust_list.len(),
            "Application state initialized"
        );

        Self {
            config: Arc::new(config),
            trust_list,
            inbox: Arc::new(inbox),
            resolver: Arc::new(resolver),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower::ServiceBuilder;
    use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

    let max_body_bytes = state.config.federation.max_body_bytes;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(api::track_requests))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
