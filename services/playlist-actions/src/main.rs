//! Playlist Actions
//!
//! Single-binary service that lets voice assistants and shortcuts act on the
//! user's Spotify playback with nothing but an API key:
//! 1. Users authorize once via /api/login and receive an API key
//! 2. Each request resolves the key to a fresh access token (refreshing on demand)
//! 3. Playlist mutations go through an idempotent, ownership-checked guard

mod api;
mod auth;
mod config;
mod error;
mod metrics;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use music_api::{MusicApi, PlaylistGuard, SpotifyClient};
use spotify_auth::{ClientCredentials, SpotifyTokenClient};
use tokio::net::TcpListener;
use token_broker::{FileStore, TokenManager};
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics::ServiceMetrics;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    tokens: Arc<TokenManager>,
    guard: Arc<PlaylistGuard>,
    music: Arc<dyn MusicApi>,
    oauth: Arc<SpotifyTokenClient>,
    /// Externally reachable base URL without a trailing slash.
    public_url: String,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// `/api/*` routes run behind the request-tracking middleware; the whole
/// router is capped at `max_connections` concurrent requests.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let api = Router::new()
        .route("/api/login", get(auth::login))
        .route("/api/callback", get(auth::callback))
        .route("/api/setup", get(auth::setup))
        .route("/api/current-song", get(api::current_song))
        .route("/api/add-song", post(api::add_song))
        .route("/api/remove-song", post(api::remove_song))
        .route("/api/revoke", post(api::revoke))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests));

    Router::new()
        .merge(api)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Tag each request with a `req_<uuid>` id, render `ApiError`s with it, and
/// record request metrics.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        route = %route
    );
    let mut response = next.run(request).instrument(span.clone()).await;
    let status = response.status().as_u16();

    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    if let Some(err) = response.extensions_mut().remove::<ApiError>() {
        state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        if err.is_upstream() {
            metrics::record_upstream_error(err.kind());
        }
        span.in_scope(|| warn!(status, error_type = err.kind(), "request failed"));
        response = err.render(Some(&request_id));
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    metrics::record_request(&route, status, started.elapsed().as_secs_f64());
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting playlist-actions");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        public_url = %config.server.public_url,
        store_path = %config.store.path.display(),
        timeout_secs = config.server.timeout_secs,
        "configuration loaded"
    );

    let client_secret = config
        .spotify
        .client_secret
        .clone()
        .context("Spotify client secret not configured")?;

    let http = reqwest::Client::new();
    let oauth = Arc::new(SpotifyTokenClient::new(
        http.clone(),
        ClientCredentials {
            client_id: config.spotify.client_id.clone(),
            client_secret,
            redirect_uri: config.spotify.redirect_uri.clone(),
        },
        config.timeout(),
    ));

    let store = Arc::new(
        FileStore::load(config.store.path.clone())
            .await
            .with_context(|| format!("failed to open store {}", config.store.path.display()))?,
    );
    let tokens = Arc::new(TokenManager::new(
        store,
        oauth.clone(),
        config.broker_settings(),
    ));

    let music: Arc<dyn MusicApi> = Arc::new(SpotifyClient::new(http, config.timeout()));
    let app_state = AppState {
        tokens,
        guard: Arc::new(PlaylistGuard::new(music.clone())),
        music,
        oauth,
        public_url: config.server.public_url.trim_end_matches('/').to_string(),
        metrics: ServiceMetrics::new(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus request counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": uptime,
            "requests_served": requests,
            "errors_total": errors,
        })
        .to_string(),
    )
}

/// Prometheus metrics endpoint: returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
