//! HTTP host that routes every incoming request through the fetch handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::manager::{AssetCacheManager, Served};
use crate::network::Network;
use crate::request::Request;
use crate::stats::{FetchCounters, FetchSnapshot};
use crate::store::CacheStorage;

/// Header naming the path that produced a response.
pub const SOURCE_HEADER: &str = "x-clarity-cache";

/// Headers that describe the upstream connection rather than the resource.
const HOP_BY_HOP: [&str; 4] = ["connection", "content-length", "keep-alive", "transfer-encoding"];

struct AppState<S: CacheStorage, N: Network> {
    manager: Arc<AssetCacheManager<S, N>>,
    counters: Arc<FetchCounters>,
}

impl<S: CacheStorage, N: Network> Clone for AppState<S, N> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            counters: Arc::clone(&self.counters),
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    cache: String,
    served: ServedCounts,
}

#[derive(Serialize)]
struct ServedCounts {
    cache: u64,
    network: u64,
    fallback: u64,
    offline: u64,
}

impl From<FetchSnapshot> for ServedCounts {
    fn from(s: FetchSnapshot) -> Self {
        Self {
            cache: s.cache,
            network: s.network,
            fallback: s.fallback,
            offline: s.offline,
        }
    }
}

async fn api_status<S, N>(State(state): State<AppState<S, N>>) -> impl IntoResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    axum::Json(StatusResponse {
        cache: state.manager.config().cache_name.clone(),
        served: state.counters.snapshot().into(),
    })
}

/// Converts a served response into an HTTP response, tagging its source.
fn into_http(served: Served) -> HttpResponse {
    let mut builder = axum::http::Response::builder().status(served.response.status);
    for (name, value) in &served.response.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .header(SOURCE_HEADER, served.source.as_str())
        .body(Body::from(served.response.body))
        .unwrap_or_else(|e| {
            log::error!("Unrepresentable response: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        })
}

async fn intercept<S, N>(
    State(state): State<AppState<S, N>>,
    method: Method,
    uri: Uri,
) -> HttpResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let url = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let request = Request::new(method.as_str(), url);

    match state.manager.handle_fetch(&request).await {
        Ok(served) => {
            state.counters.record(served.source);
            into_http(served)
        }
        Err(e @ Error::Offline { .. }) => {
            state.counters.record_offline();
            log::warn!("{e}");
            (StatusCode::GATEWAY_TIMEOUT, e.to_string()).into_response()
        }
        Err(e) => {
            log::error!("Fetch handler failed for {}: {e}", request.url);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Builds the router: a status endpoint plus a catch-all fetch handler.
pub fn router<S, N>(manager: Arc<AssetCacheManager<S, N>>, counters: Arc<FetchCounters>) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let state = AppState { manager, counters };
    Router::new()
        .route("/__clarity/status", get(api_status::<S, N>))
        .fallback(intercept::<S, N>)
        .with_state(state)
}

/// Resolves on SIGINT or SIGTERM (systemd sends SIGTERM).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                log::warn!("Failed to register SIGTERM handler: {e}");
                tokio::signal::ctrl_c().await.ok();
                log::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        log::info!("Received SIGINT");
    }
}

/// Serves requests through the manager until SIGINT/SIGTERM.
///
/// The caller is expected to have run install and activate first.
/// Returns the per-source counts for the session.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server<S, N>(
    manager: Arc<AssetCacheManager<S, N>>,
    host: &str,
    port: u16,
) -> Result<FetchSnapshot>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address {host}:{port}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let counters = Arc::new(FetchCounters::new());
    let app = router(manager, Arc::clone(&counters));

    log::info!("Serving on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let snapshot = counters.snapshot();
    log::info!(
        "Shutdown complete: {} request(s), {} cache, {} network, {} fallback, {} offline",
        snapshot.total(),
        snapshot.cache,
        snapshot.network,
        snapshot.fallback,
        snapshot.offline
    );
    Ok(snapshot)
}
