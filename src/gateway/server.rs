//! # HTTP Server Module
//!
//! Axum front end for the lookup gateway.
//!
//! ## Routes
//! - `POST /api/pickup-points/search`: pickup-point search with conditional caching
//!   (`ETag` / `If-None-Match`, `Cache-Control: max-age`)
//! - `GET /health`: liveness
//! - `GET /stats`: cache, breaker, limiter and coalescer counters
//! - `GET /metrics`: Prometheus exposition, when a recorder is installed

use crate::core::config::ServerConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::SearchQuery;
use crate::gateway::lookup::{LookupOutcome, LookupRequest, PickupLookupGateway};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router as AxumRouter,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

pub const SEARCH_PATH: &str = "/api/pickup-points/search";

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub gateway: Arc<PickupLookupGateway>,

    /// Prometheus handle; `/metrics` answers 503 without one
    pub metrics: Option<PrometheusHandle>,

    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(gateway: Arc<PickupLookupGateway>) -> Self {
        Self {
            gateway,
            metrics: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the application router
pub fn build_router(state: ServerState, max_request_size: usize) -> AxumRouter {
    AxumRouter::new()
        .route(SEARCH_PATH, post(search_pickup_points))
        .route("/health", get(health_check))
        .route("/stats", get(gateway_stats))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(TraceLayer::new_for_http())
}

pub struct GatewayServer {
    app: AxumRouter,
    bind_addr: SocketAddr,
}

impl GatewayServer {
    pub fn new(config: &ServerConfig, state: ServerState) -> GatewayResult<Self> {
        let bind_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
            .parse()
            .map_err(|e| {
                GatewayError::config(format!(
                    "Invalid bind address {}:{}: {}",
                    config.bind_address, config.http_port, e
                ))
            })?;

        Ok(Self {
            app: build_router(state, config.max_request_size),
            bind_addr,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn router(&self) -> AxumRouter {
        self.app.clone()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    #[instrument(skip(self, shutdown), fields(bind_addr = %self.bind_addr))]
    pub async fn start<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind server to {}: {}", self.bind_addr, e))
        })?;
        info!("Pickup gateway listening on {}", self.bind_addr);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::internal(format!("Server error: {}", e)))
    }
}

async fn search_pickup_points(
    State(state): State<ServerState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(query) = payload.map_err(|rejection| GatewayError::validation(rejection.body_text()))?;

    let mut request = LookupRequest::new(query);
    request.caller = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    request.if_none_match = if_none_match(&headers);

    let outcome = state.gateway.lookup(request).await?;

    let mut response = match &outcome {
        LookupOutcome::Found(reply) => Json(&reply.response).into_response(),
        LookupOutcome::NotModified { .. } => StatusCode::NOT_MODIFIED.into_response(),
    };

    let headers = response.headers_mut();
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", outcome.fingerprint())) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(cache_control) =
        HeaderValue::from_str(&format!("max-age={}", max_age_secs(outcome.max_age())))
    {
        headers.insert(header::CACHE_CONTROL, cache_control);
    }

    Ok(response)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn gateway_stats(State(state): State<ServerState>) -> impl IntoResponse {
    let now = Utc::now();
    Json(json!({
        "timestamp": now.to_rfc3339(),
        "uptime_seconds": (now - state.started_at).num_seconds().max(0),
        "gateway": state.gateway.stats(),
    }))
}

async fn prometheus_metrics(State(state): State<ServerState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "metrics recorder not installed" })),
        )
            .into_response(),
    }
}

/// Whole seconds, rounded up so a fresh entry never advertises `max-age=0`
fn max_age_secs(max_age: Duration) -> u128 {
    max_age.as_millis().div_ceil(1000)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer
fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_value("x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// First entity tag of `If-None-Match`, without quotes or weak prefix
fn if_none_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"').to_string())
        .filter(|tag| !tag.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_takes_precedence() {
        let peer: SocketAddr = "10.1.1.1:5000".parse().unwrap();
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.2"),
            ("x-real-ip", "198.51.100.4"),
        ]);
        assert_eq!(client_identity(&map, Some(peer)).as_deref(), Some("203.0.113.9"));

        let map = headers(&[("x-real-ip", "198.51.100.4")]);
        assert_eq!(client_identity(&map, Some(peer)).as_deref(), Some("198.51.100.4"));

        assert_eq!(client_identity(&HeaderMap::new(), Some(peer)).as_deref(), Some("10.1.1.1"));
        assert_eq!(client_identity(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_if_none_match_strips_quotes_and_weak_prefix() {
        assert_eq!(
            if_none_match(&headers(&[("if-none-match", "W/\"abc123\", \"def\"")])).as_deref(),
            Some("abc123")
        );
        assert_eq!(
            if_none_match(&headers(&[("if-none-match", "\"abc123\"")])).as_deref(),
            Some("abc123")
        );
        assert_eq!(if_none_match(&HeaderMap::new()), None);
    }

    #[test]
    fn test_max_age_rounds_up() {
        assert_eq!(max_age_secs(Duration::from_millis(999)), 1);
        assert_eq!(max_age_secs(Duration::from_millis(1_001)), 2);
        assert_eq!(max_age_secs(Duration::from_secs(600)), 600);
        assert_eq!(max_age_secs(Duration::ZERO), 0);
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        use crate::core::clock::SystemClock;
        use crate::core::config::GatewayConfig;
        use crate::upstream::HttpUpstreamClient;

        let config = GatewayConfig::default();
        let upstream = Arc::new(HttpUpstreamClient::new(&config.upstream).unwrap());
        let gateway = Arc::new(PickupLookupGateway::with_clock(
            &config,
            upstream,
            Arc::new(SystemClock),
        ));
        let server_config = ServerConfig {
            bind_address: "not-an-ip".to_string(),
            ..Default::default()
        };
        assert!(GatewayServer::new(&server_config, ServerState::new(gateway)).is_err());
    }
}
