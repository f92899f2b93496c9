//! HTTP service surface.
//!
//! | Module    | Responsibility                                        |
//! |-----------|-------------------------------------------------------|
//! | `api`     | `AppState`, `ApiError`, routes and handlers           |
//! | `payload` | request bodies, JSON-or-form extractor, session cookie |

pub mod api;
pub mod payload;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use api::{ApiError, AppState, SharedState, api_router};

use crate::config::AppConfig;

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    let dev_mode = state.config.dev_mode;
    let mut app = api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Address to bind, from `host` and `port`.
pub fn bind_address(config: &AppConfig) -> String {
    if config.host.contains(':') && !config.host.starts_with('[') {
        format!("[{}]:{}", config.host, config.port)
    } else {
        format!("{}:{}", config.host, config.port)
    }
}

/// Bind the listener. Returns it with the resolved local address.
pub async fn bind(config: &AppConfig) -> Result<(tokio::net::TcpListener, SocketAddr)> {
    let addr = bind_address(config);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// Serve until Ctrl-C.
pub async fn start_server(config: AppConfig, listener: tokio::net::TcpListener) -> Result<()> {
    for warning in config.validate() {
        warn!("{}", warning);
    }
    let state = Arc::new(AppState::from_config(config));
    if !state.oauth.is_configured() {
        warn!("GitHub OAuth client not configured; only personal access tokens can be used");
    }
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::fake::FakeGenerator;
    use crate::tracker::fake::FakeTracker;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(dev_mode: bool) -> Router {
        let config = AppConfig {
            dev_mode,
            ..Default::default()
        };
        let state = Arc::new(AppState::new(
            config,
            Arc::new(FakeGenerator::new("sk-valid", "", "")),
            Arc::new(FakeTracker::new("octo", "gho_ok")),
            None,
        ));
        build_router(state)
    }

    #[tokio::test]
    async fn test_router_serves_health() {
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = test_router(false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let request = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let response = test_router(false).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dev_mode_adds_cors_headers() {
        let request = Request::builder()
            .uri("/api/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = test_router(true).oneshot(request).await.unwrap();
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin")
        );

        let request = Request::builder()
            .uri("/api/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = test_router(false).oneshot(request).await.unwrap();
        assert!(
            !response
                .headers()
                .contains_key("access-control-allow-origin")
        );
    }

    #[test]
    fn test_bind_address() {
        let mut config = AppConfig::default();
        assert_eq!(bind_address(&config), "127.0.0.1:8080");
        config.host = "::1".into();
        config.port = 9000;
        assert_eq!(bind_address(&config), "[::1]:9000");
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = AppConfig {
            port: 0,
            ..Default::default()
        };
        let (_listener, addr) = bind(&config).await.unwrap();
        assert_ne!(addr.port(), 0);
    }
}
