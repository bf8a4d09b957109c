use std::future::ready;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Mutex;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common_metrics::SharedRecorder;
use health::HealthRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::buildinfo::BuildInfo;
use crate::config::ServerConfig;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid bind address {address}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },
    #[error("failed to bind {address}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server exited")]
    Serve(#[source] std::io::Error),
}

/// Serves the probes, build info and metrics endpoints.
pub struct HttpServer {
    address: SocketAddr,
    router: Router,
    metrics: PrometheusHandle,
    stopping: CancellationToken,
    running: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl HttpServer {
    pub fn new(
        config: &ServerConfig,
        service_name: &str,
        build: &BuildInfo,
        health: &HealthRegistry,
        meter: SharedRecorder,
        metrics: PrometheusHandle,
    ) -> Result<Self, Error> {
        let address = config.bind().map_err(|source| Error::InvalidAddress {
            address: config.host.clone(),
            source,
        })?;

        let stopping = CancellationToken::new();
        let (running, _) = watch::channel(false);
        let router = router(
            service_name.to_owned(),
            build.clone(),
            health.clone(),
            stopping.clone(),
            meter,
            metrics.clone(),
        );

        Ok(Self {
            address,
            router,
            metrics,
            stopping,
            running,
            local_addr: Mutex::new(None),
        })
    }

    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.metrics.clone()
    }

    /// The address the listener is bound to, once `run` has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    /// Serves until `token` is cancelled or [`HttpServer::shutdown`] is called.
    pub async fn run(&self, token: CancellationToken) -> Result<(), Error> {
        let listener = TcpListener::bind(self.address)
            .await
            .map_err(|source| Error::Bind {
                address: self.address,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| Error::Bind {
            address: self.address,
            source,
        })?;
        if let Ok(mut addr) = self.local_addr.lock() {
            *addr = Some(local_addr);
        }

        info!(address = %local_addr, "listening");
        self.running.send_replace(true);

        let stopping = self.stopping.clone();
        let result = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = token.cancelled() => stopping.cancel(),
                    _ = stopping.cancelled() => {}
                }
            })
            .await;

        self.running.send_replace(false);
        info!("server stopped");
        result.map_err(Error::Serve)
    }

    /// Stops accepting connections and waits for a running `run` to return.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.stopping.cancel();
        let mut running = self.running.subscribe();
        if running.wait_for(|running| !*running).await.is_err() {
            warn!("server state channel closed");
        }
        Ok(())
    }

    #[cfg(test)]
    fn router(&self) -> Router {
        self.router.clone()
    }
}

fn router(
    service_name: String,
    build: BuildInfo,
    health: HealthRegistry,
    stopping: CancellationToken,
    meter: SharedRecorder,
    metrics: PrometheusHandle,
) -> Router {
    let liveness = health.clone();
    Router::new()
        .route("/", get(move || ready(service_name.clone())))
        .route("/_readiness", get(move || ready(readiness(&stopping))))
        .route(
            "/_liveness",
            get(move || {
                let health = liveness.clone();
                async move { health.check_all().await }
            }),
        )
        .route(
            "/_health",
            get(move || {
                let health = health.clone();
                async move { health.check_all().await }
            }),
        )
        .route("/buildinfo", get(move || ready(Json(build.clone()))))
        .route("/metrics", get(move || ready(metrics.render())))
        .layer(axum::middleware::from_fn_with_state(
            meter,
            common_metrics::track_metrics,
        ))
}

fn readiness(stopping: &CancellationToken) -> StatusCode {
    if stopping.is_cancelled() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn server(port: u16) -> (HttpServer, HealthRegistry) {
        let health = HealthRegistry::new("health").unwrap();
        let recorder = common_metrics::setup_metrics_recorder().unwrap();
        let handle = recorder.handle();
        let server = HttpServer::new(
            &ServerConfig {
                host: "127.0.0.1".to_string(),
                port,
            },
            "youless-observer",
            &BuildInfo::from_env().with_extra("client_version", "0.1.0"),
            &health,
            Arc::new(recorder),
            handle,
        )
        .unwrap();
        (server, health)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn rejects_invalid_address() {
        let health = HealthRegistry::new("health").unwrap();
        let recorder = common_metrics::setup_metrics_recorder().unwrap();
        let handle = recorder.handle();
        let result = HttpServer::new(
            &ServerConfig {
                host: "not a host".to_string(),
                port: 3310,
            },
            "youless-observer",
            &BuildInfo::from_env(),
            &health,
            Arc::new(recorder),
            handle,
        );
        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }

    #[test]
    fn accepts_ipv6_address() {
        let health = HealthRegistry::new("health").unwrap();
        let recorder = common_metrics::setup_metrics_recorder().unwrap();
        let handle = recorder.handle();
        let server = HttpServer::new(
            &ServerConfig {
                host: "::1".to_string(),
                port: 3310,
            },
            "youless-observer",
            &BuildInfo::from_env(),
            &health,
            Arc::new(recorder),
            handle,
        )
        .unwrap();
        assert_eq!(server.address.to_string(), "[::1]:3310");
    }

    #[tokio::test]
    async fn index_and_buildinfo() {
        let (server, _) = server(0);

        let (status, body) = get(server.router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "youless-observer");

        let (status, body) = get(server.router(), "/buildinfo").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["extra"]["client_version"], "0.1.0");
    }

    #[tokio::test]
    async fn readiness_flips_on_shutdown() {
        let (server, _) = server(0);

        let (status, _) = get(server.router(), "/_readiness").await;
        assert_eq!(status, StatusCode::OK);

        // Never ran, shutdown returns right away
        server.shutdown().await.unwrap();

        let (status, _) = get(server.router(), "/_readiness").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_follows_registry() {
        let (server, health) = server(0);

        let (status, _) = get(server.router(), "/_liveness").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        health
            .register_heartbeat("loop", Duration::from_secs(30))
            .report_healthy();
        let (status, body) = get(server.router(), "/_health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("loop"));
    }

    #[tokio::test]
    async fn metrics_include_requests() {
        let (server, _) = server(0);

        get(server.router(), "/buildinfo").await;
        let (status, body) = get(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("http_requests_total"));
        assert!(body.contains("path=\"/buildinfo\""));
    }

    #[tokio::test]
    async fn run_until_shutdown() {
        let (server, _) = server(0);
        let server = Arc::new(server);

        let running = server.clone();
        let task = tokio::spawn(async move { running.run(CancellationToken::new()).await });

        while server.local_addr().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        server.shutdown().await.unwrap();

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_until_cancelled() {
        let (server, _) = server(0);
        let server = Arc::new(server);
        let token = CancellationToken::new();

        let running = server.clone();
        let cancel = token.clone();
        let task = tokio::spawn(async move { running.run(cancel).await });

        while server.local_addr().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
        task.await.unwrap().unwrap();

        let (status, _) = get(server.router(), "/_readiness").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
