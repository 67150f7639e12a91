//! Service infrastructure for all microservices

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tonic::service::Routes;
use tonic_health::ServingStatus;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::lifecycle::{GrpcTransport, HttpTransport, Launcher, ShutdownReport, Supervisor};

/// Name the standard gRPC health service is mounted under.
pub const GRPC_HEALTH_SERVICE: &str = "grpc.health.v1.Health";

/// Connect timeout for dependency readiness probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health status for liveness probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service_id: String,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// A live process that started at `started`.
    pub fn alive(service_id: &str, version: &str, started: Instant) -> Self {
        Self {
            healthy: true,
            service_id: service_id.to_string(),
            version: version.to_string(),
            uptime_seconds: started.elapsed().as_secs(),
        }
    }
}

/// Readiness status for readiness probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub dependencies: Vec<DependencyStatus>,
}

impl ReadinessStatus {
    /// Ready when every dependency is available.
    pub fn from_dependencies(dependencies: Vec<DependencyStatus>) -> Self {
        Self {
            ready: dependencies.iter().all(|d| d.available),
            dependencies,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub latency_ms: Option<u64>,
}

/// Standard trait all microservices must implement
#[async_trait]
pub trait CampusService: Send + Sync + 'static {
    /// Service identifier (e.g., "auth-service", "mailing-service")
    fn service_id(&self) -> &'static str;

    /// Fully-qualified name reported as SERVING by the gRPC health service
    fn grpc_service_name(&self) -> &'static str;

    /// Service version
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Health check - is the service alive?
    async fn health(&self) -> HealthStatus;

    /// Readiness check - are all dependencies available?
    async fn ready(&self) -> ReadinessStatus;

    /// Business HTTP routes, merged next to the probe routes
    fn http_router(&self) -> Router {
        Router::new()
    }

    /// Add business gRPC services to the routes that already carry health
    fn grpc_routes(&self, routes: Routes) -> Routes {
        routes
    }

    /// Release resources once both transports have stopped
    async fn shutdown(&self) -> Result<()>;
}

/// Standard microservice runtime bootstrap
pub struct MicroserviceRuntime;

impl MicroserviceRuntime {
    /// Serve `service` over HTTP and gRPC until a signal or a transport
    /// failure, then run the service's own shutdown.
    pub async fn run<S: CampusService>(
        service: Arc<S>,
        config: &ServiceConfig,
    ) -> Result<ShutdownReport> {
        let start_time = Instant::now();

        info!(
            service_id = service.service_id(),
            version = service.version(),
            environment = %config.environment,
            "Starting microservice"
        );

        let router = probe_router(service.clone()).merge(service.http_router());
        let http = HttpTransport::new(router)
            .mount("GET /health")
            .mount("GET /ready");

        let routes = service.grpc_routes(grpc_health_routes(service.grpc_service_name()).await);
        let grpc = GrpcTransport::new(routes).mount(GRPC_HEALTH_SERVICE);

        let report = Supervisor::from_config(config)
            .launcher(Launcher::new(config.http_addr, http))
            .launcher(Launcher::new(config.grpc_addr, grpc))
            .run()
            .await?;

        if let Err(e) = service.shutdown().await {
            warn!(error = %e, "Error during shutdown");
        }

        info!(
            uptime_seconds = start_time.elapsed().as_secs(),
            trigger = %report.trigger,
            "Microservice stopped"
        );

        Ok(report)
    }
}

/// Process exit status for a finished runtime: failure when the runtime could
/// not start or a transport failure caused the shutdown.
pub fn exit_code(result: &Result<ShutdownReport>) -> ExitCode {
    match result {
        Ok(report) if report.is_failure() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Microservice failed");
            ExitCode::FAILURE
        }
    }
}

/// `GET /health` and `GET /ready` for orchestrator probes.
pub fn probe_router<S: CampusService>(service: Arc<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/ready", get(ready_handler::<S>))
        .with_state(service)
}

async fn health_handler<S: CampusService>(State(service): State<Arc<S>>) -> Json<HealthStatus> {
    Json(service.health().await)
}

async fn ready_handler<S: CampusService>(
    State(service): State<Arc<S>>,
) -> (StatusCode, Json<ReadinessStatus>) {
    let status = service.ready().await;
    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Routes carrying the standard gRPC health service with `service_name`
/// marked as serving.
pub async fn grpc_health_routes(service_name: &str) -> Routes {
    let (mut reporter, health) = tonic_health::server::health_reporter();
    reporter
        .set_service_status(service_name, ServingStatus::Serving)
        .await;
    Routes::new(health)
}

/// TCP reachability check for a dependency at `address` (`host:port`).
pub async fn probe_tcp(name: &str, address: &str, timeout: Duration) -> DependencyStatus {
    let start = Instant::now();
    let available = matches!(
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect(address)).await,
        Ok(Ok(_))
    );

    DependencyStatus {
        name: name.to_string(),
        available,
        latency_ms: available.then(|| start.elapsed().as_millis() as u64),
    }
}
