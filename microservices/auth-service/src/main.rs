//! Auth Service
//!
//! Process shell for the campus auth service: HTTP probes on `HTTP_PORT`,
//! gRPC health on `GRPC_PORT`, readiness gated on the database.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use campus_core::config::lookup_env;
use campus_core::service::DEFAULT_PROBE_TIMEOUT;
use campus_core::{
    exit_code, probe_tcp, CampusService, HealthStatus, MicroserviceRuntime, ReadinessStatus,
    Result, ServiceConfig,
};
use tracing::{error, info};

mod config;

use config::AuthConfig;

const SERVICE_ID: &str = "auth-service";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = campus_telemetry::init(SERVICE_ID) {
        eprintln!("{}: {}", SERVICE_ID, e);
        return ExitCode::FAILURE;
    }

    let (config, auth) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    let service = Arc::new(AuthService::new(auth));
    exit_code(&MicroserviceRuntime::run(service, &config).await)
}

fn load() -> Result<(ServiceConfig, AuthConfig)> {
    Ok((
        ServiceConfig::from_env(SERVICE_ID)?,
        AuthConfig::from_lookup(lookup_env)?,
    ))
}

pub struct AuthService {
    config: AuthConfig,
    start_time: Instant,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        info!(database = %config.database_addr, "Auth service configured");
        Self {
            config,
            start_time: Instant::now(),
        }
    }
}

#[async_trait]
impl CampusService for AuthService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    fn grpc_service_name(&self) -> &'static str {
        "campus.auth.v1.Auth"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::alive(self.service_id(), self.version(), self.start_time)
    }

    async fn ready(&self) -> ReadinessStatus {
        ReadinessStatus::from_dependencies(vec![
            probe_tcp("database", &self.config.database_addr, DEFAULT_PROBE_TIMEOUT).await,
        ])
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Auth Service");
        Ok(())
    }
}
