//! Profiles Service
//!
//! Process shell for learner and staff profiles. Depends on its own database
//! and on the auth service for identity lookups.

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

use config::ProfilesConfig;

const SERVICE_ID: &str = "profiles-service";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = campus_telemetry::init(SERVICE_ID) {
        eprintln!("{}: {}", SERVICE_ID, e);
        return ExitCode::FAILURE;
    }

    let (config, profiles) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    let service = Arc::new(ProfilesService::new(profiles));
    exit_code(&MicroserviceRuntime::run(service, &config).await)
}

fn load() -> Result<(ServiceConfig, ProfilesConfig)> {
    Ok((
        ServiceConfig::from_env(SERVICE_ID)?,
        ProfilesConfig::from_lookup(lookup_env)?,
    ))
}

pub struct ProfilesService {
    config: ProfilesConfig,
    start_time: Instant,
}

impl ProfilesService {
    pub fn new(config: ProfilesConfig) -> Self {
        info!(
            database = %config.database_addr,
            auth = %config.auth_addr,
            "Profiles service configured"
        );
        Self {
            config,
            start_time: Instant::now(),
        }
    }
}

#[async_trait]
impl CampusService for ProfilesService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    fn grpc_service_name(&self) -> &'static str {
        "campus.profiles.v1.Profiles"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::alive(self.service_id(), self.version(), self.start_time)
    }

    async fn ready(&self) -> ReadinessStatus {
        let (database, auth) = tokio::join!(
            probe_tcp("database", &self.config.database_addr, DEFAULT_PROBE_TIMEOUT),
            probe_tcp("auth-service", &self.config.auth_addr, DEFAULT_PROBE_TIMEOUT),
        );
        ReadinessStatus::from_dependencies(vec![database, auth])
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Profiles Service");
        Ok(())
    }
}
