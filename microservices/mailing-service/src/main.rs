//! Mailing Service
//!
//! Process shell for outbound campus email. Ready once both the SMTP relay
//! and the auth service answer.

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

use config::MailingConfig;

const SERVICE_ID: &str = "mailing-service";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = campus_telemetry::init(SERVICE_ID) {
        eprintln!("{}: {}", SERVICE_ID, e);
        return ExitCode::FAILURE;
    }

    let (config, mailing) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    let service = Arc::new(MailingService::new(mailing));
    exit_code(&MicroserviceRuntime::run(service, &config).await)
}

fn load() -> Result<(ServiceConfig, MailingConfig)> {
    Ok((
        ServiceConfig::from_env(SERVICE_ID)?,
        MailingConfig::from_lookup(lookup_env)?,
    ))
}

pub struct MailingService {
    config: MailingConfig,
    start_time: Instant,
}

impl MailingService {
    pub fn new(config: MailingConfig) -> Self {
        info!(
            smtp = %config.smtp_addr(),
            smtp_user = %config.smtp_username,
            from = %config.from_address,
            auth = %config.auth_addr,
            "Mailing service configured"
        );
        Self {
            config,
            start_time: Instant::now(),
        }
    }
}

#[async_trait]
impl CampusService for MailingService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    fn grpc_service_name(&self) -> &'static str {
        "campus.mailing.v1.Mailing"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::alive(self.service_id(), self.version(), self.start_time)
    }

    async fn ready(&self) -> ReadinessStatus {
        let smtp = self.config.smtp_addr();
        let (smtp, auth) = tokio::join!(
            probe_tcp("smtp", &smtp, DEFAULT_PROBE_TIMEOUT),
            probe_tcp("auth-service", &self.config.auth_addr, DEFAULT_PROBE_TIMEOUT),
        );
        ReadinessStatus::from_dependencies(vec![smtp, auth])
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Mailing Service");
        Ok(())
    }
}
