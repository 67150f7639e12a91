//! Campus Core - Shared service infrastructure
//!
//! This crate provides:
//! - Environment-based configuration loading
//! - The dual-transport (HTTP + gRPC) lifecycle supervisor
//! - Standard service trait and runtime all microservices run under
//! - Error handling utilities

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod service;

pub use config::ServiceConfig;
pub use error::{CampusError, Result};
pub use lifecycle::{Launcher, ShutdownReport, Supervisor, TransportKind};
pub use service::{
    exit_code, probe_tcp, CampusService, DependencyStatus, HealthStatus, MicroserviceRuntime,
    ReadinessStatus,
};
