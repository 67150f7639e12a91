//! Configuration management for microservices
//!
//! Every service reads the same base settings ([`ServiceConfig`]) plus its own
//! required variables through [`required`] and [`parse_or`]. Values come from
//! a lookup function so tests never touch the process environment.

use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::error::{CampusError, Result};

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_GRPC_PORT: u16 = 9090;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENVIRONMENT: &str = "development";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
    pub environment: String,
    pub debug: bool,
    pub http_addr: SocketAddr,
    pub grpc_addr: SocketAddr,
    /// Upper bound for each transport's graceful stop.
    pub shutdown_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env(default_name: &str) -> Result<Self> {
        Self::from_lookup(default_name, lookup_env)
    }

    pub fn from_lookup<F>(default_name: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host: IpAddr = parse_or(&lookup, "BIND_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let http_port: u16 = parse_or(&lookup, "HTTP_PORT", DEFAULT_HTTP_PORT)?;
        let grpc_port: u16 = parse_or(&lookup, "GRPC_PORT", DEFAULT_GRPC_PORT)?;

        let timeout_secs: u64 =
            parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(CampusError::invalid(
                "SHUTDOWN_TIMEOUT_SECS",
                "must be greater than zero",
            ));
        }

        let config = Self {
            service_name: optional(&lookup, "SERVICE_NAME")
                .unwrap_or_else(|| default_name.to_string()),
            environment: optional(&lookup, "APP_ENV")
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            debug: parse_flag(&lookup, "DBG", false)?,
            http_addr: SocketAddr::new(host, http_port),
            grpc_addr: SocketAddr::new(host, grpc_port),
            shutdown_timeout: Duration::from_secs(timeout_secs),
        };

        info!(
            service = %config.service_name,
            environment = %config.environment,
            http = %config.http_addr,
            grpc = %config.grpc_addr,
            debug = config.debug,
            shutdown_timeout_secs = timeout_secs,
            "Configuration loaded"
        );

        Ok(config)
    }
}

/// Process environment lookup used in production.
pub fn lookup_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Non-empty value of `name`, if set.
pub fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Value of `name`, failing with an error that names the variable.
pub fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or_else(|| CampusError::MissingVar(name.to_string()))
}

/// Parsed value of `name`, or `default` when unset.
pub fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| CampusError::invalid(name, format!("{:?}: {}", raw, e))),
        None => Ok(default),
    }
}

/// Boolean flag accepting the usual spellings.
pub fn parse_flag<F>(lookup: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = optional(lookup, name) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CampusError::invalid(
            name,
            format!("{:?} is not a boolean", raw),
        )),
    }
}

/// `host:port` of a dependency given either as a URL
/// (`postgres://user:pass@db:5432/campus`) or as a bare `host[:port]`.
/// Credentials in the URL are discarded.
pub fn socket_target(name: &str, raw: &str, default_port: u16) -> Result<String> {
    if raw.contains("://") {
        let url = Url::parse(raw).map_err(|e| CampusError::invalid(name, e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CampusError::invalid(name, "URL has no host"))?;
        let port = url.port_or_known_default().unwrap_or(default_port);
        return Ok(format!("{}:{}", host, port));
    }

    match raw.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port
                .parse()
                .map_err(|_| CampusError::invalid(name, format!("bad port in {:?}", raw)))?;
            Ok(format!("{}:{}", host, port))
        }
        Some(_) => Err(CampusError::invalid(name, "missing host")),
        None => Ok(format!("{}:{}", raw, default_port)),
    }
}
