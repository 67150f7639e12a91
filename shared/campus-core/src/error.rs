//! Error types for Campus services

use std::net::SocketAddr;

use thiserror::Error;

use crate::lifecycle::TransportKind;

pub type Result<T> = std::result::Result<T, CampusError>;

#[derive(Error, Debug)]
pub enum CampusError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: String, reason: String },

    #[error("{transport} listener failed to bind {address}: {source}")]
    Bind {
        transport: TransportKind,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{transport} server error: {message}")]
    Serve {
        transport: TransportKind,
        message: String,
    },

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl CampusError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidVar {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingVar(_) => "MISSING_VAR",
            Self::InvalidVar { .. } => "INVALID_VAR",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Serve { .. } => "SERVE_ERROR",
            Self::Signal(_) => "SIGNAL_ERROR",
        }
    }
}
