use campus_core::config::{required, socket_target};
use campus_core::Result;

const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Only the probe target is kept; the URL itself carries credentials.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// `host:port` the readiness probe connects to.
    pub database_addr: String,
}

impl AuthConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let database_addr = socket_target("DATABASE_URL", &database_url, DEFAULT_POSTGRES_PORT)?;

        Ok(Self { database_addr })
    }
}
