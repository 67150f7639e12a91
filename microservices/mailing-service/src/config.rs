use campus_core::config::{parse_or, required, socket_target};
use campus_core::{CampusError, Result};

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_AUTH_GRPC_PORT: u16 = 9090;

#[derive(Debug, Clone)]
pub struct MailingConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub from_address: String,
    /// `host:port` of the auth service's gRPC listener.
    pub auth_addr: String,
}

impl MailingConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_host = required(&lookup, "SMTP_HOST")?;
        let smtp_port = parse_or(&lookup, "SMTP_PORT", DEFAULT_SMTP_PORT)?;
        let smtp_username = required(&lookup, "SMTP_USERNAME")?;
        // Checked for presence only; it is never stored or logged.
        required(&lookup, "SMTP_PASSWORD")?;

        let from_address = required(&lookup, "SMTP_FROM")?;
        if !from_address.contains('@') {
            return Err(CampusError::invalid(
                "SMTP_FROM",
                format!("{:?} is not an email address", from_address),
            ));
        }

        let auth_raw = required(&lookup, "AUTH_GRPC_ADDRESS")?;
        let auth_addr = socket_target("AUTH_GRPC_ADDRESS", &auth_raw, DEFAULT_AUTH_GRPC_PORT)?;

        Ok(Self {
            smtp_host,
            smtp_port,
            smtp_username,
            from_address,
            auth_addr,
        })
    }

    pub fn smtp_addr(&self) -> String {
        format!("{}:{}", self.smtp_host, self.smtp_port)
    }
}
