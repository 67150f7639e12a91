use campus_core::config::{required, socket_target};
use campus_core::Result;

const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_AUTH_GRPC_PORT: u16 = 9090;

#[derive(Debug, Clone)]
pub struct ProfilesConfig {
    pub database_addr: String,
    pub auth_addr: String,
}

impl ProfilesConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let database_addr = socket_target("DATABASE_URL", &database_url, DEFAULT_POSTGRES_PORT)?;

        let auth_raw = required(&lookup, "AUTH_GRPC_ADDRESS")?;
        let auth_addr = socket_target("AUTH_GRPC_ADDRESS", &auth_raw, DEFAULT_AUTH_GRPC_PORT)?;

        Ok(Self {
            database_addr,
            auth_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::CampusError;

    fn lookup(database: Option<&str>, auth: Option<&str>) -> impl Fn(&str) -> Option<String> {
        let database = database.map(str::to_string);
        let auth = auth.map(str::to_string);
        move |name: &str| match name {
            "DATABASE_URL" => database.clone(),
            "AUTH_GRPC_ADDRESS" => auth.clone(),
            _ => None,
        }
    }

    #[test]
    fn test_loads_both_targets() {
        let config = ProfilesConfig::from_lookup(lookup(
            Some("postgres://profiles@pg/profiles"),
            Some("auth-service"),
        ))
        .unwrap();

        assert_eq!(config.database_addr, "pg:5432");
        assert_eq!(config.auth_addr, "auth-service:9090");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ProfilesConfig::from_lookup(lookup(
            Some("postgres://profiles:hunter2@pg/profiles"),
            Some("auth-service:9090"),
        ))
        .unwrap();

        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_missing_auth_address_named() {
        let err = ProfilesConfig::from_lookup(lookup(Some("postgres://pg/profiles"), None))
            .unwrap_err();

        assert!(matches!(err, CampusError::MissingVar(ref name) if name == "AUTH_GRPC_ADDRESS"));
    }

    #[test]
    fn test_empty_database_url_is_missing() {
        let err = ProfilesConfig::from_lookup(lookup(Some(""), Some("auth-service:9090")))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Missing required environment variable: DATABASE_URL"
        );
    }
}
