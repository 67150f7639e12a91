//! Telemetry Configuration

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "campus-service".to_string(),
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |name| std::env::var(name).ok())
    }

    /// `LOG_LEVEL` wins, then `DBG` selects debug, otherwise info.
    /// Blank values count as unset.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let debug = var("DBG").map(|v| is_truthy(&v)).unwrap_or(false);
        let log_level = var("LOG_LEVEL")
            .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string());

        Self {
            service_name: var("SERVICE_NAME").unwrap_or_else(|| service_name.to_string()),
            log_level,
            json_logs: var("JSON_LOGS").map(|v| is_truthy(&v)).unwrap_or(true),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
