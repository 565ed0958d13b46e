use std::env;

pub const SERVICE_NAME_ENV: &str = "OTEL_SERVICE_NAME";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEPLOYMENT_ENV: &str = "DEPLOYMENT_ENV";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Self {
        Self::from_lookup(default_service_name, |key| env::var(key).ok())
    }

    /// JSON logs unless `LOG_FORMAT` is `text`, `pretty` or `plain`.
    pub fn from_lookup<F>(default_service_name: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = lookup(SERVICE_NAME_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_service_name.to_string());
        let environment = lookup(DEPLOYMENT_ENV).unwrap_or_else(|| "dev".into());
        let json_logs = lookup(LOG_FORMAT_ENV)
            .map(|v| !matches!(v.to_lowercase().as_str(), "text" | "pretty" | "plain"))
            .unwrap_or(true);

        Self {
            service_name,
            environment,
            json_logs,
        }
    }
}
