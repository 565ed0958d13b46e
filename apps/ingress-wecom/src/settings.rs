use std::net::SocketAddr;

use anyhow::{Context, Result};
use wecom_core::platforms::wecom::DEFAULT_API_BASE;

pub const BIND_ENV: &str = "BIND";
pub const API_BASE_ENV: &str = "WECOM_API_BASE";
pub const FORWARD_URL_ENV: &str = "WECOM_FORWARD_URL";
const DEFAULT_BIND: &str = "0.0.0.0:8090";

/// Process-level settings; the agent credentials live in `WeComConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressSettings {
    pub bind: SocketAddr,
    pub api_base: String,
    pub forward_url: Option<String>,
}

impl IngressSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_bind = non_empty(BIND_ENV).unwrap_or_else(|| DEFAULT_BIND.into());
        let bind = raw_bind
            .parse()
            .with_context(|| format!("invalid {BIND_ENV} address {raw_bind:?}"))?;

        Ok(Self {
            bind,
            api_base: non_empty(API_BASE_ENV).unwrap_or_else(|| DEFAULT_API_BASE.into()),
            forward_url: non_empty(FORWARD_URL_ENV),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<IngressSettings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IngressSettings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.bind, "0.0.0.0:8090".parse().unwrap());
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.forward_url, None);
    }

    #[test]
    fn overrides() {
        let settings = load(&[
            (BIND_ENV, "127.0.0.1:9000"),
            (API_BASE_ENV, "mock://wecom"),
            (FORWARD_URL_ENV, "http://flows.local/in"),
        ])
        .unwrap();
        assert_eq!(settings.bind.port(), 9000);
        assert_eq!(settings.api_base, "mock://wecom");
        assert_eq!(settings.forward_url.as_deref(), Some("http://flows.local/in"));
    }

    #[test]
    fn rejects_bad_bind() {
        let err = load(&[(BIND_ENV, "nowhere")]).unwrap_err();
        assert!(err.to_string().contains("BIND"));
    }
}
