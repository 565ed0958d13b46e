use std::fmt;

use security::{CryptoError, Credentials};
use thiserror::Error;

use crate::normalizer::MessageIdMode;

pub const CORP_ID_ENV: &str = "WECOM_CORP_ID";
pub const AGENT_ID_ENV: &str = "WECOM_AGENT_ID";
pub const SECRET_ENV: &str = "WECOM_SECRET";
pub const TOKEN_ENV: &str = "WECOM_TOKEN";
pub const AES_KEY_ENV: &str = "WECOM_ENCODING_AES_KEY";
pub const MESSAGE_ID_MODE_ENV: &str = "WECOM_MESSAGE_ID_MODE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Credentials(#[from] CryptoError),
}

/// Application settings for one WeCom agent.
#[derive(Clone)]
pub struct WeComConfig {
    pub corp_id: String,
    pub agent_id: String,
    pub secret: String,
    pub token: String,
    pub encoding_aes_key: String,
    pub message_id_mode: MessageIdMode,
}

impl WeComConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use wecom_core::WeComConfig;
    ///
    /// let vars = HashMap::from([
    ///     ("WECOM_CORP_ID", "wwcorp"),
    ///     ("WECOM_AGENT_ID", "1000002"),
    ///     ("WECOM_SECRET", "s3cret"),
    ///     ("WECOM_TOKEN", "token"),
    ///     ("WECOM_ENCODING_AES_KEY", "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C"),
    /// ]);
    /// let cfg = WeComConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
    /// assert_eq!(cfg.corp_id, "wwcorp");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let message_id_mode = match lookup(MESSAGE_ID_MODE_ENV) {
            Some(raw) if !raw.trim().is_empty() => {
                MessageIdMode::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                    key: MESSAGE_ID_MODE_ENV,
                    reason: format!("expected `stable` or `timestamped`, got {raw:?}"),
                })?
            }
            _ => MessageIdMode::default(),
        };

        let cfg = Self {
            corp_id: required(CORP_ID_ENV)?,
            agent_id: required(AGENT_ID_ENV)?,
            secret: required(SECRET_ENV)?,
            token: required(TOKEN_ENV)?,
            encoding_aes_key: required(AES_KEY_ENV)?,
            message_id_mode,
        };
        cfg.credentials()?;
        Ok(cfg)
    }

    /// The immutable tuple the callback authenticator is built from.
    pub fn credentials(&self) -> Result<Credentials, CryptoError> {
        Credentials::new(&self.corp_id, &self.token, &self.encoding_aes_key)
    }
}

impl fmt::Debug for WeComConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeComConfig")
            .field("corp_id", &self.corp_id)
            .field("agent_id", &self.agent_id)
            .field("secret", &"<redacted>")
            .field("token", &"<redacted>")
            .field("encoding_aes_key", &"<redacted>")
            .field("message_id_mode", &self.message_id_mode)
            .finish()
    }
}
