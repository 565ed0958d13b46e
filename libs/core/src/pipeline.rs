use std::sync::Arc;

use async_trait::async_trait;
use security::{CallbackAuthenticator, CallbackEnvelope, CryptoError};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, WeComConfig};
use crate::normalizer::{MessageNormalizer, NormalizeError};
use crate::parser::{extract_encrypt, parse_callback};
use crate::types::{CanonicalMessage, RawCallbackMessage};

/// Downstream consumer of canonical messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: CanonicalMessage) -> anyhow::Result<()>;
}

pub type SharedMessageSink = Arc<dyn MessageSink>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("message handler failed: {0:#}")]
    Handler(anyhow::Error),
}

/// Result of a callback that passed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Dispatched(CanonicalMessage),
    /// Filtered out as noise; nothing was handed to the sink.
    Dropped(RawCallbackMessage),
}

/// verify -> decrypt -> parse -> filter -> normalize -> sink.
///
/// Holds no per-callback state, so one instance can serve concurrent requests.
#[derive(Clone)]
pub struct CallbackPipeline {
    authenticator: CallbackAuthenticator,
    normalizer: MessageNormalizer,
    sink: Option<SharedMessageSink>,
}

impl CallbackPipeline {
    pub fn new(authenticator: CallbackAuthenticator, normalizer: MessageNormalizer) -> Self {
        Self {
            authenticator,
            normalizer,
            sink: None,
        }
    }

    pub fn from_config(config: &WeComConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            CallbackAuthenticator::new(config.credentials()?),
            MessageNormalizer::new(config.message_id_mode),
        ))
    }

    /// Registers the sink every dispatched message is handed to.
    pub fn with_sink(mut self, sink: SharedMessageSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn authenticator(&self) -> &CallbackAuthenticator {
        &self.authenticator
    }

    pub fn normalizer(&self) -> &MessageNormalizer {
        &self.normalizer
    }

    /// URL-ownership handshake; returns the echo string to answer with.
    pub fn verify_url(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        echostr: &str,
    ) -> Result<String, PipelineError> {
        Ok(self
            .authenticator
            .verify_and_recover_echo(signature, timestamp, nonce, echostr)?)
    }

    /// Authenticates, decrypts and dispatches one message callback.
    ///
    /// The body may be the platform's `<xml><Encrypt>..</Encrypt></xml>`
    /// document or the bare ciphertext.
    pub async fn handle_callback(
        &self,
        envelope: &CallbackEnvelope,
    ) -> Result<CallbackOutcome, PipelineError> {
        let ciphertext =
            extract_encrypt(&envelope.body).unwrap_or_else(|| envelope.body.trim().to_string());
        let xml = self.authenticator.verify_and_decrypt_message(
            &envelope.signature,
            &envelope.timestamp,
            &envelope.nonce,
            &ciphertext,
        )?;
        let raw = parse_callback(&xml);
        self.process_message(raw).await
    }

    /// Runs an already-parsed record through the filter, normalizer and sink.
    pub async fn process_message(
        &self,
        raw: RawCallbackMessage,
    ) -> Result<CallbackOutcome, PipelineError> {
        if !self.normalizer.is_valid(&raw) {
            debug!(
                msg_type = %raw.msg_type,
                event = %raw.event,
                "callback dropped by filter"
            );
            return Ok(CallbackOutcome::Dropped(raw));
        }

        let message = self.normalizer.normalize(raw)?;
        if let Some(sink) = &self.sink {
            sink.deliver(message.clone())
                .await
                .map_err(PipelineError::Handler)?;
        }
        info!(
            id = %message.id,
            kind = message.kind.as_str(),
            user_id = %message.user_id,
            "callback dispatched"
        );
        Ok(CallbackOutcome::Dispatched(message))
    }

    /// Encrypts and signs a passive reply.
    pub fn encrypt_reply(&self, plaintext: &str) -> Result<String, PipelineError> {
        Ok(self.authenticator.encrypt_reply(plaintext)?)
    }
}
