use anyhow::{Context, bail};
use async_trait::async_trait;
use tracing::{debug, info};
use wecom_core::{CanonicalMessage, MessageSink};

/// POSTs each canonical message as JSON to a downstream endpoint.
pub struct ForwardSink {
    http: reqwest::Client,
    url: String,
}

impl ForwardSink {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MessageSink for ForwardSink {
    async fn deliver(&self, message: CanonicalMessage) -> anyhow::Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .with_context(|| format!("forwarding {} failed", message.id))?;
        let status = response.status();
        if !status.is_success() {
            bail!("forward target returned {status} for {}", message.id);
        }
        debug!(id = %message.id, %status, "canonical message forwarded");
        Ok(())
    }
}

/// Fallback sink when no forward target is configured.
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn deliver(&self, message: CanonicalMessage) -> anyhow::Result<()> {
        info!(
            id = %message.id,
            kind = message.kind.as_str(),
            user_id = %message.user_id,
            chat_id = message.chat_id.as_deref().unwrap_or_default(),
            "canonical message received"
        );
        debug!(text = message.text.as_deref().unwrap_or_default(), "message text");
        Ok(())
    }
}
