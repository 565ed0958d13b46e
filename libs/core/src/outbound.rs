use std::sync::Arc;

use tracing::{info, warn};

use crate::platforms::wecom::{ApiError, AppMessageSender, SendResponse};

/// Substrings that mark a reply as markdown rather than plain text.
pub const MARKDOWN_INDICATORS: [&str; 8] = ["###", "**", "```", "- ", "1. ", "[", "](", "> "];

pub fn is_markdown_content(content: &str) -> bool {
    MARKDOWN_INDICATORS
        .iter()
        .any(|indicator| content.contains(indicator))
}

/// Sends replies to a user, picking the message type from the content.
#[derive(Clone)]
pub struct Outbound {
    sender: Arc<dyn AppMessageSender>,
}

impl Outbound {
    pub fn new(sender: Arc<dyn AppMessageSender>) -> Self {
        Self { sender }
    }

    /// Markdown-looking content goes out as `markdown`, everything else as `text`.
    /// A non-zero `errcode` is returned as [`ApiError::Platform`].
    pub async fn send(&self, user_id: &str, content: &str) -> Result<SendResponse, ApiError> {
        let markdown = is_markdown_content(content);
        let response = if markdown {
            self.sender.send_markdown(user_id, content).await?
        } else {
            self.sender.send_text(user_id, content).await?
        };
        let response = ensure_ok(response)?;
        info!(
            user_id,
            msgtype = if markdown { "markdown" } else { "text" },
            "wecom reply sent"
        );
        Ok(response)
    }

    pub async fn send_text_card(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        url: &str,
        button_text: Option<&str>,
    ) -> Result<SendResponse, ApiError> {
        let response = self
            .sender
            .send_text_card(user_id, title, description, url, button_text)
            .await?;
        ensure_ok(response)
    }
}

fn ensure_ok(response: SendResponse) -> Result<SendResponse, ApiError> {
    if response.is_ok() {
        return Ok(response);
    }
    warn!(
        errcode = response.errcode,
        errmsg = %response.errmsg,
        "wecom rejected outbound message"
    );
    Err(ApiError::Platform {
        errcode: response.errcode,
        errmsg: response.errmsg,
    })
}
