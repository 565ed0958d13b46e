use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::types::{
    AccessTokenResponse, ChatCreateResponse, MediaKind, MediaUploadResponse, SendResponse,
    UserInfo, UserInfoResponse,
};
use crate::config::WeComConfig;

pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com";
pub const DEFAULT_BUTTON_TEXT: &str = "Details";
const DEFAULT_TOKEN_TTL_SECS: u64 = 7200;
const TOKEN_EARLY_EXPIRY: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("platform error {errcode}: {errmsg}")]
    Platform { errcode: i64, errmsg: String },
    #[error("response missing {0}")]
    Missing(&'static str),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

fn check(errcode: i64, errmsg: &str) -> Result<(), ApiError> {
    if errcode == 0 {
        Ok(())
    } else {
        Err(ApiError::Platform {
            errcode,
            errmsg: errmsg.to_string(),
        })
    }
}

/// Message-sending surface used by the outbound orchestrator.
#[async_trait]
pub trait AppMessageSender: Send + Sync {
    async fn send_text(&self, user_id: &str, content: &str) -> Result<SendResponse, ApiError>;

    async fn send_markdown(&self, user_id: &str, content: &str)
    -> Result<SendResponse, ApiError>;

    async fn send_text_card(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        url: &str,
        button_text: Option<&str>,
    ) -> Result<SendResponse, ApiError>;
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// REST client for the WeCom application API.
///
/// The access token is cached in memory and refreshed five minutes before the
/// platform-reported expiry. An `api_base` starting with `mock://` answers
/// locally without network access.
pub struct WeComApi {
    http: reqwest::Client,
    api_base: String,
    corp_id: String,
    secret: String,
    agent_id: String,
    token: Mutex<Option<CachedToken>>,
    mock_fetches: AtomicU64,
}

impl WeComApi {
    pub fn new(http: reqwest::Client, config: &WeComConfig, api_base: Option<String>) -> Self {
        Self {
            http,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.into()),
            corp_id: config.corp_id.clone(),
            secret: config.secret.clone(),
            agent_id: config.agent_id.clone(),
            token: Mutex::new(None),
            mock_fetches: AtomicU64::new(0),
        }
    }

    fn is_mock(&self) -> bool {
        self.api_base.starts_with("mock://")
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Agent ids are numeric on the wire; anything else is sent verbatim.
    fn agent_id_value(&self) -> Value {
        self.agent_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(self.agent_id.clone()))
    }

    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let (value, expires_in) = self.fetch_token().await?;
        let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_EARLY_EXPIRY);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!(expires_in, "wecom access token refreshed");
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<(String, u64), ApiError> {
        if self.is_mock() {
            let n = self.mock_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok((format!("mock-token-{n}"), DEFAULT_TOKEN_TTL_SECS));
        }

        let response = self
            .http
            .get(self.build_url("cgi-bin/gettoken"))
            .query(&[
                ("corpid", self.corp_id.as_str()),
                ("corpsecret", self.secret.as_str()),
            ])
            .send()
            .await?;
        let body: AccessTokenResponse = decode(response).await?;
        check(body.errcode, &body.errmsg)?;
        let token = body.access_token.ok_or(ApiError::Missing("access_token"))?;
        Ok((token, body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)))
    }

    pub async fn send_text(&self, user_id: &str, content: &str) -> Result<SendResponse, ApiError> {
        self.send_app_message(json!({
            "touser": user_id,
            "msgtype": "text",
            "agentid": self.agent_id_value(),
            "text": { "content": content },
        }))
        .await
    }

    pub async fn send_markdown(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<SendResponse, ApiError> {
        self.send_app_message(json!({
            "touser": user_id,
            "msgtype": "markdown",
            "agentid": self.agent_id_value(),
            "markdown": { "content": content },
        }))
        .await
    }

    pub async fn send_text_card(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        url: &str,
        button_text: Option<&str>,
    ) -> Result<SendResponse, ApiError> {
        self.send_app_message(json!({
            "touser": user_id,
            "msgtype": "textcard",
            "agentid": self.agent_id_value(),
            "textcard": {
                "title": title,
                "description": description,
                "url": url,
                "btntxt": button_text.unwrap_or(DEFAULT_BUTTON_TEXT),
            },
        }))
        .await
    }

    pub async fn send_image(&self, user_id: &str, media_id: &str) -> Result<SendResponse, ApiError> {
        self.send_app_message(json!({
            "touser": user_id,
            "msgtype": "image",
            "agentid": self.agent_id_value(),
            "image": { "media_id": media_id },
        }))
        .await
    }

    async fn send_app_message(&self, payload: Value) -> Result<SendResponse, ApiError> {
        let token = self.access_token().await?;
        if self.is_mock() {
            let to = payload["touser"].as_str().unwrap_or_default();
            return Ok(SendResponse {
                errcode: 0,
                errmsg: "ok".into(),
                msgid: Some(format!("mock:{to}")),
                ..Default::default()
            });
        }
        self.post_json("cgi-bin/message/send", &token, &payload)
            .await
    }

    /// Uploads temporary media and returns its `media_id`.
    pub async fn upload_media(
        &self,
        kind: MediaKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ApiError> {
        let token = self.access_token().await?;
        if self.is_mock() {
            return Ok(format!("mock-media-{}-{file_name}", kind.as_str()));
        }

        let form = Form::new().part("media", Part::bytes(bytes).file_name(file_name.to_string()));
        let response = self
            .http
            .post(self.build_url("cgi-bin/media/upload"))
            .query(&[("access_token", token.as_str()), ("type", kind.as_str())])
            .multipart(form)
            .send()
            .await?;
        let body: MediaUploadResponse = decode(response).await?;
        check(body.errcode, &body.errmsg)?;
        body.media_id.ok_or(ApiError::Missing("media_id"))
    }

    pub async fn get_user_info(&self, user_id: &str) -> Result<UserInfo, ApiError> {
        let token = self.access_token().await?;
        if self.is_mock() {
            return Ok(UserInfo {
                name: user_id.to_string(),
                avatar: None,
            });
        }

        let response = self
            .http
            .get(self.build_url("cgi-bin/user/get"))
            .query(&[("access_token", token.as_str()), ("userid", user_id)])
            .send()
            .await?;
        let body: UserInfoResponse = decode(response).await?;
        check(body.errcode, &body.errmsg)?;
        Ok(UserInfo {
            name: body.name,
            avatar: body.avatar,
        })
    }

    /// Creates a group chat and returns its `chatid`.
    pub async fn create_chat(
        &self,
        name: &str,
        owner: &str,
        user_ids: &[String],
    ) -> Result<String, ApiError> {
        let token = self.access_token().await?;
        if self.is_mock() {
            return Ok(format!("mock-chat-{name}"));
        }

        let payload = json!({
            "name": name,
            "owner": owner,
            "userlist": user_ids,
        });
        let body: ChatCreateResponse = self
            .post_json("cgi-bin/appchat/create", &token, &payload)
            .await?;
        check(body.errcode, &body.errmsg)?;
        body.chatid.ok_or(ApiError::Missing("chatid"))
    }

    pub async fn send_chat_message(
        &self,
        chat_id: &str,
        content: &str,
    ) -> Result<SendResponse, ApiError> {
        let token = self.access_token().await?;
        if self.is_mock() {
            return Ok(SendResponse {
                errcode: 0,
                errmsg: "ok".into(),
                ..Default::default()
            });
        }

        let payload = json!({
            "chatid": chat_id,
            "msgtype": "text",
            "text": { "content": content },
        });
        self.post_json("cgi-bin/appchat/send", &token, &payload)
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        payload: &Value,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(self.build_url(path))
            .query(&[("access_token", token)])
            .json(payload)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status { status, body });
    }
    serde_json::from_str(&body).map_err(|err| ApiError::Decode(err.to_string()))
}

#[async_trait]
impl AppMessageSender for WeComApi {
    async fn send_text(&self, user_id: &str, content: &str) -> Result<SendResponse, ApiError> {
        WeComApi::send_text(self, user_id, content).await
    }

    async fn send_markdown(
        &self,
        user_id: &str,
        content: &str,
    ) -> Result<SendResponse, ApiError> {
        WeComApi::send_markdown(self, user_id, content).await
    }

    async fn send_text_card(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        url: &str,
        button_text: Option<&str>,
    ) -> Result<SendResponse, ApiError> {
        WeComApi::send_text_card(self, user_id, title, description, url, button_text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::MessageIdMode;

    fn config(agent_id: &str) -> WeComConfig {
        WeComConfig {
            corp_id: "wwcorp".into(),
            agent_id: agent_id.into(),
            secret: "secret".into(),
            token: "token".into(),
            encoding_aes_key: "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C".into(),
            message_id_mode: MessageIdMode::Stable,
        }
    }

    fn mock_api() -> WeComApi {
        WeComApi::new(
            reqwest::Client::new(),
            &config("1000002"),
            Some("mock://wecom".into()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn caches_token_until_early_expiry() {
        let api = mock_api();
        let first = api.access_token().await.unwrap();
        assert_eq!(first, "mock-token-1");
        assert_eq!(api.access_token().await.unwrap(), "mock-token-1");

        tokio::time::advance(Duration::from_secs(DEFAULT_TOKEN_TTL_SECS - 301)).await;
        assert_eq!(api.access_token().await.unwrap(), "mock-token-1");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(api.access_token().await.unwrap(), "mock-token-2");
    }

    #[tokio::test]
    async fn mock_send_reports_recipient() {
        let api = mock_api();
        let res = api.send_text("u1", "hello").await.unwrap();
        assert!(res.is_ok());
        assert_eq!(res.msgid.as_deref(), Some("mock:u1"));

        let card = api
            .send_text_card("u2", "Title", "Body", "https://example.com", None)
            .await
            .unwrap();
        assert_eq!(card.msgid.as_deref(), Some("mock:u2"));
    }

    #[tokio::test]
    async fn mock_auxiliary_calls() {
        let api = mock_api();
        assert_eq!(
            api.upload_media(MediaKind::Image, "a.png", vec![1, 2, 3])
                .await
                .unwrap(),
            "mock-media-image-a.png"
        );
        assert_eq!(api.get_user_info("u1").await.unwrap().name, "u1");
        assert_eq!(
            api.create_chat("ops", "u1", &["u1".into(), "u2".into()])
                .await
                .unwrap(),
            "mock-chat-ops"
        );
        assert!(api.send_chat_message("c1", "hi").await.unwrap().is_ok());
    }

    #[test]
    fn urls_join_cleanly() {
        let api = WeComApi::new(
            reqwest::Client::new(),
            &config("1"),
            Some("https://qyapi.example.com/".into()),
        );
        assert_eq!(
            api.build_url("/cgi-bin/message/send"),
            "https://qyapi.example.com/cgi-bin/message/send"
        );
    }

    #[test]
    fn agent_id_is_numeric_when_possible() {
        let api = mock_api();
        assert_eq!(api.agent_id_value(), json!(1000002));
        let named = WeComApi::new(reqwest::Client::new(), &config("bot"), None);
        assert_eq!(named.agent_id_value(), json!("bot"));
    }

    #[test]
    fn platform_errors_carry_code() {
        let err = check(40014, "invalid access_token").unwrap_err();
        assert_eq!(err.to_string(), "platform error 40014: invalid access_token");
        assert!(check(0, "ok").is_ok());
    }
}
