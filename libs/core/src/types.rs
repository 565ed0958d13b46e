use serde::{Deserialize, Serialize};

/// Message categories reported in the callback `MsgType` field.
///
/// ```
/// use wecom_core::MsgType;
///
/// assert_eq!(MsgType::parse("image"), MsgType::Image);
/// assert_eq!(MsgType::parse("location").as_str(), "location");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    Text,
    Image,
    Voice,
    Video,
    File,
    TextCard,
    News,
    Markdown,
    MiniprogramNotice,
    Event,
    Other(String),
}

impl MsgType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "text" => MsgType::Text,
            "image" => MsgType::Image,
            "voice" => MsgType::Voice,
            "video" => MsgType::Video,
            "file" => MsgType::File,
            "textcard" => MsgType::TextCard,
            "news" => MsgType::News,
            "markdown" => MsgType::Markdown,
            "miniprogram_notice" => MsgType::MiniprogramNotice,
            "event" => MsgType::Event,
            other => MsgType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MsgType::Text => "text",
            MsgType::Image => "image",
            MsgType::Voice => "voice",
            MsgType::Video => "video",
            MsgType::File => "file",
            MsgType::TextCard => "textcard",
            MsgType::News => "news",
            MsgType::Markdown => "markdown",
            MsgType::MiniprogramNotice => "miniprogram_notice",
            MsgType::Event => "event",
            MsgType::Other(raw) => raw,
        }
    }
}

/// Event subtypes reported in the callback `Event` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Subscribe,
    Unsubscribe,
    EnterAgent,
    LocationSelect,
    PicPhotoOrAlbum,
    PicWeixin,
    PicSysphoto,
    Click,
    View,
    ScancodePush,
    ScancodeWaitmsg,
    TemplateSendJobFinish,
    Other(String),
}

impl EventType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "subscribe" => EventType::Subscribe,
            "unsubscribe" => EventType::Unsubscribe,
            "enter_agent" => EventType::EnterAgent,
            "location_select" => EventType::LocationSelect,
            "pic_photo_or_album" => EventType::PicPhotoOrAlbum,
            "pic_weixin" => EventType::PicWeixin,
            "pic_sysphoto" => EventType::PicSysphoto,
            "click" => EventType::Click,
            "view" => EventType::View,
            "scancode_push" => EventType::ScancodePush,
            "scancode_waitmsg" => EventType::ScancodeWaitmsg,
            "template_send_job_finish" => EventType::TemplateSendJobFinish,
            other => EventType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Subscribe => "subscribe",
            EventType::Unsubscribe => "unsubscribe",
            EventType::EnterAgent => "enter_agent",
            EventType::LocationSelect => "location_select",
            EventType::PicPhotoOrAlbum => "pic_photo_or_album",
            EventType::PicWeixin => "pic_weixin",
            EventType::PicSysphoto => "pic_sysphoto",
            EventType::Click => "click",
            EventType::View => "view",
            EventType::ScancodePush => "scancode_push",
            EventType::ScancodeWaitmsg => "scancode_waitmsg",
            EventType::TemplateSendJobFinish => "template_send_job_finish",
            EventType::Other(raw) => raw,
        }
    }

    /// Events forwarded downstream; everything else is dropped as noise.
    pub fn is_forwarded(&self) -> bool {
        matches!(
            self,
            EventType::Subscribe
                | EventType::Unsubscribe
                | EventType::EnterAgent
                | EventType::Click
                | EventType::View
        )
    }
}

/// Fields extracted from a decrypted callback payload.
///
/// Absent fields are empty strings; `chat_id` is only set for group messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCallbackMessage {
    pub msg_type: String,
    pub event: String,
    pub agent_id: String,
    pub user_id: String,
    pub content: String,
    pub msg_id: String,
    pub create_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalKind {
    Text,
    Image,
    File,
    Voice,
}

impl CanonicalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalKind::Text => "text",
            CanonicalKind::Image => "image",
            CanonicalKind::File => "file",
            CanonicalKind::Voice => "voice",
        }
    }
}

/// Platform-agnostic message handed to the downstream sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CanonicalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub timestamp_millis: i64,
    pub raw: RawCallbackMessage,
}
