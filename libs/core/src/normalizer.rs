use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::types::{CanonicalKind, CanonicalMessage, EventType, MsgType, RawCallbackMessage};

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[^ ]+").expect("valid mention pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("create time is not a unix timestamp: {0:?}")]
    InvalidCreateTime(String),
}

/// How canonical message ids are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageIdMode {
    /// `wecom_{user}_{msg_id}`; redelivery of the same callback yields the same id.
    #[default]
    Stable,
    /// `wecom_{user}_{msg_id}_{now_millis}`; unique per processing attempt.
    Timestamped,
}

impl MessageIdMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stable" => Some(MessageIdMode::Stable),
            "timestamped" => Some(MessageIdMode::Timestamped),
            _ => None,
        }
    }
}

/// Filters and maps parsed callback records to [`CanonicalMessage`]s.
#[derive(Debug, Clone, Default)]
pub struct MessageNormalizer {
    id_mode: MessageIdMode,
}

impl MessageNormalizer {
    pub fn new(id_mode: MessageIdMode) -> Self {
        Self { id_mode }
    }

    pub fn id_mode(&self) -> MessageIdMode {
        self.id_mode
    }

    /// Records without a type or sender are dropped, as are events outside the
    /// forwarded set.
    pub fn is_valid(&self, raw: &RawCallbackMessage) -> bool {
        if raw.msg_type.is_empty() || raw.user_id.is_empty() {
            return false;
        }
        match MsgType::parse(&raw.msg_type) {
            MsgType::Event => EventType::parse(&raw.event).is_forwarded(),
            _ => true,
        }
    }

    pub fn normalize(&self, raw: RawCallbackMessage) -> Result<CanonicalMessage, NormalizeError> {
        let timestamp_millis = create_time_millis(&raw.create_time)?;
        let msg_type = MsgType::parse(&raw.msg_type);
        Ok(CanonicalMessage {
            id: self.message_id(&raw),
            kind: classify(&msg_type),
            text: Some(extract_text(&msg_type, &raw)),
            user_id: raw.user_id.clone(),
            chat_id: raw.chat_id.clone(),
            timestamp_millis,
            raw,
        })
    }

    pub fn message_id(&self, raw: &RawCallbackMessage) -> String {
        match self.id_mode {
            MessageIdMode::Stable if raw.msg_id.is_empty() => {
                let tag = if raw.event.is_empty() {
                    &raw.msg_type
                } else {
                    &raw.event
                };
                format!("wecom_{}_{}_{}", raw.user_id, tag, raw.create_time)
            }
            MessageIdMode::Stable => format!("wecom_{}_{}", raw.user_id, raw.msg_id),
            MessageIdMode::Timestamped => {
                let now_millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
                format!("wecom_{}_{}_{}", raw.user_id, raw.msg_id, now_millis)
            }
        }
    }
}

fn create_time_millis(raw: &str) -> Result<i64, NormalizeError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .ok_or_else(|| NormalizeError::InvalidCreateTime(raw.to_string()))
}

fn classify(msg_type: &MsgType) -> CanonicalKind {
    match msg_type {
        MsgType::Image => CanonicalKind::Image,
        MsgType::Voice => CanonicalKind::Voice,
        MsgType::File => CanonicalKind::File,
        _ => CanonicalKind::Text,
    }
}

fn extract_text(msg_type: &MsgType, raw: &RawCallbackMessage) -> String {
    match msg_type {
        MsgType::Text => match raw.chat_id.as_deref() {
            Some(chat) if !chat.is_empty() && raw.content.contains('@') => {
                strip_mention(&raw.content)
            }
            _ => raw.content.clone(),
        },
        MsgType::Event => describe_event(raw),
        other => format!("[{}] {}", other.as_str(), raw.content),
    }
}

/// Drops the first `@name` token of a group message.
fn strip_mention(content: &str) -> String {
    MENTION.replacen(content, 1, "").trim().to_string()
}

fn describe_event(raw: &RawCallbackMessage) -> String {
    match EventType::parse(&raw.event) {
        EventType::Subscribe => "[event] user subscribed".to_string(),
        EventType::Unsubscribe => "[event] user unsubscribed".to_string(),
        EventType::EnterAgent => "[event] user entered the app".to_string(),
        EventType::Click => format!("[event] user clicked: {}", raw.content),
        EventType::View => format!("[event] user opened link: {}", raw.content),
        other => format!("[event] {}", other.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(msg_type: &str, content: &str) -> RawCallbackMessage {
        RawCallbackMessage {
            msg_type: msg_type.into(),
            user_id: "u1".into(),
            content: content.into(),
            msg_id: "123".into(),
            create_time: "1700000000".into(),
            ..Default::default()
        }
    }

    fn event(name: &str) -> RawCallbackMessage {
        RawCallbackMessage {
            msg_type: "event".into(),
            event: name.into(),
            user_id: "u1".into(),
            create_time: "1700000000".into(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_missing_type_or_user() {
        let n = MessageNormalizer::default();
        assert!(!n.is_valid(&record("", "hi")));
        let mut anonymous = record("text", "hi");
        anonymous.user_id.clear();
        assert!(!n.is_valid(&anonymous));
        assert!(n.is_valid(&record("text", "hi")));
    }

    #[test]
    fn event_whitelist() {
        let n = MessageNormalizer::default();
        assert!(n.is_valid(&event("subscribe")));
        assert!(n.is_valid(&event("view")));
        assert!(!n.is_valid(&event("scancode_push")));
        assert!(!n.is_valid(&event("")));
    }

    #[test]
    fn unknown_message_types_pass_the_filter() {
        assert!(MessageNormalizer::default().is_valid(&record("location", "")));
    }

    #[test]
    fn normalizes_plain_text() {
        let msg = MessageNormalizer::default()
            .normalize(record("text", "hi"))
            .unwrap();
        assert_eq!(msg.kind, CanonicalKind::Text);
        assert_eq!(msg.text.as_deref(), Some("hi"));
        assert_eq!(msg.user_id, "u1");
        assert_eq!(msg.timestamp_millis, 1_700_000_000_000);
        assert_eq!(msg.id, "wecom_u1_123");
        assert_eq!(msg.raw.content, "hi");
    }

    #[test]
    fn strips_group_mention() {
        let mut raw = record("text", "@Bob hello team");
        raw.chat_id = Some("c1".into());
        let msg = MessageNormalizer::default().normalize(raw).unwrap();
        assert_eq!(msg.text.as_deref(), Some("hello team"));
        assert_eq!(msg.chat_id.as_deref(), Some("c1"));
    }

    #[test]
    fn keeps_mentions_outside_groups() {
        let msg = MessageNormalizer::default()
            .normalize(record("text", "@Bob hello"))
            .unwrap();
        assert_eq!(msg.text.as_deref(), Some("@Bob hello"));
    }

    #[test]
    fn media_types_keep_their_kind() {
        let n = MessageNormalizer::default();
        let cases = [
            ("image", CanonicalKind::Image),
            ("voice", CanonicalKind::Voice),
            ("file", CanonicalKind::File),
            ("video", CanonicalKind::Text),
        ];
        for (msg_type, kind) in cases {
            let msg = n.normalize(record(msg_type, "media-1")).unwrap();
            assert_eq!(msg.kind, kind);
            assert_eq!(msg.text, Some(format!("[{msg_type}] media-1")));
        }
    }

    #[test]
    fn events_render_descriptions() {
        let n = MessageNormalizer::default();
        let cases = [
            ("subscribe", "", "[event] user subscribed"),
            ("unsubscribe", "", "[event] user unsubscribed"),
            ("enter_agent", "", "[event] user entered the app"),
            ("click", "MENU_1", "[event] user clicked: MENU_1"),
            (
                "view",
                "https://example.com",
                "[event] user opened link: https://example.com",
            ),
            ("location_select", "", "[event] location_select"),
        ];
        for (name, content, expected) in cases {
            let mut raw = event(name);
            raw.content = content.into();
            let msg = n.normalize(raw).unwrap();
            assert_eq!(msg.kind, CanonicalKind::Text);
            assert_eq!(msg.text.as_deref(), Some(expected));
        }
    }

    #[test]
    fn rejects_non_numeric_create_time() {
        let mut raw = record("text", "hi");
        raw.create_time = "yesterday".into();
        let err = MessageNormalizer::default().normalize(raw).unwrap_err();
        assert_eq!(err, NormalizeError::InvalidCreateTime("yesterday".into()));
    }

    #[test]
    fn stable_ids_are_idempotent() {
        let n = MessageNormalizer::new(MessageIdMode::Stable);
        let raw = record("text", "hi");
        assert_eq!(n.message_id(&raw), n.message_id(&raw));
        assert_eq!(
            n.message_id(&event("subscribe")),
            "wecom_u1_subscribe_1700000000"
        );
    }

    #[test]
    fn timestamped_ids_carry_processing_time() {
        let n = MessageNormalizer::new(MessageIdMode::Timestamped);
        let id = n.message_id(&record("text", "hi"));
        let suffix = id.strip_prefix("wecom_u1_123_").expect("prefix");
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[test]
    fn parses_id_mode() {
        assert_eq!(MessageIdMode::parse("Stable"), Some(MessageIdMode::Stable));
        assert_eq!(
            MessageIdMode::parse("timestamped"),
            Some(MessageIdMode::Timestamped)
        );
        assert_eq!(MessageIdMode::parse("random"), None);
    }
}
