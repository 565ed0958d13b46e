//! Targeted field extraction from decrypted callback XML.
//!
//! Callback payloads are flat `<xml>` documents whose schema varies by message
//! type, so each known tag is matched on its own instead of building a DOM.
//! Unknown tags are ignored and missing tags become empty strings.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::RawCallbackMessage;

struct TagPattern {
    cdata: Regex,
    plain: Regex,
}

impl TagPattern {
    fn new(tag: &str) -> Self {
        let cdata = Regex::new(&format!(r"(?s)<{tag}><!\[CDATA\[(.*?)\]\]></{tag}>"))
            .expect("valid cdata pattern");
        let plain = Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).expect("valid plain pattern");
        Self { cdata, plain }
    }

    /// CDATA-wrapped text wins over a plain text node.
    fn extract<'a>(&self, xml: &'a str) -> Option<&'a str> {
        self.cdata
            .captures(xml)
            .or_else(|| self.plain.captures(xml))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn value(&self, xml: &str) -> String {
        self.extract(xml).unwrap_or_default().to_string()
    }
}

struct CallbackFields {
    msg_type: TagPattern,
    event: TagPattern,
    agent_id: TagPattern,
    from_user: TagPattern,
    content: TagPattern,
    msg_id: TagPattern,
    create_time: TagPattern,
    chat_id: TagPattern,
}

static FIELDS: Lazy<CallbackFields> = Lazy::new(|| CallbackFields {
    msg_type: TagPattern::new("MsgType"),
    event: TagPattern::new("Event"),
    agent_id: TagPattern::new("AgentID"),
    from_user: TagPattern::new("FromUserName"),
    content: TagPattern::new("Content"),
    msg_id: TagPattern::new("MsgId"),
    create_time: TagPattern::new("CreateTime"),
    chat_id: TagPattern::new("ChatId"),
});

static ENCRYPT: Lazy<TagPattern> = Lazy::new(|| TagPattern::new("Encrypt"));

/// Parses a decrypted callback payload. Never fails.
///
/// ```
/// let raw = wecom_core::parse_callback(
///     "<xml><MsgType><![CDATA[text]]></MsgType><MsgId>7</MsgId></xml>",
/// );
/// assert_eq!(raw.msg_type, "text");
/// assert_eq!(raw.msg_id, "7");
/// assert_eq!(raw.event, "");
/// ```
pub fn parse_callback(xml: &str) -> RawCallbackMessage {
    let fields = &*FIELDS;
    RawCallbackMessage {
        msg_type: fields.msg_type.value(xml),
        event: fields.event.value(xml),
        agent_id: fields.agent_id.value(xml),
        user_id: fields.from_user.value(xml),
        content: fields.content.value(xml),
        msg_id: fields.msg_id.value(xml),
        create_time: fields.create_time.value(xml),
        chat_id: fields
            .chat_id
            .extract(xml)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    }
}

/// Pulls the ciphertext out of a callback request body.
///
/// Returns `None` when the body has no `<Encrypt>` element.
pub fn extract_encrypt(body: &str) -> Option<String> {
    ENCRYPT
        .extract(body)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
