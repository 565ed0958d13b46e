//! WeCom messaging core.
//!
//! Turns authenticated callbacks into canonical messages: field extraction from
//! the decrypted XML, noise filtering, normalization and dispatch to a
//! [`MessageSink`]. The outbound side wraps the WeCom application API behind
//! [`Outbound`].
//!
//! ```
//! use wecom_core::{MessageNormalizer, parse_callback};
//!
//! let raw = parse_callback(
//!     "<xml><MsgType><![CDATA[text]]></MsgType><FromUserName><![CDATA[u1]]></FromUserName>\
//!      <Content><![CDATA[hi]]></Content><CreateTime>1700000000</CreateTime></xml>",
//! );
//! let normalizer = MessageNormalizer::default();
//! assert!(normalizer.is_valid(&raw));
//! let msg = normalizer.normalize(raw).unwrap();
//! assert_eq!(msg.timestamp_millis, 1_700_000_000_000);
//! ```
pub mod config;
pub mod normalizer;
pub mod outbound;
pub mod parser;
pub mod pipeline;
pub mod platforms;
pub mod types;

pub use config::{ConfigError, WeComConfig};
pub use normalizer::{MessageIdMode, MessageNormalizer, NormalizeError};
pub use outbound::{Outbound, is_markdown_content};
pub use parser::{extract_encrypt, parse_callback};
pub use pipeline::{
    CallbackOutcome, CallbackPipeline, MessageSink, PipelineError, SharedMessageSink,
};
pub use platforms::wecom::{ApiError, AppMessageSender, MediaKind, SendResponse, WeComApi};
pub use types::*;
