//! WeCom application API: access tokens, app messages, media and group chats.

pub mod api;
pub mod types;

pub use api::{ApiError, AppMessageSender, DEFAULT_API_BASE, DEFAULT_BUTTON_TEXT, WeComApi};
pub use types::{MediaKind, SendResponse, UserInfo};
