//! Callback authentication for the WeCom messaging adapter.
//!
//! Inbound callbacks carry a SHA-1 signature over the sorted
//! `(token, timestamp, nonce, payload)` tuple and an AES-256-CBC encrypted
//! frame bound to the tenant id. [`CallbackAuthenticator`] gates decryption on
//! the signature and rejects frames sealed for another tenant.
pub mod authenticator;
pub mod cipher;
pub mod credentials;
pub mod error;
pub mod signature;

pub use authenticator::{CallbackAuthenticator, CallbackEnvelope, ReplyEnvelope};
pub use cipher::{DecryptedFrame, EnvelopeCipher, decode_frame, encode_frame};
pub use credentials::Credentials;
pub use error::{CryptoError, CryptoErrorKind, CryptoResult};
pub use signature::{sign, verify};
