use thiserror::Error;

/// Failures raised while authenticating or decrypting a callback.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("callback signature mismatch")]
    SignatureMismatch,
    #[error("tenant id mismatch: frame carries {found:?}")]
    TenantMismatch { found: String },
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("invalid symmetric key: expected 32 bytes, got {0}")]
    InvalidKey(usize),
    #[error("ciphertext rejected: {0}")]
    Cipher(&'static str),
    #[error("malformed frame: {0}")]
    Frame(&'static str),
    #[error("message is not valid utf-8")]
    Utf8,
}

/// Coarse classification used by transports to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    Authentication,
    Decryption,
    Configuration,
}

impl CryptoError {
    pub fn kind(&self) -> CryptoErrorKind {
        match self {
            CryptoError::SignatureMismatch | CryptoError::TenantMismatch { .. } => {
                CryptoErrorKind::Authentication
            }
            CryptoError::InvalidKey(_) => CryptoErrorKind::Configuration,
            CryptoError::Base64(_)
            | CryptoError::Cipher(_)
            | CryptoError::Frame(_)
            | CryptoError::Utf8 => CryptoErrorKind::Decryption,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.kind() == CryptoErrorKind::Authentication
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
