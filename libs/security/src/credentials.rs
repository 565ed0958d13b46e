use std::fmt;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{CryptoError, CryptoResult};

pub const KEY_LEN: usize = 32;

/// The platform hands out the key as 43 base64 characters with no padding and
/// arbitrary trailing bits, so decoding is lenient on both.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Immutable tenant binding used to authenticate and decrypt callbacks.
#[derive(Clone)]
pub struct Credentials {
    tenant_id: String,
    token: String,
    key: [u8; KEY_LEN],
}

impl Credentials {
    /// Builds credentials from the tenant id, shared token and base64 key.
    ///
    /// The key must decode to exactly 32 bytes; both the 43-character form and
    /// the padded 44-character form are accepted.
    pub fn new(
        tenant_id: impl Into<String>,
        token: impl Into<String>,
        encoding_key: &str,
    ) -> CryptoResult<Self> {
        let decoded = KEY_ENGINE
            .decode(encoding_key.trim())
            .map_err(|err| CryptoError::Base64(err.to_string()))?;
        let key: [u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(decoded.len()))?;
        Ok(Self {
            tenant_id: tenant_id.into(),
            token: token.into(),
            key,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// The protocol derives the CBC IV from the key instead of transmitting it.
    pub fn iv(&self) -> &[u8] {
        &self.key[..16]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("token", &"<redacted>")
            .field("key", &"<redacted>")
            .finish()
    }
}
