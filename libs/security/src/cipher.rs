//! AES-256-CBC envelope used by callback payloads and encrypted replies.
//!
//! Plaintext frame layout:
//! `random(16) | msg_len(4, big-endian) | msg(msg_len) | tenant_id`

use aes::Aes256;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::credentials::Credentials;
use crate::error::{CryptoError, CryptoResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const PADDING_LEN: usize = 16;
const LEN_PREFIX: usize = 4;
const BLOCK_LEN: usize = 16;
/// The platform pads frames to 32 bytes, so a trailing pad byte may exceed
/// the AES block size.
const MAX_PAD: usize = 32;

/// A decoded plaintext frame. Single use; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFrame {
    pub padding: [u8; PADDING_LEN],
    pub message: String,
    pub tenant_id: String,
}

/// Packs `padding | len(message) | message | tenant_id`.
///
/// The length prefix counts bytes, not characters.
pub fn encode_frame(padding: &[u8; PADDING_LEN], message: &str, tenant_id: &str) -> Vec<u8> {
    let msg = message.as_bytes();
    let mut frame = Vec::with_capacity(PADDING_LEN + LEN_PREFIX + msg.len() + tenant_id.len());
    frame.extend_from_slice(padding);
    frame.extend_from_slice(&(msg.len() as u32).to_be_bytes());
    frame.extend_from_slice(msg);
    frame.extend_from_slice(tenant_id.as_bytes());
    frame
}

/// Splits a plaintext frame on byte boundaries.
pub fn decode_frame(plaintext: &[u8]) -> CryptoResult<DecryptedFrame> {
    if plaintext.len() < PADDING_LEN + LEN_PREFIX {
        return Err(CryptoError::Frame("frame shorter than header"));
    }
    let (head, rest) = plaintext.split_at(PADDING_LEN);
    let (len_bytes, body) = rest.split_at(LEN_PREFIX);

    let mut padding = [0u8; PADDING_LEN];
    padding.copy_from_slice(head);
    let declared = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    let declared = declared as usize;
    if declared > body.len() {
        return Err(CryptoError::Frame("declared message length exceeds frame"));
    }

    let (message, tenant) = body.split_at(declared);
    let message = String::from_utf8(message.to_vec()).map_err(|_| CryptoError::Utf8)?;
    let tenant_id = String::from_utf8_lossy(tenant).into_owned();
    Ok(DecryptedFrame {
        padding,
        message,
        tenant_id,
    })
}

/// Drops PKCS#7-style padding of up to [`MAX_PAD`] bytes. Only the final byte
/// is inspected.
fn strip_padding(plaintext: &mut Vec<u8>) -> CryptoResult<()> {
    let pad = plaintext
        .last()
        .map(|&b| b as usize)
        .ok_or(CryptoError::Cipher("bad padding"))?;
    if pad == 0 || pad > MAX_PAD || pad > plaintext.len() {
        return Err(CryptoError::Cipher("bad padding"));
    }
    plaintext.truncate(plaintext.len() - pad);
    Ok(())
}

/// Symmetric encrypt/decrypt bound to one tenant's credentials.
#[derive(Debug, Clone)]
pub struct EnvelopeCipher {
    credentials: Credentials,
}

impl EnvelopeCipher {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Decrypts and checks that the frame was sealed for this tenant.
    pub fn decrypt(&self, ciphertext_b64: &str) -> CryptoResult<String> {
        let frame = self.decrypt_frame(ciphertext_b64)?;
        if frame.tenant_id != self.credentials.tenant_id() {
            return Err(CryptoError::TenantMismatch {
                found: frame.tenant_id,
            });
        }
        Ok(frame.message)
    }

    /// Decrypts without the tenant check; callers must compare `tenant_id`.
    pub fn decrypt_frame(&self, ciphertext_b64: &str) -> CryptoResult<DecryptedFrame> {
        let ciphertext = B64
            .decode(ciphertext_b64.trim())
            .map_err(|err| CryptoError::Base64(err.to_string()))?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::Cipher("ciphertext is not a whole number of blocks"));
        }
        let key = self.credentials.key();
        let mut plaintext = Aes256CbcDec::new_from_slices(key, self.credentials.iv())
            .map_err(|_| CryptoError::InvalidKey(key.len()))?
            .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
            .map_err(|_| CryptoError::Cipher("ciphertext is not a whole number of blocks"))?;
        strip_padding(&mut plaintext)?;
        decode_frame(&plaintext)
    }

    /// Encrypts `message` with fresh random padding.
    pub fn encrypt(&self, message: &str) -> CryptoResult<String> {
        let mut padding = [0u8; PADDING_LEN];
        rand::rng().fill_bytes(&mut padding);
        self.encrypt_with_padding(message, &padding)
    }

    pub fn encrypt_with_padding(
        &self,
        message: &str,
        padding: &[u8; PADDING_LEN],
    ) -> CryptoResult<String> {
        let frame = encode_frame(padding, message, self.credentials.tenant_id());
        let key = self.credentials.key();
        let ciphertext = Aes256CbcEnc::new_from_slices(key, self.credentials.iv())
            .map_err(|_| CryptoError::InvalidKey(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(&frame);
        Ok(B64.encode(ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_43: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";
    const FIXED_PADDING: &[u8; PADDING_LEN] = b"0123456789abcdef";

    fn cipher(tenant: &str) -> EnvelopeCipher {
        EnvelopeCipher::new(Credentials::new(tenant, "token", KEY_43).unwrap())
    }

    #[test]
    fn decrypts_reference_ciphertext() {
        let plain = cipher("wwcorp")
            .decrypt("sKqRbbiSUnDhFHOvPjtUMW2U1PTXynsqgCAgi6c3ZWk=")
            .expect("decrypt");
        assert_eq!(plain, "hello");
    }

    #[test]
    fn decrypts_multibyte_reference_ciphertext() {
        let plain = cipher("wwcorp")
            .decrypt("sKqRbbiSUnDhFHOvPjtUMcz5e5v/T1qahgU5bEXs6+YKUZs7c0+ZdRQjTewdPalL")
            .expect("decrypt");
        assert_eq!(plain, "你好，世界");
    }

    #[test]
    fn encrypt_matches_reference_with_fixed_padding() {
        let encrypted = cipher("wwcorp")
            .encrypt_with_padding("hello", FIXED_PADDING)
            .unwrap();
        assert_eq!(encrypted, "sKqRbbiSUnDhFHOvPjtUMW2U1PTXynsqgCAgi6c3ZWk=");
    }

    #[test]
    fn round_trip_recovers_message_and_tenant() {
        let c = cipher("wwcorp");
        for message in ["", "plain ascii", "混合 content ✓", "<xml><a>1</a></xml>"] {
            let sealed = c.encrypt(message).unwrap();
            let frame = c.decrypt_frame(&sealed).unwrap();
            assert_eq!(frame.message, message);
            assert_eq!(frame.tenant_id, "wwcorp");
            assert_eq!(c.decrypt(&sealed).unwrap(), message);
        }
    }

    #[test]
    fn random_padding_differs_between_calls() {
        let c = cipher("wwcorp");
        assert_ne!(c.encrypt("same").unwrap(), c.encrypt("same").unwrap());
    }

    #[test]
    fn rejects_frame_for_other_tenant() {
        let sealed = cipher("other-corp").encrypt("hello").unwrap();
        let err = cipher("wwcorp").decrypt(&sealed).unwrap_err();
        assert_eq!(
            err,
            CryptoError::TenantMismatch {
                found: "other-corp".into()
            }
        );
        assert!(err.is_authentication());
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = cipher("wwcorp").decrypt("%%%not-base64%%%").unwrap_err();
        assert!(matches!(err, CryptoError::Base64(_)));
    }

    #[test]
    fn rejects_partial_block() {
        let err = cipher("wwcorp").decrypt(&B64.encode([0u8; 20])).unwrap_err();
        assert_eq!(
            err,
            CryptoError::Cipher("ciphertext is not a whole number of blocks")
        );
    }

    #[test]
    fn tampered_final_block_fails() {
        let c = cipher("wwcorp");
        let sealed = c.encrypt_with_padding("hello", FIXED_PADDING).unwrap();
        let mut raw = B64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = B64.encode(&raw);
        assert_eq!(
            c.decrypt(&tampered).unwrap_err(),
            CryptoError::Cipher("bad padding")
        );
    }

    /// Seals `frame` the way the platform does: PKCS#7 to a 32-byte boundary.
    fn seal_with_32_byte_padding(c: &EnvelopeCipher, mut frame: Vec<u8>) -> String {
        let pad = MAX_PAD - frame.len() % MAX_PAD;
        frame.extend(std::iter::repeat_n(pad as u8, pad));
        let key = c.credentials().key();
        let raw = Aes256CbcEnc::new_from_slices(key, c.credentials().iv())
            .unwrap()
            .encrypt_padded_vec_mut::<NoPadding>(&frame);
        B64.encode(raw)
    }

    #[test]
    fn accepts_platform_padding_beyond_one_block() {
        let c = cipher("wwcorp");
        let frame = encode_frame(FIXED_PADDING, "hello world 1234", "wwcorp");
        assert_eq!(frame.len(), 42);
        let sealed = seal_with_32_byte_padding(&c, frame);
        assert_eq!(B64.decode(&sealed).unwrap().len(), 64);

        assert_eq!(c.decrypt(&sealed).unwrap(), "hello world 1234");
    }

    #[test]
    fn accepts_full_block_of_platform_padding() {
        let c = cipher("wwcorp");
        // 16 + 4 + 6 + 6 = 32 bytes, so a whole 32-byte pad block follows.
        let frame = encode_frame(FIXED_PADDING, "abcdef", "wwcorp");
        let sealed = seal_with_32_byte_padding(&c, frame);
        assert_eq!(c.decrypt(&sealed).unwrap(), "abcdef");
    }

    #[test]
    fn strip_padding_bounds() {
        let mut zero = vec![1, 2, 0];
        assert_eq!(
            strip_padding(&mut zero).unwrap_err(),
            CryptoError::Cipher("bad padding")
        );
        let mut too_long = vec![33u8; 48];
        assert!(strip_padding(&mut too_long).is_err());
        let mut exceeds_len = vec![4u8, 4, 4];
        assert!(strip_padding(&mut exceeds_len).is_err());
        let mut ok = vec![9u8, 2, 2];
        strip_padding(&mut ok).unwrap();
        assert_eq!(ok, [9]);
    }

    #[test]
    fn decode_frame_rejects_overlong_length() {
        let mut frame = encode_frame(FIXED_PADDING, "hello", "wwcorp");
        frame[PADDING_LEN..PADDING_LEN + LEN_PREFIX].copy_from_slice(&1000u32.to_be_bytes());
        assert_eq!(
            decode_frame(&frame).unwrap_err(),
            CryptoError::Frame("declared message length exceeds frame")
        );
    }

    #[test]
    fn decode_frame_rejects_short_header() {
        assert_eq!(
            decode_frame(&[0u8; 19]).unwrap_err(),
            CryptoError::Frame("frame shorter than header")
        );
    }

    #[test]
    fn length_prefix_counts_bytes() {
        let frame = encode_frame(FIXED_PADDING, "é", "t");
        assert_eq!(&frame[PADDING_LEN..PADDING_LEN + LEN_PREFIX], &2u32.to_be_bytes());
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.message, "é");
        assert_eq!(decoded.tenant_id, "t");
    }
}
