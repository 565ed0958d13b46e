use rand::{Rng, distr::Alphanumeric};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cipher::EnvelopeCipher;
use crate::credentials::Credentials;
use crate::error::{CryptoError, CryptoResult};
use crate::signature;

const NONCE_LEN: usize = 16;

/// Authentication material carried by a single inbound callback.
///
/// `body` is the raw request body: the platform's `<xml><Encrypt>..</Encrypt></xml>`
/// document, or the bare ciphertext. The callback pipeline extracts the
/// signed ciphertext from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEnvelope {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub body: String,
}

/// Encrypted reply in the shape the platform expects back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEnvelope {
    pub encrypt: String,
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl ReplyEnvelope {
    pub fn to_xml(&self) -> String {
        format!(
            "<xml>\n<Encrypt><![CDATA[{}]]></Encrypt>\n<MsgSignature><![CDATA[{}]]></MsgSignature>\n<TimeStamp>{}</TimeStamp>\n<Nonce><![CDATA[{}]]></Nonce>\n</xml>",
            self.encrypt, self.signature, self.timestamp, self.nonce
        )
    }
}

/// Signature gate in front of the envelope cipher.
///
/// Every inbound operation checks the signature before any decryption is
/// attempted, so a forged request never reaches the cipher.
#[derive(Debug, Clone)]
pub struct CallbackAuthenticator {
    cipher: EnvelopeCipher,
}

impl CallbackAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            cipher: EnvelopeCipher::new(credentials),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        self.cipher.credentials()
    }

    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    /// URL-ownership handshake: verifies and recovers the echo string.
    pub fn verify_and_recover_echo(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        echo: &str,
    ) -> CryptoResult<String> {
        self.check_signature(signature, timestamp, nonce, echo)?;
        let plain = self.cipher.decrypt(echo)?;
        debug!(tenant = %self.credentials().tenant_id(), "echo string recovered");
        Ok(plain)
    }

    /// Message callback: verifies and returns the decrypted XML.
    pub fn verify_and_decrypt_message(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        ciphertext: &str,
    ) -> CryptoResult<String> {
        self.check_signature(signature, timestamp, nonce, ciphertext)?;
        self.cipher.decrypt(ciphertext).inspect_err(|err| {
            warn!(
                tenant = %self.credentials().tenant_id(),
                error = %err,
                "callback decryption failed"
            )
        })
    }

    /// Encrypts `plaintext` and serializes the signed reply XML.
    pub fn encrypt_reply(&self, plaintext: &str) -> CryptoResult<String> {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let nonce = random_nonce();
        Ok(self.seal_reply(plaintext, &timestamp, &nonce)?.to_xml())
    }

    pub fn seal_reply(
        &self,
        plaintext: &str,
        timestamp: &str,
        nonce: &str,
    ) -> CryptoResult<ReplyEnvelope> {
        let encrypt = self.cipher.encrypt(plaintext)?;
        let signature = signature::sign(self.credentials().token(), timestamp, nonce, &encrypt);
        Ok(ReplyEnvelope {
            encrypt,
            signature,
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
        })
    }

    fn check_signature(
        &self,
        candidate: &str,
        timestamp: &str,
        nonce: &str,
        payload: &str,
    ) -> CryptoResult<()> {
        if signature::verify(self.credentials().token(), timestamp, nonce, payload, candidate) {
            Ok(())
        } else {
            warn!(
                tenant = %self.credentials().tenant_id(),
                timestamp = %timestamp,
                "callback signature mismatch"
            );
            Err(CryptoError::SignatureMismatch)
        }
    }
}

fn random_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
