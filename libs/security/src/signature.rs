use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Computes the callback signature: the four parts are sorted as independent
/// strings, concatenated without separator and hashed with SHA-1.
///
/// ```
/// let a = security::sign("token", "1700000000", "nonce", "payload");
/// let b = security::sign("token", "1700000000", "nonce", "payload");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 40);
/// ```
pub fn sign(token: &str, timestamp: &str, nonce: &str, payload: &str) -> String {
    let mut parts = [token, timestamp, nonce, payload];
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Recomputes the signature and compares it with `candidate` in constant time.
pub fn verify(token: &str, timestamp: &str, nonce: &str, payload: &str, candidate: &str) -> bool {
    let expected = sign(token, timestamp, nonce, payload);
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_digest() {
        assert_eq!(
            sign("token", "1700000000", "nonce", "payload"),
            "1823fadc3a91277459cdefee4a92f4608eb01aba"
        );
    }

    #[test]
    fn sorting_makes_argument_positions_irrelevant() {
        let a = sign("token", "1700000000", "nonce", "payload");
        let b = sign("nonce", "payload", "token", "1700000000");
        assert_eq!(a, b);
    }

    #[test]
    fn sign_is_sensitive_to_token() {
        assert_ne!(
            sign("token-a", "1700000000", "nonce", "payload"),
            sign("token-b", "1700000000", "nonce", "payload")
        );
    }

    #[test]
    fn verify_accepts_exact_signature() {
        let sig = sign("token", "1700000000", "nonce", "payload");
        assert!(verify("token", "1700000000", "nonce", "payload", &sig));
    }

    #[test]
    fn verify_rejects_single_character_mutations() {
        let sig = sign("token", "1700000000", "nonce", "payload");

        let mut mutated_sig = sig.clone().into_bytes();
        mutated_sig[0] = if mutated_sig[0] == b'0' { b'1' } else { b'0' };
        let mutated_sig = String::from_utf8(mutated_sig).unwrap();

        assert!(!verify("token", "1700000000", "nonce", "payload", &mutated_sig));
        assert!(!verify("token", "1700000001", "nonce", "payload", &sig));
        assert!(!verify("token", "1700000000", "noncf", "payload", &sig));
        assert!(!verify("token", "1700000000", "nonce", "paylaad", &sig));
        assert!(!verify("token", "1700000000", "nonce", "payloae", &sig));
    }

    #[test]
    fn verify_rejects_uppercase_hex() {
        let sig = sign("token", "1700000000", "nonce", "payload").to_uppercase();
        assert!(!verify("token", "1700000000", "nonce", "payload", &sig));
    }

    #[test]
    fn verify_rejects_truncated_signature() {
        let sig = sign("token", "1700000000", "nonce", "payload");
        assert!(!verify("token", "1700000000", "nonce", "payload", &sig[..39]));
        assert!(!verify("token", "1700000000", "nonce", "payload", ""));
    }
}
