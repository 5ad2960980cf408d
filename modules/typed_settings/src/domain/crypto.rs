//! Encryption of property payloads
//!
//! Payloads are serialized to JSON, sealed with XChaCha20-Poly1305 under a
//! fresh random nonce and stored as `base64(nonce || ciphertext)`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde_json::Value;

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes of base64, got {0} bytes")]
    InvalidKey(usize),
    #[error("encryption key is not valid base64")]
    KeyEncoding,
    #[error("payload could not be serialized")]
    Serialize,
    #[error("payload could not be encrypted")]
    Encrypt,
    #[error("ciphertext is malformed or was sealed with another key")]
    Decrypt,
}

/// Stateless payload cipher
#[derive(Clone)]
pub struct Crypto {
    cipher: XChaCha20Poly1305,
}

impl std::fmt::Debug for Crypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crypto").finish_non_exhaustive()
    }
}

impl Crypto {
    /// Build from a base64-encoded 32-byte key
    pub fn from_base64_key(key: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(key.trim())
            .map_err(|_| CryptoError::KeyEncoding)?;
        Self::from_key_bytes(&bytes)
    }

    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let cipher = XChaCha20Poly1305::new_from_slice(bytes)
            .map_err(|_| CryptoError::InvalidKey(bytes.len()))?;
        Ok(Self { cipher })
    }

    /// Fresh random key; values sealed with it do not survive a restart
    pub fn generate() -> Self {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        Self {
            cipher: XChaCha20Poly1305::new(&key),
        }
    }

    /// Random key in the base64 form accepted by [`Crypto::from_base64_key`]
    pub fn generate_base64_key() -> String {
        STANDARD.encode(XChaCha20Poly1305::generate_key(&mut OsRng))
    }

    pub fn encrypt(&self, value: &Value) -> Result<String, CryptoError> {
        let plaintext = serde_json::to_vec(value).map_err(|_| CryptoError::Serialize)?;
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<Value, CryptoError> {
        let sealed = STANDARD
            .decode(ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), body)
            .map_err(|_| CryptoError::Decrypt)?;
        serde_json::from_slice(&plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Decrypt a stored payload, which must be a ciphertext string
    pub fn decrypt_payload(&self, payload: &Value) -> Result<Value, CryptoError> {
        match payload {
            Value::String(ciphertext) => self.decrypt(ciphertext),
            _ => Err(CryptoError::Decrypt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_structured_values() {
        let crypto = Crypto::generate();
        for value in [
            json!("secret"),
            json!(42),
            json!(null),
            json!({"host": "smtp.example.com", "ports": [25, 587]}),
        ] {
            let sealed = crypto.encrypt(&value).unwrap();
            assert_eq!(crypto.decrypt(&sealed).unwrap(), value);
        }
    }

    #[test]
    fn ciphertext_differs_between_calls() {
        let crypto = Crypto::generate();
        let a = crypto.encrypt(&json!("same")).unwrap();
        let b = crypto.encrypt(&json!("same")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let sealed = Crypto::generate().encrypt(&json!("secret")).unwrap();
        let other = Crypto::generate();
        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn corrupt_ciphertext_fails_to_decrypt() {
        let crypto = Crypto::generate();
        assert!(crypto.decrypt("not base64 !!").is_err());
        assert!(crypto.decrypt(&STANDARD.encode([0u8; 8])).is_err());
        assert!(crypto.decrypt_payload(&json!(12)).is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            Crypto::from_base64_key(&short),
            Err(CryptoError::InvalidKey(16))
        ));

        let key = Crypto::generate_base64_key();
        let a = Crypto::from_base64_key(&key).unwrap();
        let b = Crypto::from_base64_key(&key).unwrap();
        let sealed = a.encrypt(&json!([1, 2, 3])).unwrap();
        assert_eq!(b.decrypt(&sealed).unwrap(), json!([1, 2, 3]));
    }
}
