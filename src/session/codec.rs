//! Sealing of the directory session artifact for client-side storage.
//!
//! The directory server hands us an opaque bearer artifact on login. We never
//! interpret it; we encrypt it with a process-wide key so it can ride in the
//! browser cookie, and decrypt it back on every request. The blob layout is
//! `nonce (12 bytes) || ciphertext`, base64url-encoded.

use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// AAD label binding sealed blobs to this purpose and format version.
const SEAL_CONTEXT: &[u8] = b"directory-session:v1";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("session key must be {KEY_LEN} bytes, base64url-encoded")]
    InvalidKey,
    #[error("sealed session blob is malformed")]
    Malformed,
    #[error("sealed session blob failed authentication")]
    Tampered,
    #[error("failed to encrypt session artifact")]
    Encrypt,
}

/// Reversible, authenticated transform between the raw directory session
/// artifact and an opaque blob safe to store client-side.
#[derive(Clone)]
pub struct SessionCodec {
    key: Key,
}

impl SessionCodec {
    /// Build a codec from the configured base64url key.
    ///
    /// # Errors
    /// Returns `CodecError::InvalidKey` if the key does not decode to exactly
    /// 32 bytes. A misconfigured key must stop the process, not degrade into
    /// unreadable sessions later.
    pub fn new(key: &SecretString) -> Result<Self, CodecError> {
        let bytes = Base64UrlUnpadded::decode_vec(key.expose_secret())
            .map_err(|_| CodecError::InvalidKey)?;
        if bytes.len() != KEY_LEN {
            return Err(CodecError::InvalidKey);
        }
        Ok(Self {
            key: *Key::from_slice(&bytes),
        })
    }

    /// Encrypt a session artifact into an opaque blob.
    ///
    /// # Errors
    /// Returns `CodecError::Encrypt` if the AEAD rejects the input.
    pub fn seal(&self, artifact: &[u8]) -> Result<String, CodecError> {
        let cipher = ChaCha20Poly1305::new(&self.key);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: artifact,
            aad: SEAL_CONTEXT,
        };
        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|_| CodecError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(Base64UrlUnpadded::encode_string(&blob))
    }

    /// Decrypt and authenticate a sealed blob back into the raw artifact.
    ///
    /// # Errors
    /// `CodecError::Malformed` when the blob is not valid base64url or too
    /// short to contain a nonce; `CodecError::Tampered` when authentication
    /// fails (bit flips, truncation, or a blob sealed under another key).
    /// Callers must treat both as "no valid session", not as a server fault.
    pub fn unseal(&self, blob: &str) -> Result<Vec<u8>, CodecError> {
        let data = Base64UrlUnpadded::decode_vec(blob).map_err(|_| CodecError::Malformed)?;
        if data.len() < NONCE_LEN {
            return Err(CodecError::Malformed);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = ChaCha20Poly1305::new(&self.key);
        let payload = Payload {
            msg: ciphertext,
            aad: SEAL_CONTEXT,
        };
        cipher
            .decrypt(nonce, payload)
            .map_err(|_| CodecError::Tampered)
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SecretString {
        SecretString::from(Base64UrlUnpadded::encode_string(&[7u8; 32]))
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn seal_unseal_roundtrip() {
        let codec = SessionCodec::new(&test_key()).unwrap();
        let artifact = b"MagBearerToken=abcdef0123456789";

        let blob = codec.seal(artifact).unwrap();
        assert_ne!(blob.as_bytes(), artifact.as_slice());

        let unsealed = codec.unseal(&blob).unwrap();
        assert_eq!(unsealed, artifact);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn unseal_rejects_any_bit_flip() {
        let codec = SessionCodec::new(&test_key()).unwrap();
        let blob = codec.seal(b"artifact").unwrap();
        let mut raw = Base64UrlUnpadded::decode_vec(&blob).unwrap();

        for index in 0..raw.len() {
            raw[index] ^= 0x01;
            let flipped = Base64UrlUnpadded::encode_string(&raw);
            assert!(
                matches!(codec.unseal(&flipped), Err(CodecError::Tampered)),
                "bit flip at byte {index} was not rejected"
            );
            raw[index] ^= 0x01;
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn unseal_rejects_other_key() {
        let codec = SessionCodec::new(&test_key()).unwrap();
        let other = SessionCodec::new(&SecretString::from(Base64UrlUnpadded::encode_string(
            &[8u8; 32],
        )))
        .unwrap();

        let blob = codec.seal(b"artifact").unwrap();
        assert!(matches!(other.unseal(&blob), Err(CodecError::Tampered)));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn unseal_rejects_garbage() {
        let codec = SessionCodec::new(&test_key()).unwrap();
        assert!(matches!(
            codec.unseal("not base64!?"),
            Err(CodecError::Malformed)
        ));
        assert!(matches!(codec.unseal("AAAA"), Err(CodecError::Malformed)));
    }

    #[test]
    fn new_rejects_bad_keys() {
        let short = SecretString::from(Base64UrlUnpadded::encode_string(&[1u8; 16]));
        assert!(matches!(
            SessionCodec::new(&short),
            Err(CodecError::InvalidKey)
        ));

        let not_base64 = SecretString::from("////not-a-key////".to_string());
        assert!(matches!(
            SessionCodec::new(&not_base64),
            Err(CodecError::InvalidKey)
        ));
    }
}
