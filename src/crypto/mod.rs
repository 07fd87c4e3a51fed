//! AES-256-GCM sealing of stored OAuth tokens.
//!
//! Every token is encrypted into a single self-describing blob:
//! `nonce || tag || ciphertext`, base64-encoded. The nonce is drawn fresh
//! from the OS RNG on every call and is never accepted from the caller,
//! so nonce reuse under one key cannot happen by misuse. The master key
//! must be 32 bytes (256 bits), supplied base64-encoded from the
//! environment.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::AuthError;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes (128 bits)
const TAG_SIZE: usize = 16;

/// Authenticated codec for secret strings.
///
/// Holds the cipher for the lifetime of the process; construct once at
/// startup and share by reference.
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl SecretCodec {
    /// Builds a codec from a base64-encoded 32-byte master key.
    ///
    /// Fails if the key is not valid base64 or not exactly 32 bytes once
    /// decoded.
    pub fn new(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64)
            .context("Failed to decode base64 master key")?;

        if key_bytes.len() != KEY_SIZE {
            return Err(anyhow!(
                "Master key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        Ok(Self { cipher })
    }

    /// Encrypts a plaintext secret into a base64 blob.
    ///
    /// The blob carries its own nonce and authentication tag, so no
    /// per-row nonce storage is needed.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuthError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        // aes-gcm appends the tag to the ciphertext; split it back out so
        // the blob layout stays nonce || tag || ciphertext.
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AuthError::Encryption)?;
        let boundary = sealed.len() - TAG_SIZE;

        let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed[boundary..]);
        blob.extend_from_slice(&sealed[..boundary]);

        Ok(BASE64.encode(&blob))
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Any malformed input, truncated blob, tampered byte, or wrong key
    /// yields `AuthError::Decryption`; corrupted plaintext is never
    /// returned.
    pub fn decrypt(&self, blob: &str) -> Result<String, AuthError> {
        let bytes = BASE64.decode(blob).map_err(|_| AuthError::Decryption)?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AuthError::Decryption);
        }

        let nonce = Nonce::from_slice(&bytes[..NONCE_SIZE]);
        let tag = &bytes[NONCE_SIZE..NONCE_SIZE + TAG_SIZE];
        let ciphertext = &bytes[NONCE_SIZE + TAG_SIZE..];

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| AuthError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| AuthError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> SecretCodec {
        let key = BASE64.encode([7u8; 32]);
        SecretCodec::new(&key).expect("Failed to create test codec")
    }

    #[test]
    fn test_key_validation() {
        // Valid 32-byte key
        assert!(SecretCodec::new(&BASE64.encode([0u8; 32])).is_ok());

        // Too short
        assert!(SecretCodec::new(&BASE64.encode([0u8; 16])).is_err());

        // Too long
        assert!(SecretCodec::new(&BASE64.encode([0u8; 64])).is_err());

        // Invalid base64
        assert!(SecretCodec::new("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let codec = test_codec();
        let long = "t".repeat(10 * 1024);

        for plaintext in ["", "x", long.as_str()] {
            let blob = codec.encrypt(plaintext).expect("Encryption failed");
            assert_ne!(blob, plaintext);
            let decrypted = codec.decrypt(&blob).expect("Decryption failed");
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_blob_layout() {
        let codec = test_codec();
        let plaintext = "access-token-12345";

        let blob = codec.encrypt(plaintext).unwrap();
        let bytes = BASE64.decode(blob).unwrap();

        // nonce || tag || ciphertext
        assert_eq!(bytes.len(), NONCE_SIZE + TAG_SIZE + plaintext.len());
    }

    #[test]
    fn test_fresh_nonce_every_call() {
        let codec = test_codec();

        let blob1 = codec.encrypt("same-plaintext").unwrap();
        let blob2 = codec.encrypt("same-plaintext").unwrap();
        assert_ne!(blob1, blob2);

        let nonce1 = &BASE64.decode(&blob1).unwrap()[..NONCE_SIZE];
        let nonce2 = &BASE64.decode(&blob2).unwrap()[..NONCE_SIZE];
        assert_ne!(nonce1, nonce2);

        assert_eq!(codec.decrypt(&blob1).unwrap(), "same-plaintext");
        assert_eq!(codec.decrypt(&blob2).unwrap(), "same-plaintext");
    }

    #[test]
    fn test_wrong_key_fails() {
        let codec1 = SecretCodec::new(&BASE64.encode([0u8; 32])).unwrap();
        let codec2 = SecretCodec::new(&BASE64.encode([1u8; 32])).unwrap();

        let blob = codec1.encrypt("secret").unwrap();
        assert!(matches!(codec2.decrypt(&blob), Err(AuthError::Decryption)));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let codec = test_codec();
        let blob = codec.encrypt("secret").unwrap();

        // Shorter than nonce + tag
        let short = BASE64.encode(&BASE64.decode(&blob).unwrap()[..NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(codec.decrypt(&short), Err(AuthError::Decryption)));

        // Not base64 at all
        assert!(matches!(
            codec.decrypt("!!not base64!!"),
            Err(AuthError::Decryption)
        ));
    }

    #[test]
    fn test_tampered_blob_fails() {
        let codec = test_codec();
        let blob = codec.encrypt("secret").unwrap();

        let mut bytes = BASE64.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let tampered = BASE64.encode(&bytes);
        assert!(matches!(
            codec.decrypt(&tampered),
            Err(AuthError::Decryption)
        ));
    }
}
