//! C1 — Crypto primitives.
//!
//! Symmetric AES-256-GCM with a random 12-byte nonce per encryption.
//! Ciphertext layout: `nonce || gcm_sealed(plaintext)`. Also validates secret
//! names and values per spec §4.1.
//!
//! Grounded on the envelope-encryption shape in
//! `other_examples/…adaptive_pipeline…encryption_service.rs.rs`; the teacher
//! itself only ships ciphertext opaquely (it never encrypts at rest), so this
//! module has no direct teacher analogue beyond its `zeroize` dependency for
//! secret hygiene.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::AppError;

pub const NONCE_LEN: usize = 12;
pub const MAX_SECRET_NAME_LEN: usize = 255;
pub const MAX_SECRET_VALUE_BYTES: usize = 1024 * 1024; // 1 MiB

/// An AES-256-GCM keyed cipher over a single 32-byte key.
///
/// `Kavach` holds two independent instances: one for secret ciphertext
/// (`ENCRYPTION_KEY`) and one for provider credential blobs
/// (`PROVIDER_ENCRYPTION_KEY`) — see DESIGN.md Open Question #1.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext`, producing `nonce || ciphertext_with_tag`.
    /// Non-deterministic: a fresh random nonce is drawn per call (testable
    /// property 6 in spec §8).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, AppError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let sealed = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| AppError::Encryption)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypt a `nonce || ciphertext_with_tag` blob produced by [`encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, AppError> {
        if blob.len() < NONCE_LEN {
            return Err(AppError::Decryption);
        }
        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, sealed)
            .map_err(|_| AppError::Decryption)
    }

    /// Convenience: encrypt a UTF-8 string and base64-encode the result, used
    /// when ciphertext needs to travel as JSON text (e.g. provider credential
    /// configuration documents are not encrypted, but credential blobs are).
    pub fn encrypt_to_base64(&self, plaintext: &str) -> Result<String, AppError> {
        let ct = self.encrypt(plaintext.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(ct))
    }

    pub fn decrypt_from_base64(&self, encoded: &str) -> Result<Vec<u8>, AppError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| AppError::Decryption)?;
        self.decrypt(&raw)
    }
}

/// A plaintext secret value held only as long as needed (create, decrypt-for-read,
/// sync); zeroized on drop per spec invariant 4.
pub struct SecretPlaintext(String);

impl SecretPlaintext {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        // Clone out before the Drop impl zeroizes the original buffer.
        self.0.clone()
    }
}

impl Drop for SecretPlaintext {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecretPlaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretPlaintext(<redacted>)")
    }
}

/// Validate a secret name: non-empty, printable ASCII, length <= 255.
pub fn validate_secret_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::InvalidSecretName("must not be empty".into()));
    }
    if name.len() > MAX_SECRET_NAME_LEN {
        return Err(AppError::InvalidSecretName(format!(
            "must be at most {MAX_SECRET_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Err(AppError::InvalidSecretName(
            "must be printable ASCII".into(),
        ));
    }
    Ok(())
}

/// Validate a secret value: non-empty, length <= 1 MiB.
pub fn validate_secret_value(value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::EmptySecretValue);
    }
    if value.len() > MAX_SECRET_VALUE_BYTES {
        return Err(AppError::SecretValueTooLong {
            max: MAX_SECRET_VALUE_BYTES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> Cipher {
        Cipher::new([7u8; 32])
    }

    #[test]
    fn round_trips_plaintext() {
        let cipher = test_cipher();
        let ct = cipher.encrypt(b"s3cr3t").unwrap();
        let pt = cipher.decrypt(&ct).unwrap();
        assert_eq!(pt, b"s3cr3t");
    }

    #[test]
    fn nonce_is_unique_per_encryption() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same-plaintext").unwrap();
        let b = cipher.encrypt(b"same-plaintext").unwrap();
        assert_ne!(a, b, "two encryptions of the same plaintext must differ");
        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn rejects_short_ciphertext() {
        let cipher = test_cipher();
        assert!(cipher.decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = test_cipher();
        let mut ct = cipher.encrypt(b"hello").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(cipher.decrypt(&ct).is_err());
    }

    #[test]
    fn validates_secret_name_bounds() {
        assert!(validate_secret_name("").is_err());
        assert!(validate_secret_name(&"a".repeat(256)).is_err());
        assert!(validate_secret_name("API_KEY").is_ok());
        assert!(validate_secret_name("bad\nname").is_err());
    }

    #[test]
    fn validates_secret_value_bounds() {
        assert!(validate_secret_value("").is_err());
        assert!(validate_secret_value(&"a".repeat(1024 * 1024 + 1)).is_err());
        assert!(validate_secret_value("ok").is_ok());
    }
}
