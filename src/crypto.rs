// ABOUTME: Cryptographic primitives for the identity core
// ABOUTME: AES-256-GCM token sealing, Argon2 password hashing, and secret generation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! Cryptographic utilities.
//!
//! Two classes of secret live in storage and each gets its own treatment:
//!
//! - Secrets we only need to *verify* (passwords, refresh tokens, reset and
//!   magic-link tokens) are stored as one-way hashes.
//! - Secrets we must later *use* (provider OAuth tokens) are sealed with
//!   AES-256-GCM. Each ciphertext carries its own random 12-byte nonce
//!   prepended, base64 encoded.

use crate::errors::{AuthError, AuthResult};
use argon2::{
    password_hash::{rand_core::OsRng as PasswordRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use base64::{engine::general_purpose, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Nonce length for AES-256-GCM
const NONCE_LEN: usize = 12;

/// Authenticated symmetric cipher for provider token bundles.
///
/// The key is process-wide configuration; every seal uses a fresh random
/// nonce so identical plaintexts produce distinct ciphertexts.
#[derive(Clone)]
pub struct TokenCipher {
    key: Vec<u8>,
}

impl TokenCipher {
    /// Create a cipher from a 32-byte AES-256 key
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not exactly 32 bytes
    pub fn new(key: Vec<u8>) -> AuthResult<Self> {
        if key.len() != 32 {
            return Err(AuthError::Internal(format!(
                "encryption key must be 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { key })
    }
}

impl Drop for TokenCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl TokenCipher {
    /// Encrypt plaintext bytes, returning base64(\[nonce\]\[ciphertext+tag\])
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails or the key is rejected
    pub fn seal(&self, plaintext: &[u8]) -> AuthResult<String> {
        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| AuthError::Internal("system RNG failure".into()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| AuthError::Internal("invalid encryption key".into()))?;
        let key = LessSafeKey::new(unbound_key);

        let mut data = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut data)
            .map_err(|_| AuthError::Internal("encryption failed".into()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(data);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a sealed value produced by [`TokenCipher::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderTokenCorrupt`] on any tampering, wrong
    /// key, or malformed ciphertext. Never returns partial plaintext.
    pub fn open(&self, sealed: &str) -> AuthResult<Vec<u8>> {
        let combined = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| AuthError::ProviderTokenCorrupt)?;
        if combined.len() < NONCE_LEN {
            return Err(AuthError::ProviderTokenCorrupt);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce_array: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| AuthError::ProviderTokenCorrupt)?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| AuthError::Internal("invalid encryption key".into()))?;
        let key = LessSafeKey::new(unbound_key);

        let mut data = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut data)
            .map_err(|_| AuthError::ProviderTokenCorrupt)?;

        Ok(plaintext.to_vec())
    }
}

/// Generate a secure 32-byte AES-256 encryption key
#[must_use]
pub fn generate_encryption_key() -> [u8; 32] {
    use rand::Rng;
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    key
}

/// Generate a random JWT signing secret
///
/// # Errors
///
/// Returns an error if the system RNG fails; the core cannot operate
/// securely without working RNG
pub fn generate_jwt_secret() -> AuthResult<[u8; 64]> {
    let rng = SystemRandom::new();
    let mut secret = [0u8; 64];
    rng.fill(&mut secret).map_err(|_| {
        tracing::error!("CRITICAL: failed to generate cryptographically secure JWT secret");
        AuthError::Internal("system RNG failure".into())
    })?;
    Ok(secret)
}

/// Generate a high-entropy opaque secret (refresh/reset/magic-link tokens,
/// OAuth state, PKCE verifier): 32 random bytes, base64url without padding
#[must_use]
pub fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// One-way hash for verifiable secrets, hex-encoded SHA-256.
///
/// Lookups go through this hash; the raw value is never persisted.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(digest)
}

/// Derive the PKCE S256 code challenge from a code verifier
#[must_use]
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Hash a password with Argon2id and a random salt (PHC string format)
///
/// # Errors
///
/// Returns an error if hashing fails
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut PasswordRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash.
///
/// Comparison is constant-time within the hashing scheme. A malformed
/// stored hash verifies as false rather than erroring, so the caller's
/// failure path stays uniform.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}
