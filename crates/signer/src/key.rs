//! Ed25519 key types and operations.

use crate::error::{SignerError, SignerResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;

/// A secret (private) key for signing.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse from a hex-encoded 32-byte seed.
    pub fn from_hex(s: &str) -> SignerResult<Self> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut seed)
            .map_err(|e| SignerError::KeyParsing(format!("expected 64 hex chars: {e}")))?;
        Ok(Self {
            inner: SigningKey::from_bytes(&seed),
        })
    }

    /// Encode the seed as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Get the inner signing key.
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A public key for verification.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse from hex as sent in the `x-pubkey` header.
    pub fn from_hex(s: &str) -> SignerResult<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| SignerError::KeyParsing(format!("expected 64 hex chars: {e}")))?;
        let inner = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))?;
        Ok(Self { inner })
    }

    /// Encode as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    /// Get the inner verifying key.
    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

/// A key pair containing both secret and public keys.
///
/// Held for the lifetime of the process and shared read-only between
/// concurrent requests; never transmitted.
pub struct KeyPair {
    /// The secret key.
    pub secret: SecretKey,
    /// The public key.
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::generate())
    }

    /// Build from an existing secret key.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Parse from a hex-encoded secret key.
    pub fn from_hex_secret(s: &str) -> SignerResult<Self> {
        SecretKey::from_hex(s).map(Self::from_secret)
    }

    /// Hex-encoded secret key, for persisting.
    pub fn to_hex_secret(&self) -> String {
        self.secret.to_hex()
    }

    /// Hex-encoded public key.
    pub fn public_hex(&self) -> String {
        self.public.to_hex()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish()
    }
}
