//! Request authentication for the ferry bridge client.
//!
//! This crate provides:
//! - Ed25519 key generation and hex persistence
//! - Request signing (`x-pubkey` / `x-signature` headers)
//! - Basic-auth credentials with hashed passwords
//! - Signature verification

pub mod error;
pub mod key;
pub mod request;

pub use error::{SignerError, SignerResult};
pub use key::{KeyPair, PublicKey, SecretKey};
pub use request::{
    AuthHeaders, Credentials, Payload, RequestSigner, SignableRequest, hash_password,
    verify_request,
};
