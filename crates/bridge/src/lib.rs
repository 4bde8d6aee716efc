//! REST client for the ferry bridge service.
//!
//! Every call is authenticated with the configured credentials. The client
//! also implements [`ferry_transfer::BridgeApi`] so it can drive uploads and
//! downloads directly.

pub mod client;
pub mod types;

pub use client::{BridgeClient, TOKEN_HEADER};
pub use types::{
    Bucket, BucketRequest, BucketToken, Contact, ContactQuery, RegisteredKey, TokenOperation, User,
};
