//! Request signing and verification.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Header carrying the hex-encoded public key.
pub const PUBKEY_HEADER: &str = "x-pubkey";

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Payload field holding the per-request nonce.
pub const NONCE_FIELD: &str = "__nonce";

/// Whether a method carries its payload as a JSON body.
pub fn is_mutating(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH"
    )
}

/// The signed part of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// JSON body (mutating methods).
    Json(Value),
    /// Query string pairs (read methods).
    Query(Vec<(String, String)>),
}

impl Payload {
    /// Build the payload for `method` from a JSON object of parameters.
    ///
    /// Read methods flatten the object into query pairs; string values are
    /// used verbatim, everything else in its JSON form.
    pub fn for_method(method: &str, params: Value) -> Self {
        if is_mutating(method) {
            return Self::Json(params);
        }
        let pairs = match params {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
            _ => Vec::new(),
        };
        Self::Query(pairs)
    }

    /// Serialized form, as it goes on the wire and into the signature.
    pub fn serialize(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Query(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish(),
        }
    }

    fn insert_nonce(&mut self, nonce: String) {
        match self {
            Self::Json(Value::Object(map)) => {
                map.insert(NONCE_FIELD.to_string(), Value::String(nonce));
            }
            Self::Json(value @ Value::Null) => {
                let mut map = Map::new();
                map.insert(NONCE_FIELD.to_string(), Value::String(nonce));
                *value = Value::Object(map);
            }
            // Arrays and scalars have nowhere to carry a nonce.
            Self::Json(_) => {}
            Self::Query(pairs) => {
                pairs.retain(|(k, _)| k != NONCE_FIELD);
                pairs.push((NONCE_FIELD.to_string(), nonce));
            }
        }
    }
}

/// A pending request, described independently of the HTTP client.
#[derive(Clone, Debug, PartialEq)]
pub struct SignableRequest {
    /// Upper-case HTTP method.
    pub method: String,
    /// Full request URI without the query string.
    pub uri: String,
    /// Body or query parameters.
    pub payload: Payload,
}

impl SignableRequest {
    /// Describe a request.
    pub fn new(method: &str, uri: impl Into<String>, payload: Payload) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            uri: uri.into(),
            payload,
        }
    }

    /// The exact content covered by the signature.
    pub fn canonical(&self) -> String {
        format!("{}\n{}\n{}", self.method, self.uri, self.payload.serialize())
    }
}

/// Authentication metadata to attach to a request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeaders {
    /// No credentials configured.
    None,
    /// Signature headers.
    Signed { pubkey: String, signature: String },
    /// HTTP basic auth with the hashed password.
    Basic { user: String, password: String },
}

impl AuthHeaders {
    /// Header pairs for the signed mode; empty otherwise.
    pub fn signature_headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Signed { pubkey, signature } => vec![
                (PUBKEY_HEADER, pubkey.clone()),
                (SIGNATURE_HEADER, signature.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Signed { pubkey, .. } => f
                .debug_struct("Signed")
                .field("pubkey", pubkey)
                .finish_non_exhaustive(),
            Self::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// Credentials a client authenticates with.
#[derive(Clone)]
pub enum Credentials {
    /// Sign requests with this key pair.
    KeyPair(Arc<KeyPair>),
    /// Basic auth; `password_hash` is already the SHA-256 hex of the password.
    Basic { email: String, password_hash: String },
}

impl Credentials {
    /// Basic credentials from a clear-text password, hashing it immediately.
    pub fn basic(email: impl Into<String>, password: &str) -> Self {
        Self::Basic {
            email: email.into(),
            password_hash: hash_password(password),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyPair(keypair) => f.debug_tuple("KeyPair").field(keypair).finish(),
            Self::Basic { email, .. } => f
                .debug_struct("Basic")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

/// One-way transform applied to passwords before they leave the process.
pub fn hash_password(password: &str) -> String {
    ferry_core::hash::sha256_hex(password)
}

/// Attaches authentication metadata to outgoing requests.
#[derive(Clone, Debug, Default)]
pub struct RequestSigner {
    credentials: Option<Credentials>,
}

impl RequestSigner {
    /// Create a signer; `None` leaves requests unauthenticated.
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self { credentials }
    }

    /// Signer using a key pair.
    pub fn with_keypair(keypair: Arc<KeyPair>) -> Self {
        Self::new(Some(Credentials::KeyPair(keypair)))
    }

    /// Signer using basic credentials.
    pub fn with_basic(email: impl Into<String>, password: &str) -> Self {
        Self::new(Some(Credentials::basic(email, password)))
    }

    /// The configured credentials, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The key pair, for operations that cannot proceed without signing.
    pub fn require_keypair(&self) -> SignerResult<&KeyPair> {
        match &self.credentials {
            Some(Credentials::KeyPair(keypair)) => Ok(keypair.as_ref()),
            _ => Err(SignerError::MissingKeyPair),
        }
    }

    /// Authenticate a request.
    ///
    /// In key pair mode a fresh nonce is added to the payload before signing,
    /// so the caller must send the payload as modified here.
    pub fn authenticate(&self, request: &mut SignableRequest) -> AuthHeaders {
        match &self.credentials {
            None => AuthHeaders::None,
            Some(Credentials::Basic {
                email,
                password_hash,
            }) => AuthHeaders::Basic {
                user: email.clone(),
                password: password_hash.clone(),
            },
            Some(Credentials::KeyPair(keypair)) => {
                request
                    .payload
                    .insert_nonce(uuid::Uuid::new_v4().to_string());
                let signature = keypair
                    .secret
                    .signing_key()
                    .sign(request.canonical().as_bytes());
                AuthHeaders::Signed {
                    pubkey: keypair.public_hex(),
                    signature: hex::encode(signature.to_bytes()),
                }
            }
        }
    }
}

/// Verify a signed request against the headers it carried.
pub fn verify_request(
    request: &SignableRequest,
    pubkey_hex: &str,
    signature_hex: &str,
) -> SignerResult<()> {
    let public_key = PublicKey::from_hex(pubkey_hex)?;

    let mut sig_bytes = [0u8; 64];
    hex::decode_to_slice(signature_hex, &mut sig_bytes)
        .map_err(|e| SignerError::InvalidSignature(format!("expected 128 hex chars: {e}")))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    public_key
        .verifying_key()
        .verify(request.canonical().as_bytes(), &signature)
        .map_err(|_| SignerError::VerificationFailed)
}
