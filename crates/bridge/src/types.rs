//! Request and response records of the bridge REST API.

use ferry_core::FarmerDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A farmer known to the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    pub address: String,
    pub port: u16,
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(default, rename = "lastSeen")]
    pub last_seen: Option<String>,
    #[serde(default, rename = "userAgent")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl Contact {
    pub fn descriptor(&self) -> FarmerDescriptor {
        FarmerDescriptor::new(self.address.clone(), self.port, self.node_id.clone())
    }
}

/// Filters for the contact list.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ContactQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

/// A registered user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub activated: bool,
}

/// A public key registered to the authenticated user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredKey {
    pub key: String,
    #[serde(default)]
    pub user: Option<String>,
}

/// A storage bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub storage: Option<u64>,
    #[serde(default)]
    pub transfer: Option<u64>,
    #[serde(default)]
    pub pubkeys: Vec<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

/// Fields for creating or updating a bucket. Unset fields are left out.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BucketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkeys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<u64>,
}

/// What a bucket token authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenOperation {
    Push,
    Pull,
}

impl fmt::Display for TokenOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "PUSH"),
            Self::Pull => write!(f, "PULL"),
        }
    }
}

/// A short-lived bucket token.
#[derive(Clone, Serialize, Deserialize)]
pub struct BucketToken {
    pub token: String,
    #[serde(default)]
    pub bucket: Option<String>,
    pub operation: TokenOperation,
    #[serde(default)]
    pub expires: Option<String>,
}

impl fmt::Debug for BucketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketToken")
            .field("bucket", &self.bucket)
            .field("operation", &self.operation)
            .field("expires", &self.expires)
            .finish_non_exhaustive()
    }
}
