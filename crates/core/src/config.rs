//! Client configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default bridge endpoint.
pub const DEFAULT_BRIDGE_URL: &str = "https://api.storj.io";

/// Client configuration.
///
/// Built once at process startup (file, environment, flags) and then passed
/// explicitly into the bridge client and transfer engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bridge REST endpoint.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Shard size in bytes used when demuxing uploads.
    #[serde(default = "default_shard_size")]
    pub shard_size: u64,
    /// How long to wait for a peer channel to open, in seconds.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
    /// Maximum shard transfers in flight per upload.
    #[serde(default = "default_max_parallel_transfers")]
    pub max_parallel_transfers: usize,
    /// Shards larger than this are buffered on disk while waiting for a
    /// transfer slot.
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: u64,
    /// Directory for spilled shard buffers (defaults to the OS temp dir).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Discard the staging frame on the bridge when an upload fails.
    /// When false the frame is left for server-side expiry.
    #[serde(default)]
    pub discard_frame_on_failure: bool,
    /// Request authentication.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

fn default_bridge_url() -> String {
    DEFAULT_BRIDGE_URL.to_string()
}

fn default_shard_size() -> u64 {
    crate::DEFAULT_SHARD_SIZE
}

fn default_open_timeout_secs() -> u64 {
    30
}

fn default_max_parallel_transfers() -> usize {
    4
}

fn default_spill_threshold() -> u64 {
    32 * 1024 * 1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            shard_size: default_shard_size(),
            open_timeout_secs: default_open_timeout_secs(),
            max_parallel_transfers: default_max_parallel_transfers(),
            spill_threshold: default_spill_threshold(),
            temp_dir: None,
            discard_frame_on_failure: false,
            auth: None,
        }
    }
}

impl ClientConfig {
    /// Peer channel open timeout as a Duration.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        crate::shard::validate_shard_size(self.shard_size)?;
        if self.bridge_url.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "bridge_url must not be empty".to_string(),
            ));
        }
        if self.open_timeout_secs == 0 {
            return Err(crate::Error::InvalidConfig(
                "open_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_parallel_transfers == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_parallel_transfers must be at least 1".to_string(),
            ));
        }
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        Ok(())
    }
}

/// How requests to the bridge are authenticated.
///
/// At most one mode is active per client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthConfig {
    /// Sign every request with an Ed25519 key (hex-encoded secret).
    KeyPair { secret_key: String },
    /// HTTP basic auth; the password is hashed before it is sent.
    Basic { email: String, password: String },
}

impl AuthConfig {
    fn validate(&self) -> crate::Result<()> {
        match self {
            Self::KeyPair { secret_key } if secret_key.is_empty() => Err(
                crate::Error::InvalidConfig("auth.secret_key must not be empty".to_string()),
            ),
            Self::Basic { email, .. } if email.is_empty() => Err(crate::Error::InvalidConfig(
                "auth.email must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyPair { .. } => f
                .debug_struct("KeyPair")
                .field("secret_key", &"[REDACTED]")
                .finish(),
            Self::Basic { email, .. } => f
                .debug_struct("Basic")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.bridge_url, DEFAULT_BRIDGE_URL);
        assert_eq!(config.open_timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.shard_size, crate::DEFAULT_SHARD_SIZE);
        assert!(config.auth.is_none());
        assert!(!config.discard_frame_on_failure);
    }

    #[test]
    fn auth_modes_parse_untagged() {
        let config: ClientConfig = toml::from_str(
            r#"
            bridge_url = "https://staging.api.storj.io"
            [auth]
            email = "gordon@storj.io"
            password = "password"
            "#,
        )
        .unwrap();
        assert!(matches!(config.auth, Some(AuthConfig::Basic { .. })));

        let config: ClientConfig = toml::from_str(
            r#"
            [auth]
            secret_key = "00"
            "#,
        )
        .unwrap();
        assert!(matches!(config.auth, Some(AuthConfig::KeyPair { .. })));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = ClientConfig {
            shard_size: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            max_parallel_transfers: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            auth: Some(AuthConfig::Basic {
                email: String::new(),
                password: "x".to_string(),
            }),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn auth_debug_redacts_secrets() {
        let auth = AuthConfig::Basic {
            email: "gordon@storj.io".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("gordon@storj.io"));
        assert!(!rendered.contains("hunter2"));
    }
}
