//! Repository configuration model and patch composition.
//!
//! # Responsibility
//! - Describe the persisted `config` document written at repository init.
//! - Generate first-run defaults, including a fresh peer identity.
//! - Compose config patches applied to an already-open repository.
//!
//! # Invariants
//! - A config that fails `validate()` is never written to disk.
//! - Defaults are only produced for repositories that do not exist yet.

use crate::repo::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Latest config document version this binary writes and understands.
pub const REPO_CONFIG_VERSION: u32 = 1;
/// File name of the config document inside the repository root.
pub const CONFIG_FILE_NAME: &str = "config";

const DEFAULT_DATASTORE_FILE: &str = "datastore.sqlite3";
const DEFAULT_STORAGE_MAX_MB: u64 = 10 * 1024;
const DEFAULT_SWARM_ADDRESSES: &[&str] = &[
    "/ip4/0.0.0.0/tcp/4001",
    "/ip6/::/tcp/4001",
    "/ip4/0.0.0.0/udp/4001/quic-v1",
];
const DEFAULT_API_ADDRESS: &str = "/ip4/127.0.0.1/tcp/5001";

/// Persisted repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub version: u32,
    pub identity: IdentityConfig,
    pub datastore: DatastoreConfig,
    pub addresses: AddressesConfig,
    #[serde(default)]
    pub bootstrap: Vec<String>,
    #[serde(default)]
    pub experimental: ExperimentalConfig,
}

/// Node identity minted when the repository is first initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Opaque peer identifier, stable for the lifetime of the repository.
    pub peer_id: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Datastore file name, relative to the repository root.
    pub file_name: String,
    pub storage_max_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressesConfig {
    pub swarm: Vec<String>,
    pub api: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentalConfig {
    #[serde(default)]
    pub pubsub: bool,
    #[serde(default)]
    pub ipns_pubsub: bool,
}

impl RepoConfig {
    /// Builds first-run defaults with a freshly generated peer identity.
    pub fn default_with_identity() -> Self {
        Self {
            version: REPO_CONFIG_VERSION,
            identity: IdentityConfig {
                peer_id: Uuid::new_v4().simple().to_string(),
                created_at_ms: now_epoch_ms(),
            },
            datastore: DatastoreConfig {
                file_name: DEFAULT_DATASTORE_FILE.to_string(),
                storage_max_mb: DEFAULT_STORAGE_MAX_MB,
            },
            addresses: AddressesConfig {
                swarm: DEFAULT_SWARM_ADDRESSES
                    .iter()
                    .map(|addr| (*addr).to_string())
                    .collect(),
                api: DEFAULT_API_ADDRESS.to_string(),
            },
            bootstrap: Vec::new(),
            experimental: ExperimentalConfig::default(),
        }
    }

    /// Validates structural config invariants.
    ///
    /// # Errors
    /// - Returns `RepoError::Config` when the identity is missing, the
    ///   version is unknown, or the datastore file name escapes the root.
    pub fn validate(&self) -> RepoResult<()> {
        if self.version == 0 || self.version > REPO_CONFIG_VERSION {
            return Err(RepoError::Config(format!(
                "unsupported config version {} (latest {REPO_CONFIG_VERSION})",
                self.version
            )));
        }
        if self.identity.peer_id.trim().is_empty() {
            return Err(RepoError::Config("identity.peer_id cannot be empty".to_string()));
        }
        let file_name = self.datastore.file_name.trim();
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
            return Err(RepoError::Config(format!(
                "datastore.file_name must be a plain file name, got `{}`",
                self.datastore.file_name
            )));
        }
        Ok(())
    }
}

/// Mutation applied to an open repository's config.
pub type RepoConfigPatch = Box<dyn Fn(&mut RepoConfig) -> RepoResult<()> + Send + Sync>;

/// Composes patches into one that applies them in order.
///
/// Empty slots are skipped; the first failing patch stops the chain and its
/// error is returned.
pub fn chain_config_patches(patches: Vec<Option<RepoConfigPatch>>) -> RepoConfigPatch {
    Box::new(move |config: &mut RepoConfig| {
        for patch in patches.iter().flatten() {
            patch(config)?;
        }
        Ok(())
    })
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
