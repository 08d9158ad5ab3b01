//! Node Engine contract and node-level configuration.
//!
//! # Responsibility
//! - Define how a running node is constructed from an open repository and
//!   how it is closed again.
//! - Provide the transient per-start `NodeConfig`.
//!
//! # Invariants
//! - A node is bound to exactly one open repository for its whole life.
//! - `NodeConfig` is never persisted; each start builds a fresh one.

use crate::db::DbError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod local;

pub use local::{LocalNode, LocalNodeEngine};

pub type NodeResult<T> = Result<T, NodeError>;

/// Node construction and teardown failures.
#[derive(Debug)]
pub enum NodeError {
    InvalidConfig(String),
    Db(DbError),
    InvalidBlock(String),
}

impl Display for NodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(message) => write!(f, "invalid node config: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidBlock(message) => write!(f, "invalid block: {message}"),
        }
    }
}

impl Error for NodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidConfig(_) | Self::InvalidBlock(_) => None,
        }
    }
}

impl From<DbError> for NodeError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for NodeError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Content routing strategy requested for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    Dht,
    DhtClient,
    None,
}

impl RoutingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dht => "dht",
            Self::DhtClient => "dhtclient",
            Self::None => "none",
        }
    }
}

/// Local network discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsConfig {
    pub enabled: bool,
    pub discovery_timeout_secs: u64,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            discovery_timeout_secs: 30,
        }
    }
}

/// Transient configuration handed to the engine on every start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub online: bool,
    pub routing: Option<RoutingMode>,
    pub mdns: Option<MdnsConfig>,
    /// Feature switches such as `pubsub` or `ipnsps`.
    pub extra_opts: BTreeMap<String, bool>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            online: true,
            routing: None,
            mdns: None,
            extra_opts: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Fills unset optional sections with engine defaults.
    pub fn fill_default(&mut self) {
        if self.routing.is_none() {
            self.routing = Some(RoutingMode::Dht);
        }
        if self.mdns.is_none() {
            self.mdns = Some(MdnsConfig::default());
        }
    }

    pub fn extra_opt(&self, name: &str) -> bool {
        self.extra_opts.get(name).copied().unwrap_or(false)
    }
}

/// Identity descriptor reported by a running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub peer_id: String,
    pub addresses: Vec<String>,
    pub agent_version: String,
}

/// Engine that turns an open repository into a running node.
pub trait NodeEngine {
    type Repo;
    type Node;

    fn default_config(&self) -> NodeConfig;
    fn construct(&self, repo: &Self::Repo, config: NodeConfig) -> NodeResult<Self::Node>;
    fn close(&self, node: Self::Node) -> NodeResult<()>;
    fn identity(&self, node: &Self::Node) -> NodeIdentity;
}

#[cfg(test)]
mod tests {
    use super::{MdnsConfig, NodeConfig, RoutingMode};

    #[test]
    fn fill_default_sets_dht_and_mdns() {
        let mut config = NodeConfig::default();
        config.fill_default();

        assert_eq!(config.routing, Some(RoutingMode::Dht));
        assert_eq!(config.mdns, Some(MdnsConfig::default()));
        assert!(config.extra_opts.is_empty());
    }

    #[test]
    fn fill_default_keeps_explicit_values() {
        let mut config = NodeConfig {
            routing: Some(RoutingMode::DhtClient),
            ..NodeConfig::default()
        };
        config.extra_opts.insert("pubsub".to_string(), true);
        config.fill_default();

        assert_eq!(config.routing, Some(RoutingMode::DhtClient));
        assert!(config.extra_opt("pubsub"));
        assert!(!config.extra_opt("ipnsps"));
    }
}
