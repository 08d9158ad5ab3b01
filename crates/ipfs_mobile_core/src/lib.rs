//! Core runtime for the ipfs-mobile node.
//! Owns the repository/node lifecycle and the local storage it runs on.

pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod node;
pub mod repo;

pub use lifecycle::{LifecycleError, LifecycleManager, LifecycleResult, LocalNodeManager};
pub use logging::{default_log_level, init_logging, logging_status};
pub use node::{
    LocalNode, LocalNodeEngine, NodeConfig, NodeEngine, NodeError, NodeIdentity, NodeResult,
    RoutingMode,
};
pub use repo::{
    chain_config_patches, FsRepository, FsRepositoryStore, OpenOutcome, RepoConfig,
    RepoConfigPatch, RepoError, RepoResult, RepositoryStore,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
