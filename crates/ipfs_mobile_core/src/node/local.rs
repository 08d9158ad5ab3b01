//! In-process node engine bound to a filesystem repository.
//!
//! # Responsibility
//! - Start a node session against an open `FsRepository` datastore.
//! - Serve the node identity and raw block reads/writes.
//!
//! # Invariants
//! - Every constructed node owns one `node_sessions` row; `close` stamps it.
//! - A node keeps a share of the repository datastore until closed, which
//!   blocks the repository from closing underneath it.

use crate::node::{NodeConfig, NodeEngine, NodeError, NodeIdentity, NodeResult, RoutingMode};
use crate::repo::config::now_epoch_ms;
use crate::repo::FsRepository;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const AGENT_NAME: &str = "ipfs-mobile";

/// Engine producing `LocalNode`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalNodeEngine;

impl LocalNodeEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Running node handle.
#[derive(Debug)]
pub struct LocalNode {
    session_id: i64,
    peer_id: String,
    swarm_addresses: Vec<String>,
    config: NodeConfig,
    datastore: Arc<Mutex<Connection>>,
}

impl LocalNode {
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Stores a block under `cid`.
    ///
    /// Returns `false` when a block with the same `cid` was already present;
    /// stored content is immutable.
    pub fn put_block(&self, cid: &str, data: &[u8]) -> NodeResult<bool> {
        let cid = normalize_cid(cid)?;
        let size = i64::try_from(data.len())
            .map_err(|_| NodeError::InvalidBlock(format!("block `{cid}` is too large")))?;
        let inserted = self.datastore().execute(
            "INSERT OR IGNORE INTO blocks (cid, data, size, created_at_ms)
             VALUES (?1, ?2, ?3, ?4);",
            params![cid, data, size, now_epoch_ms()],
        )?;
        Ok(inserted == 1)
    }

    pub fn get_block(&self, cid: &str) -> NodeResult<Option<Vec<u8>>> {
        let cid = normalize_cid(cid)?;
        let data = self
            .datastore()
            .query_row("SELECT data FROM blocks WHERE cid = ?1;", [cid], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(data)
    }

    pub fn block_count(&self) -> NodeResult<u64> {
        let count = self
            .datastore()
            .query_row("SELECT COUNT(*) FROM blocks;", [], |row| row.get::<_, u64>(0))?;
        Ok(count)
    }

    fn datastore(&self) -> MutexGuard<'_, Connection> {
        self.datastore.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeEngine for LocalNodeEngine {
    type Repo = FsRepository;
    type Node = LocalNode;

    fn default_config(&self) -> NodeConfig {
        NodeConfig::default()
    }

    fn construct(&self, repo: &FsRepository, mut config: NodeConfig) -> NodeResult<LocalNode> {
        config.fill_default();
        if config.extra_opts.keys().any(|name| name.trim().is_empty()) {
            return Err(NodeError::InvalidConfig(
                "extra option names cannot be empty".to_string(),
            ));
        }
        let peer_id = repo.config().identity.peer_id.clone();
        if peer_id.trim().is_empty() {
            return Err(NodeError::InvalidConfig(
                "repository has no peer identity".to_string(),
            ));
        }
        let routing = config.routing.unwrap_or(RoutingMode::Dht);

        let datastore = repo.shared_datastore();
        let session_id = {
            let conn = datastore.lock().unwrap_or_else(PoisonError::into_inner);
            conn.execute(
                "INSERT INTO node_sessions (peer_id, routing, online, started_at_ms)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    peer_id.as_str(),
                    routing.as_str(),
                    i64::from(config.online),
                    now_epoch_ms()
                ],
            )
            .map_err(|err| {
                error!("event=node_construct module=node status=error error_code=session_insert_failed error={err}");
                err
            })?;
            conn.last_insert_rowid()
        };

        info!(
            "event=node_construct module=node status=ok session_id={session_id} routing={} online={}",
            routing.as_str(),
            config.online
        );
        Ok(LocalNode {
            session_id,
            peer_id,
            swarm_addresses: repo.config().addresses.swarm.clone(),
            config,
            datastore,
        })
    }

    fn close(&self, node: LocalNode) -> NodeResult<()> {
        let stamped = node.datastore().execute(
            "UPDATE node_sessions SET stopped_at_ms = ?1 WHERE id = ?2;",
            params![now_epoch_ms(), node.session_id],
        );
        match stamped {
            Ok(_) => {
                info!(
                    "event=node_close module=node status=ok session_id={}",
                    node.session_id
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=node_close module=node status=error session_id={} error={err}",
                    node.session_id
                );
                Err(err.into())
            }
        }
    }

    fn identity(&self, node: &LocalNode) -> NodeIdentity {
        NodeIdentity {
            peer_id: node.peer_id.clone(),
            addresses: if node.config.online {
                node.swarm_addresses.clone()
            } else {
                Vec::new()
            },
            agent_version: format!("{AGENT_NAME}/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn normalize_cid(cid: &str) -> NodeResult<&str> {
    let trimmed = cid.trim();
    if trimmed.is_empty() {
        return Err(NodeError::InvalidBlock("cid cannot be empty".to_string()));
    }
    Ok(trimmed)
}
