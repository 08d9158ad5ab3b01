//! FFI node lifecycle API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose construct/start/stop/query over one process-wide node slot.
//! - Translate lifecycle errors into stable response envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - The slot never rebinds to another path while a node is running.

use ipfs_mobile_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    LifecycleError, LocalNodeManager,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const REPO_PATH_ENV: &str = "IPFS_MOBILE_REPO_PATH";
const DEFAULT_REPO_DIR_NAME: &str = "ipfs_mobile_repo";

static NODE_SLOT: Mutex<Option<Arc<LocalNodeManager>>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory for rolling logs.
/// - Returns empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Result envelope for lifecycle commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeActionResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Stable error code (`repository_error`, `node_start_error`, ...).
    pub error_code: Option<String>,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl NodeActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            error_code: None,
            message: message.into(),
        }
    }

    fn failure(operation: &str, err: &LifecycleError) -> Self {
        Self {
            ok: false,
            error_code: Some(err.code().to_string()),
            message: format!("{operation} failed: {err}"),
        }
    }

    fn not_bound(operation: &str) -> Self {
        Self {
            ok: false,
            error_code: Some("illegal_state".to_string()),
            message: format!("{operation} failed: call node_init first"),
        }
    }
}

/// Identity envelope for the running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentityResponse {
    pub ok: bool,
    pub peer_id: Option<String>,
    pub addresses: Vec<String>,
    pub agent_version: Option<String>,
    pub message: String,
}

/// Binds the process-wide node slot to a repository path.
///
/// Input semantics:
/// - `repo_path`: repository directory; empty falls back to
///   `IPFS_MOBILE_REPO_PATH`, then to a temp-dir default.
///
/// # FFI contract
/// - Sync call; creates the directory but opens nothing.
/// - Rebinding to the same path is a no-op.
/// - Rebinding to another path fails while the node is running.
/// - Returns empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn node_init(repo_path: String) -> String {
    let path = resolve_repo_path(repo_path.as_str());
    let mut slot = lock_slot();

    if let Some(current) = slot.as_ref() {
        if current.repo_path() == path {
            return String::new();
        }
        if current.is_started() {
            warn!("event=node_init module=ffi status=error error_code=node_running");
            return format!(
                "node is running at `{}`; stop it before binding `{}`",
                current.repo_path().display(),
                path.display()
            );
        }
    }

    match LocalNodeManager::new_local(path) {
        Ok(manager) => {
            // Replacing the slot drops the previous manager, releasing any
            // repository it still held.
            *slot = Some(Arc::new(manager));
            info!("event=node_init module=ffi status=ok");
            String::new()
        }
        Err(err) => format!("node_init failed: {err}"),
    }
}

/// Starts the bound node, provisioning its repository on first use.
///
/// # FFI contract
/// - Sync, blocking call; safe to repeat while running.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn node_start() -> NodeActionResponse {
    let Some(manager) = bound_manager() else {
        return NodeActionResponse::not_bound("node_start");
    };
    match manager.start() {
        Ok(()) => NodeActionResponse::success("Node started."),
        Err(err) => NodeActionResponse::failure("node_start", &err),
    }
}

/// Stops the bound node and closes its repository.
///
/// # FFI contract
/// - Sync, blocking call; safe to repeat, and a no-op before `node_init`.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn node_stop() -> NodeActionResponse {
    let Some(manager) = bound_manager() else {
        return NodeActionResponse::success("Node not bound; nothing to stop.");
    };
    match manager.stop() {
        Ok(()) => NodeActionResponse::success("Node stopped."),
        Err(err) => NodeActionResponse::failure("node_stop", &err),
    }
}

/// Returns whether the bound node is running.
#[flutter_rust_bridge::frb(sync)]
pub fn node_is_started() -> bool {
    bound_manager().is_some_and(|manager| manager.is_started())
}

/// Reports the running node's identity.
///
/// # FFI contract
/// - Returns `ok=false` with a message when no node is running.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn node_identity() -> NodeIdentityResponse {
    let identity = match bound_manager() {
        Some(manager) => manager.identity(),
        None => Err(LifecycleError::IllegalState("node is not started")),
    };
    match identity {
        Ok(identity) => NodeIdentityResponse {
            ok: true,
            peer_id: Some(identity.peer_id),
            addresses: identity.addresses,
            agent_version: Some(identity.agent_version),
            message: String::new(),
        },
        Err(err) => NodeIdentityResponse {
            ok: false,
            peer_id: None,
            addresses: Vec::new(),
            agent_version: None,
            message: format!("node_identity failed: {err}"),
        },
    }
}

fn bound_manager() -> Option<Arc<LocalNodeManager>> {
    lock_slot().as_ref().map(Arc::clone)
}

fn lock_slot() -> MutexGuard<'static, Option<Arc<LocalNodeManager>>> {
    NODE_SLOT.lock().unwrap_or_else(PoisonError::into_inner)
}

fn resolve_repo_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        return PathBuf::from(trimmed);
    }
    if let Ok(from_env) = std::env::var(REPO_PATH_ENV) {
        let from_env = from_env.trim();
        if !from_env.is_empty() {
            return PathBuf::from(from_env);
        }
    }
    std::env::temp_dir().join(DEFAULT_REPO_DIR_NAME)
}
