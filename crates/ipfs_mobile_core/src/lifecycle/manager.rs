//! Lifecycle manager state machine.
//!
//! # Invariants
//! - State is a tagged union: a node handle can only exist next to its
//!   repository handle.
//! - All state reads and transitions happen under one mutex.
//! - `stop` clears every handle it found, whatever the close outcomes.

use crate::lifecycle::{LifecycleError, LifecycleResult};
use crate::node::{LocalNodeEngine, NodeEngine, NodeIdentity};
use crate::repo::{FsRepositoryStore, OpenOutcome, RepoError, RepoResult, RepositoryStore};
use log::{error, info, warn};
use std::fs;
use std::io::{self, ErrorKind};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

const NOT_STARTED: &str = "node is not started";

enum LifecycleState<R, N> {
    Unstarted,
    /// Repository open without a node, e.g. after a failed node start.
    RepoOnly(R),
    // Field order matters for drop: node goes before repo.
    Running { node: N, repo: R },
}

/// Owns one repository and at most one node bound to it.
pub struct LifecycleManager<S, E>
where
    S: RepositoryStore,
    E: NodeEngine<Repo = S::Handle>,
{
    repo_path: PathBuf,
    store: S,
    engine: E,
    state: Mutex<LifecycleState<S::Handle, E::Node>>,
}

/// Manager over the filesystem store and the in-process engine.
pub type LocalNodeManager = LifecycleManager<FsRepositoryStore, LocalNodeEngine>;

impl LocalNodeManager {
    /// Binds a manager with the default filesystem store and local engine.
    pub fn new_local(repo_path: impl Into<PathBuf>) -> LifecycleResult<Self> {
        Self::new(repo_path, FsRepositoryStore::new(), LocalNodeEngine::new())
    }
}

impl<S, E> LifecycleManager<S, E>
where
    S: RepositoryStore,
    E: NodeEngine<Repo = S::Handle>,
{
    /// Binds the manager to `repo_path` and makes sure the directory exists.
    ///
    /// No repository or node is opened here.
    ///
    /// # Errors
    /// - `LifecycleError::Filesystem` when the path is empty or the
    ///   directory cannot be created. The instance must not be reused.
    pub fn new(repo_path: impl Into<PathBuf>, store: S, engine: E) -> LifecycleResult<Self> {
        let repo_path = repo_path.into();
        if repo_path.as_os_str().is_empty() {
            return Err(LifecycleError::Filesystem {
                path: repo_path,
                source: io::Error::new(ErrorKind::InvalidInput, "storage path cannot be empty"),
            });
        }
        if let Err(source) = fs::create_dir_all(&repo_path) {
            error!(
                "event=manager_init module=lifecycle status=error error_code=filesystem_error error={source}"
            );
            return Err(LifecycleError::Filesystem {
                path: repo_path,
                source,
            });
        }

        info!("event=manager_init module=lifecycle status=ok");
        Ok(Self {
            repo_path,
            store,
            engine,
            state: Mutex::new(LifecycleState::Unstarted),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Opens (or provisions) the repository and starts the node.
    ///
    /// Calling this while the node runs is a no-op.
    ///
    /// # Errors
    /// - `LifecycleError::Repository` when the repository can neither be
    ///   opened nor provisioned; nothing is retained.
    /// - `LifecycleError::NodeStart` when node construction fails; the open
    ///   repository is kept so a retry skips reopening it.
    pub fn start(&self) -> LifecycleResult<()> {
        let started_at = Instant::now();
        let mut state = self.lock_state();

        let repo = match mem::replace(&mut *state, LifecycleState::Unstarted) {
            running @ LifecycleState::Running { .. } => {
                *state = running;
                info!("event=node_start module=lifecycle status=noop");
                return Ok(());
            }
            LifecycleState::RepoOnly(repo) => repo,
            LifecycleState::Unstarted => match self.acquire_repository() {
                Ok(repo) => repo,
                Err(err) => {
                    error!(
                        "event=node_start module=lifecycle status=error duration_ms={} error_code=repository_error error={err}",
                        started_at.elapsed().as_millis()
                    );
                    return Err(err.into());
                }
            },
        };

        let config = self.engine.default_config();
        match self.engine.construct(&repo, config) {
            Ok(node) => {
                *state = LifecycleState::Running { node, repo };
                info!(
                    "event=node_start module=lifecycle status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                *state = LifecycleState::RepoOnly(repo);
                error!(
                    "event=node_start module=lifecycle status=error duration_ms={} error_code=node_start_error error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(LifecycleError::NodeStart(err))
            }
        }
    }

    /// Closes the node, then the repository.
    ///
    /// Repository close is attempted even when node close fails, and both
    /// handles are released either way. Calling this when nothing is open is
    /// a no-op.
    ///
    /// # Errors
    /// - `LifecycleError::NodeStop` when node close fails; carries the
    ///   repository close failure too when both fail.
    /// - `LifecycleError::Repository` when only repository close fails.
    pub fn stop(&self) -> LifecycleResult<()> {
        let started_at = Instant::now();
        let mut state = self.lock_state();

        let (node, repo) = match mem::replace(&mut *state, LifecycleState::Unstarted) {
            LifecycleState::Unstarted => {
                info!("event=node_stop module=lifecycle status=noop");
                return Ok(());
            }
            LifecycleState::RepoOnly(repo) => (None, repo),
            LifecycleState::Running { node, repo } => (Some(node), repo),
        };

        let node_result = node.map_or(Ok(()), |node| self.engine.close(node));
        let repo_result = self.store.close(repo);

        let outcome = match (node_result, repo_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(repo_err)) => Err(LifecycleError::Repository(repo_err)),
            (Err(source), repo_result) => Err(LifecycleError::NodeStop {
                source,
                repository: repo_result.err(),
            }),
        };
        match &outcome {
            Ok(()) => info!(
                "event=node_stop module=lifecycle status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=node_stop module=lifecycle status=error duration_ms={} error_code={} error={err}",
                started_at.elapsed().as_millis(),
                err.code()
            ),
        }
        outcome
    }

    /// Returns whether a node is currently running.
    pub fn is_started(&self) -> bool {
        matches!(*self.lock_state(), LifecycleState::Running { .. })
    }

    /// Returns the running node's identity.
    ///
    /// # Errors
    /// - `LifecycleError::IllegalState` when the node is not started.
    pub fn identity(&self) -> LifecycleResult<NodeIdentity> {
        self.with_node(|node| self.engine.identity(node))
    }

    /// Runs `f` against the running node while holding the state lock.
    ///
    /// # Errors
    /// - `LifecycleError::IllegalState` when the node is not started.
    pub fn with_node<T>(&self, f: impl FnOnce(&E::Node) -> T) -> LifecycleResult<T> {
        match &*self.lock_state() {
            LifecycleState::Running { node, .. } => Ok(f(node)),
            LifecycleState::Unstarted | LifecycleState::RepoOnly(_) => {
                Err(LifecycleError::IllegalState(NOT_STARTED))
            }
        }
    }

    fn acquire_repository(&self) -> RepoResult<S::Handle> {
        match self.store.open(&self.repo_path)? {
            OpenOutcome::Opened(repo) => return Ok(repo),
            OpenOutcome::NotFound => {
                info!("event=repo_init module=lifecycle status=start reason=not_found");
            }
            OpenOutcome::Corrupt(reason) => {
                warn!("event=repo_init module=lifecycle status=start reason=corrupt detail={reason}");
            }
        }

        let config = self.store.default_config()?;
        self.store.initialize(&self.repo_path, &config)?;

        match self.store.open(&self.repo_path)? {
            OpenOutcome::Opened(repo) => Ok(repo),
            OpenOutcome::NotFound => Err(RepoError::Unavailable {
                path: self.repo_path.clone(),
                reason: "repository not found".to_string(),
            }),
            OpenOutcome::Corrupt(reason) => Err(RepoError::Unavailable {
                path: self.repo_path.clone(),
                reason,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState<S::Handle, E::Node>> {
        // Transitions only ever store whole states; poisoned values are usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, E> Drop for LifecycleManager<S, E>
where
    S: RepositoryStore,
    E: NodeEngine<Repo = S::Handle>,
{
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(
                "event=manager_drop module=lifecycle status=error error_code={} error={err}",
                err.code()
            );
        }
    }
}
