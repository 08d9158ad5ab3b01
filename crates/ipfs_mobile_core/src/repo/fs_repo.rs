//! Filesystem-backed Repository Store.
//!
//! # Responsibility
//! - Lay out a repository as `<root>/config` plus a SQLite datastore file.
//! - Detect absent or malformed repositories without side effects.
//! - Guarantee a single open handle per repository root in this process.
//!
//! # Invariants
//! - `config` is written last during initialization; its presence marks a
//!   fully provisioned repository.
//! - Config writes go through a temp file + rename, never in place.
//! - Closing fails with `InUse` while a node still shares the datastore.

use crate::db::open_db;
use crate::repo::config::CONFIG_FILE_NAME;
use crate::repo::{OpenOutcome, RepoConfig, RepoConfigPatch, RepoError, RepoResult, RepositoryStore};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

const CONFIG_TMP_SUFFIX: &str = ".tmp";

static OPEN_ROOTS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Store that provisions repositories on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRepositoryStore;

impl FsRepositoryStore {
    pub fn new() -> Self {
        Self
    }
}

/// Open repository handle.
///
/// Owns the datastore connection and the process-wide open marker for its
/// root. Dropping the handle without `close` still releases the marker.
#[derive(Debug)]
pub struct FsRepository {
    root: PathBuf,
    config: RepoConfig,
    datastore: Arc<Mutex<Connection>>,
    _lock: RootLock,
}

impl FsRepository {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Shared datastore connection for engines bound to this repository.
    ///
    /// Every clone must be dropped before the repository can be closed.
    pub fn shared_datastore(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.datastore)
    }

    /// Applies a config patch and persists the result.
    ///
    /// The in-memory config only changes when the patched document validates
    /// and has been written to disk.
    pub fn apply_patches(&mut self, patch: &RepoConfigPatch) -> RepoResult<()> {
        let mut patched = self.config.clone();
        patch(&mut patched)?;
        patched.validate()?;
        write_config(&self.root, &patched)?;
        info!(
            "event=repo_config_patch module=repo status=ok root={}",
            self.root.display()
        );
        self.config = patched;
        Ok(())
    }
}

impl RepositoryStore for FsRepositoryStore {
    type Handle = FsRepository;

    fn open(&self, path: &Path) -> RepoResult<OpenOutcome<FsRepository>> {
        let started_at = Instant::now();
        let config_path = path.join(CONFIG_FILE_NAME);

        let raw = match fs::read_to_string(&config_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("event=repo_open module=repo status=not_found");
                return Ok(OpenOutcome::NotFound);
            }
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Ok(corrupt(format!("config is not valid UTF-8: {err}")));
            }
            Err(err) => {
                error!("event=repo_open module=repo status=error error_code=config_read_failed error={err}");
                return Err(RepoError::Io {
                    path: config_path,
                    source: err,
                });
            }
        };

        let config: RepoConfig = match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(err) => return Ok(corrupt(format!("config is not parseable: {err}"))),
        };
        if let Err(err) = config.validate() {
            return Ok(corrupt(err.to_string()));
        }

        let lock = RootLock::acquire(path)?;
        let datastore = open_db(path.join(&config.datastore.file_name)).map_err(|err| {
            error!("event=repo_open module=repo status=error error_code=datastore_failed error={err}");
            RepoError::from(err)
        })?;

        info!(
            "event=repo_open module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(OpenOutcome::Opened(FsRepository {
            root: path.to_path_buf(),
            config,
            datastore: Arc::new(Mutex::new(datastore)),
            _lock: lock,
        }))
    }

    fn initialize(&self, path: &Path, config: &RepoConfig) -> RepoResult<()> {
        let started_at = Instant::now();
        config.validate()?;

        fs::create_dir_all(path).map_err(|source| RepoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.join(CONFIG_FILE_NAME).exists() {
            warn!("event=repo_init module=repo status=error error_code=already_initialized");
            return Err(RepoError::AlreadyInitialized(path.to_path_buf()));
        }

        // Config must land last; until then the root still opens as NotFound.
        let datastore = open_db(path.join(&config.datastore.file_name))?;
        datastore
            .close()
            .map_err(|(_, err)| RepoError::from(err))?;
        write_config(path, config)?;

        info!(
            "event=repo_init module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn default_config(&self) -> RepoResult<RepoConfig> {
        Ok(RepoConfig::default_with_identity())
    }

    fn close(&self, handle: FsRepository) -> RepoResult<()> {
        let FsRepository {
            root,
            datastore,
            _lock,
            ..
        } = handle;

        let Ok(datastore) = Arc::try_unwrap(datastore) else {
            error!("event=repo_close module=repo status=error error_code=datastore_in_use");
            return Err(RepoError::InUse(root));
        };
        let conn = datastore.into_inner().unwrap_or_else(PoisonError::into_inner);
        conn.close().map_err(|(_, err)| {
            error!("event=repo_close module=repo status=error error_code=datastore_close_failed error={err}");
            RepoError::from(err)
        })?;

        info!("event=repo_close module=repo status=ok");
        Ok(())
    }
}

fn corrupt(reason: String) -> OpenOutcome<FsRepository> {
    warn!("event=repo_open module=repo status=corrupt reason={reason}");
    OpenOutcome::Corrupt(reason)
}

fn write_config(root: &Path, config: &RepoConfig) -> RepoResult<()> {
    let final_path = root.join(CONFIG_FILE_NAME);
    let tmp_path = root.join(format!("{CONFIG_FILE_NAME}{CONFIG_TMP_SUFFIX}"));
    let encoded = serde_json::to_vec_pretty(config)
        .map_err(|err| RepoError::Config(format!("failed to encode config: {err}")))?;

    let write = || -> io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &final_path)
    };
    write().map_err(|source| RepoError::Io {
        path: final_path.clone(),
        source,
    })
}

/// Process-wide marker that a repository root has a live handle.
#[derive(Debug)]
struct RootLock {
    key: PathBuf,
}

impl RootLock {
    fn acquire(root: &Path) -> RepoResult<Self> {
        let key = fs::canonicalize(root).map_err(|source| RepoError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let mut open_roots = OPEN_ROOTS.lock().unwrap_or_else(PoisonError::into_inner);
        if !open_roots.insert(key.clone()) {
            warn!("event=repo_open module=repo status=error error_code=repo_locked");
            return Err(RepoError::Locked(root.to_path_buf()));
        }
        Ok(Self { key })
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        OPEN_ROOTS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
