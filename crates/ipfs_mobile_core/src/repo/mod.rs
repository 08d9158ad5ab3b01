//! Repository Store contract and implementations.
//!
//! # Responsibility
//! - Define the narrow open/initialize/close contract the lifecycle layer
//!   consumes.
//! - Report repository absence and corruption as explicit open outcomes
//!   instead of errors.
//!
//! # Invariants
//! - `initialize` never overwrites an existing repository configuration.
//! - A store hands out at most one live handle per repository path.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

pub mod config;
pub mod fs_repo;

pub use config::{chain_config_patches, RepoConfig, RepoConfigPatch};
pub use fs_repo::{FsRepository, FsRepositoryStore};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository provisioning, open and close failures.
#[derive(Debug)]
pub enum RepoError {
    Io { path: PathBuf, source: io::Error },
    Db(DbError),
    Config(String),
    AlreadyInitialized(PathBuf),
    Locked(PathBuf),
    InUse(PathBuf),
    /// Open still did not yield a handle right after initialization.
    Unavailable { path: PathBuf, reason: String },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "repository io error at `{}`: {source}", path.display()),
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(message) => write!(f, "invalid repository config: {message}"),
            Self::AlreadyInitialized(path) => {
                write!(f, "repository already initialized at `{}`", path.display())
            }
            Self::Locked(path) => write!(f, "repository at `{}` is already open", path.display()),
            Self::InUse(path) => write!(
                f,
                "repository at `{}` is still in use by a running node",
                path.display()
            ),
            Self::Unavailable { path, reason } => write!(
                f,
                "repository at `{}` unavailable after initialization: {reason}",
                path.display()
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::Config(_)
            | Self::AlreadyInitialized(_)
            | Self::Locked(_)
            | Self::InUse(_)
            | Self::Unavailable { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of asking a store to open the repository at a path.
#[derive(Debug)]
pub enum OpenOutcome<H> {
    Opened(H),
    /// No repository has been initialized at the path.
    NotFound,
    /// Something exists at the path but is not a usable repository.
    Corrupt(String),
}

/// Persistent repository provider consumed by the lifecycle manager.
pub trait RepositoryStore {
    type Handle;

    /// Opens an existing repository.
    ///
    /// `Err` is reserved for genuine failures (permissions, locking,
    /// datastore errors); absence and corruption are reported as outcomes.
    fn open(&self, path: &Path) -> RepoResult<OpenOutcome<Self::Handle>>;
    fn initialize(&self, path: &Path, config: &RepoConfig) -> RepoResult<()>;
    fn default_config(&self) -> RepoResult<RepoConfig>;
    fn close(&self, handle: Self::Handle) -> RepoResult<()>;
}
