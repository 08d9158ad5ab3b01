//! Lifecycle manager error surface.

use crate::node::NodeError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Failures surfaced to the host by the lifecycle manager.
#[derive(Debug)]
pub enum LifecycleError {
    /// The storage directory could not be created. The manager is unusable.
    Filesystem { path: PathBuf, source: io::Error },
    Repository(RepoError),
    NodeStart(NodeError),
    /// Node close failed. `repository` carries the repository close failure
    /// when teardown of both handles failed.
    NodeStop {
        source: NodeError,
        repository: Option<RepoError>,
    },
    IllegalState(&'static str),
}

impl LifecycleError {
    /// Stable machine-readable code for logs and host envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Filesystem { .. } => "filesystem_error",
            Self::Repository(_) => "repository_error",
            Self::NodeStart(_) => "node_start_error",
            Self::NodeStop { .. } => "node_stop_error",
            Self::IllegalState(_) => "illegal_state",
        }
    }
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filesystem { path, source } => write!(
                f,
                "failed to prepare storage directory `{}`: {source}",
                path.display()
            ),
            Self::Repository(err) => write!(f, "repository error: {err}"),
            Self::NodeStart(err) => write!(f, "failed to start node: {err}"),
            Self::NodeStop {
                source,
                repository: None,
            } => write!(f, "failed to stop node: {source}"),
            Self::NodeStop {
                source,
                repository: Some(repo_err),
            } => write!(
                f,
                "failed to stop node: {source}; repository close also failed: {repo_err}"
            ),
            Self::IllegalState(message) => write!(f, "illegal state: {message}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Filesystem { source, .. } => Some(source),
            Self::Repository(err) => Some(err),
            Self::NodeStart(err) => Some(err),
            Self::NodeStop { source, .. } => Some(source),
            Self::IllegalState(_) => None,
        }
    }
}

impl From<RepoError> for LifecycleError {
    fn from(value: RepoError) -> Self {
        Self::Repository(value)
    }
}
