//! Repository/node lifecycle management.
//!
//! # Responsibility
//! - Bind one repository path to at most one open repository and one
//!   running node.
//! - Provision the repository on first start and tear both down in order.
//!
//! # Invariants
//! - A running node always has its repository open.
//! - `start` and `stop` are idempotent.
//! - The node is closed before the repository, every time.

mod error;
mod manager;

pub use error::{LifecycleError, LifecycleResult};
pub use manager::{LifecycleManager, LocalNodeManager};
