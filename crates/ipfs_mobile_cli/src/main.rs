//! CLI smoke entry point.
//!
//! # Responsibility
//! - Start a node against a repository path, print its identity, stop it.
//! - Exit non-zero when any lifecycle step fails.
//!
//! Usage: `ipfs_mobile_cli [repo_path]`. Set `IPFS_MOBILE_LOG_DIR` to an
//! absolute directory to enable file logging.

use ipfs_mobile_core::{default_log_level, init_logging, LifecycleResult, LocalNodeManager};
use std::process::ExitCode;

const DEFAULT_REPO_PATH: &str = "ipfs_repo_test";
const LOG_DIR_ENV: &str = "IPFS_MOBILE_LOG_DIR";

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let repo_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_REPO_PATH.to_string());
    println!("ipfs_mobile_core version={}", ipfs_mobile_core::core_version());
    println!("repo_path={repo_path}");

    match run(&repo_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {err}", err.code());
            ExitCode::FAILURE
        }
    }
}

fn run(repo_path: &str) -> LifecycleResult<()> {
    let manager = LocalNodeManager::new_local(repo_path)?;
    manager.start()?;

    let identity = manager.identity()?;
    println!("peer_id={}", identity.peer_id);
    println!("agent_version={}", identity.agent_version);
    for address in &identity.addresses {
        println!("address={address}");
    }

    manager.stop()?;
    println!("stopped");
    Ok(())
}
