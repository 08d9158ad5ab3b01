use ipfs_mobile_core::{
    FsRepository, FsRepositoryStore, LocalNodeEngine, NodeConfig, NodeEngine, NodeError,
    OpenOutcome, RepoError, RepositoryStore, RoutingMode,
};
use std::path::Path;

fn provisioned_repo(store: &FsRepositoryStore, path: &Path) -> FsRepository {
    store
        .initialize(path, &store.default_config().unwrap())
        .unwrap();
    match store.open(path).unwrap() {
        OpenOutcome::Opened(repo) => repo,
        _ => panic!("freshly initialized repository should open"),
    }
}

#[test]
fn construct_records_session_and_reports_repository_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let engine = LocalNodeEngine::new();
    let repo = provisioned_repo(&store, dir.path());

    let node = engine.construct(&repo, engine.default_config()).unwrap();
    let identity = engine.identity(&node);

    assert_eq!(identity.peer_id, repo.config().identity.peer_id);
    assert_eq!(identity.addresses, repo.config().addresses.swarm);
    assert!(identity.agent_version.starts_with("ipfs-mobile/"));
    assert_eq!(node.config().routing, Some(RoutingMode::Dht));

    let datastore = repo.shared_datastore();
    let (routing, stopped): (String, Option<i64>) = datastore
        .lock()
        .unwrap()
        .query_row(
            "SELECT routing, stopped_at_ms FROM node_sessions WHERE id = ?1;",
            [node.session_id()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(routing, "dht");
    assert_eq!(stopped, None);
    drop(datastore);

    let session_id = node.session_id();
    engine.close(node).unwrap();
    let stopped: Option<i64> = repo
        .shared_datastore()
        .lock()
        .unwrap()
        .query_row(
            "SELECT stopped_at_ms FROM node_sessions WHERE id = ?1;",
            [session_id],
            |row| row.get(0),
        )
        .unwrap();
    assert!(stopped.is_some());
    store.close(repo).unwrap();
}

#[test]
fn offline_node_advertises_no_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let engine = LocalNodeEngine::new();
    let repo = provisioned_repo(&store, dir.path());
    let config = NodeConfig {
        online: false,
        ..NodeConfig::default()
    };

    let node = engine.construct(&repo, config).unwrap();

    assert!(engine.identity(&node).addresses.is_empty());
    engine.close(node).unwrap();
    store.close(repo).unwrap();
}

#[test]
fn construct_rejects_blank_extra_option_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let engine = LocalNodeEngine::new();
    let repo = provisioned_repo(&store, dir.path());
    let mut config = NodeConfig::default();
    config.extra_opts.insert(" ".to_string(), true);

    let err = engine.construct(&repo, config).unwrap_err();

    assert!(matches!(err, NodeError::InvalidConfig(_)));
    store.close(repo).unwrap();
}

#[test]
fn blocks_are_immutable_once_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let engine = LocalNodeEngine::new();
    let repo = provisioned_repo(&store, dir.path());
    let node = engine.construct(&repo, engine.default_config()).unwrap();

    assert!(node.put_block("bafy-hello", b"hello").unwrap());
    assert!(!node.put_block(" bafy-hello ", b"other").unwrap());

    assert_eq!(node.get_block("bafy-hello").unwrap(), Some(b"hello".to_vec()));
    assert_eq!(node.get_block("bafy-missing").unwrap(), None);
    assert_eq!(node.block_count().unwrap(), 1);
    assert!(matches!(
        node.put_block("", b"x"),
        Err(NodeError::InvalidBlock(_))
    ));

    engine.close(node).unwrap();
    store.close(repo).unwrap();
}

#[test]
fn repository_cannot_close_under_a_running_node() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let engine = LocalNodeEngine::new();
    let repo = provisioned_repo(&store, dir.path());
    let node = engine.construct(&repo, engine.default_config()).unwrap();

    let err = store.close(repo).unwrap_err();

    assert!(matches!(err, RepoError::InUse(_)));
    engine.close(node).unwrap();
}
