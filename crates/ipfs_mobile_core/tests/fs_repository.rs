use ipfs_mobile_core::repo::config::CONFIG_FILE_NAME;
use ipfs_mobile_core::{
    chain_config_patches, FsRepository, FsRepositoryStore, OpenOutcome, RepoConfig,
    RepoConfigPatch, RepoError, RepositoryStore,
};
use std::fs;
use std::path::Path;

fn open_existing(store: &FsRepositoryStore, path: &Path) -> FsRepository {
    match store.open(path).unwrap() {
        OpenOutcome::Opened(repo) => repo,
        OpenOutcome::NotFound => panic!("repository not found at {}", path.display()),
        OpenOutcome::Corrupt(reason) => panic!("repository corrupt: {reason}"),
    }
}

fn read_config(path: &Path) -> RepoConfig {
    let raw = fs::read_to_string(path.join(CONFIG_FILE_NAME)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn open_reports_not_found_for_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();

    let outcome = store.open(dir.path()).unwrap();

    assert!(matches!(outcome, OpenOutcome::NotFound));
    assert!(!dir.path().join(CONFIG_FILE_NAME).exists());
}

#[test]
fn open_reports_not_found_for_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();

    let outcome = store.open(&dir.path().join("absent")).unwrap();

    assert!(matches!(outcome, OpenOutcome::NotFound));
}

#[test]
fn initialize_then_open_yields_persisted_config() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("repo");
    let store = FsRepositoryStore::new();
    let config = store.default_config().unwrap();

    store.initialize(&root, &config).unwrap();
    let repo = open_existing(&store, &root);

    assert_eq!(repo.config(), &config);
    assert_eq!(read_config(&root), config);
    assert!(root.join(&config.datastore.file_name).is_file());
    assert_eq!(repo.root(), root);
    store.close(repo).unwrap();
}

#[test]
fn initialize_never_overwrites_existing_config() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let original = store.default_config().unwrap();
    store.initialize(dir.path(), &original).unwrap();

    let replacement = store.default_config().unwrap();
    let err = store.initialize(dir.path(), &replacement).unwrap_err();

    assert!(matches!(err, RepoError::AlreadyInitialized(_)));
    assert_eq!(read_config(dir.path()), original);
}

#[test]
fn initialize_rejects_invalid_config_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let mut config = store.default_config().unwrap();
    config.identity.peer_id = "  ".to_string();

    let err = store.initialize(dir.path(), &config).unwrap_err();

    assert!(matches!(err, RepoError::Config(_)));
    assert!(!dir.path().join(CONFIG_FILE_NAME).exists());
}

#[test]
fn open_reports_corrupt_for_unparseable_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(CONFIG_FILE_NAME), b"{ not json").unwrap();
    let store = FsRepositoryStore::new();

    let outcome = store.open(dir.path()).unwrap();

    assert!(matches!(outcome, OpenOutcome::Corrupt(reason) if reason.contains("parseable")));
}

#[test]
fn open_reports_corrupt_for_config_failing_validation() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    let mut config = store.default_config().unwrap();
    config.identity.peer_id = String::new();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        serde_json::to_vec(&config).unwrap(),
    )
    .unwrap();

    let outcome = store.open(dir.path()).unwrap();

    assert!(matches!(outcome, OpenOutcome::Corrupt(_)));
}

#[test]
fn second_open_of_same_root_is_locked_until_close() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    store
        .initialize(dir.path(), &store.default_config().unwrap())
        .unwrap();

    let first = open_existing(&store, dir.path());
    let err = store.open(dir.path()).unwrap_err();
    assert!(matches!(err, RepoError::Locked(_)));

    store.close(first).unwrap();
    let reopened = open_existing(&store, dir.path());
    drop(reopened);
    let after_drop = open_existing(&store, dir.path());
    store.close(after_drop).unwrap();
}

#[test]
fn close_fails_while_datastore_is_shared() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    store
        .initialize(dir.path(), &store.default_config().unwrap())
        .unwrap();
    let repo = open_existing(&store, dir.path());
    let share = repo.shared_datastore();

    let err = store.close(repo).unwrap_err();
    assert!(matches!(err, RepoError::InUse(_)));

    drop(share);
    let reopened = open_existing(&store, dir.path());
    store.close(reopened).unwrap();
}

#[test]
fn apply_patches_persists_patched_config() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    store
        .initialize(dir.path(), &store.default_config().unwrap())
        .unwrap();
    let mut repo = open_existing(&store, dir.path());
    let peer_id = repo.config().identity.peer_id.clone();

    let enable_pubsub: RepoConfigPatch = Box::new(|config: &mut RepoConfig| {
        config.experimental.pubsub = true;
        config.experimental.ipns_pubsub = true;
        Ok(())
    });
    let bootstrap: RepoConfigPatch = Box::new(|config: &mut RepoConfig| {
        config.bootstrap = vec!["/ip4/10.0.0.2/tcp/4001".to_string()];
        Ok(())
    });
    repo.apply_patches(&chain_config_patches(vec![Some(enable_pubsub), None, Some(bootstrap)]))
        .unwrap();

    let on_disk = read_config(dir.path());
    assert!(on_disk.experimental.pubsub);
    assert!(on_disk.experimental.ipns_pubsub);
    assert_eq!(on_disk.bootstrap, vec!["/ip4/10.0.0.2/tcp/4001"]);
    assert_eq!(on_disk.identity.peer_id, peer_id);
    assert_eq!(repo.config(), &on_disk);
    store.close(repo).unwrap();
}

#[test]
fn apply_patches_rejects_invalid_result_and_keeps_config() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRepositoryStore::new();
    store
        .initialize(dir.path(), &store.default_config().unwrap())
        .unwrap();
    let mut repo = open_existing(&store, dir.path());
    let before = repo.config().clone();

    let wipe_identity: RepoConfigPatch = Box::new(|config: &mut RepoConfig| {
        config.identity.peer_id.clear();
        Ok(())
    });
    let err = repo.apply_patches(&wipe_identity).unwrap_err();

    assert!(matches!(err, RepoError::Config(_)));
    assert_eq!(repo.config(), &before);
    assert_eq!(read_config(dir.path()), before);
    store.close(repo).unwrap();
}
