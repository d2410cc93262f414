//! End-to-end registry behavior over the bundled stores.

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use proptest::prelude::*;
use tempfile::TempDir;

use modchain::auth::{Auth, AuthError};
use modchain::core::{ContentId, FileTree, Keypair, Signer, VersionRecord};
use modchain::store::{ContentStore, LocalStore, LocalStoreConfig, MemoryStore, SqliteStore};
use modchain::{
    Address, ChainError, ChainRegistry, Prepared, RegisterOptions, RegistryConfig, RegistryError,
    RegistryManager, LOCAL_NETWORK,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

struct Setup {
    dir: TempDir,
    store: Arc<MemoryStore>,
    registry: RegistryManager<MemoryStore>,
}

fn setup() -> Setup {
    setup_with(RegistryConfig::default())
}

fn setup_with(config: RegistryConfig) -> Setup {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::at(dir.path().join("storage")).unwrap();
    let config = RegistryConfig {
        workspace: dir.path().join("modules"),
        ..config
    };
    let store = Arc::new(MemoryStore::new());
    let registry = RegistryManager::with_shared(Arc::clone(&store), Arc::new(local), config);
    Setup {
        dir,
        store,
        registry,
    }
}

fn files(pairs: &[(&'static str, &'static str)]) -> FileTree {
    FileTree::from_pairs(pairs.iter().copied()).unwrap()
}

/// Flip one signature byte of the record stored under `id`.
async fn corrupt_signature(store: &MemoryStore, id: &ContentId) {
    let bytes = store.get(id).await.unwrap();
    let mut record = VersionRecord::from_bytes(&bytes).unwrap();
    record.signature.0[0] ^= 0xff;
    store.corrupt(id, record.to_bytes());
}

#[tokio::test]
async fn test_calc_scenario() -> anyhow::Result<()> {
    let Setup {
        dir,
        store,
        registry,
    } = setup();
    let (k1, k2) = (Keypair::derive("k1"), Keypair::derive("k2"));
    let owner = k1.address();

    let v1 = registry
        .register("calc", &files(&[("a.py", "print(1)")]), &k1, Some("one"))
        .await?;
    assert!(v1.record.prev.is_none());

    let again = registry
        .register("calc", &files(&[("a.py", "print(1)")]), &k1, None)
        .await?;
    assert_eq!(again, v1);

    let v2 = registry
        .register("calc", &files(&[("a.py", "print(2)")]), &k1, Some("two"))
        .await?;
    assert_eq!(v2.record.prev, Some(v1.id.clone()));
    assert_eq!(v2.record.created, v1.record.created);

    let history = registry.history("calc", &owner).await?;
    let ids: Vec<&ContentId> = history.iter().map(|v| &v.id).collect();
    assert_eq!(ids, vec![&v2.id, &v1.id]);

    let options = RegisterOptions {
        owner: Some(owner),
        ..RegisterOptions::default()
    };
    let rejected = registry
        .register_with("calc", &files(&[("a.py", "print(3)")]), &k2, options)
        .await;
    assert!(matches!(rejected, Err(RegistryError::OwnershipMismatch { .. })));

    registry.setback("calc", &owner, &v1.id).await?;
    let a_py = fs::read_to_string(dir.path().join("modules/calc/a.py"))?;
    assert_eq!(a_py, "print(1)");
    assert_eq!(registry.history("calc", &owner).await?[0].id, v1.id);
    assert!(registry.verify_history("calc", &owner).await?);

    corrupt_signature(&store, &v1.id).await;
    assert!(!registry.verify_history("calc", &owner).await?);
    Ok(())
}

#[tokio::test]
async fn test_history_grows_by_one_per_change() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();

    let mut previous: Option<ContentId> = None;
    for i in 0..5 {
        let tree = FileTree::new()
            .with_file("main.py", format!("print({i})"))
            .unwrap();
        let version = registry.register("counter", &tree, &k1, None).await.unwrap();

        assert_eq!(version.record.prev, previous);
        assert!(version.record.updated >= version.record.created);
        assert_eq!(registry.history("counter", &owner).await.unwrap().len(), i + 1);
        previous = Some(version.id);
    }

    let versions = registry.versions("counter", &owner).await.unwrap();
    assert_eq!(versions.len(), 5);
    assert_eq!(Some(&versions[0].id), previous.as_ref());
}

#[tokio::test]
async fn test_strict_history_rejects_tampered_record() {
    let Setup {
        dir: _dir,
        store,
        registry,
    } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();

    let v1 = registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    registry
        .register("calc", &files(&[("a.py", "2")]), &k1, None)
        .await
        .unwrap();

    corrupt_signature(&store, &v1.id).await;

    assert_eq!(registry.history_with("calc", &owner, false).await.unwrap().len(), 2);
    let strict = registry.history_with("calc", &owner, true).await;
    assert!(matches!(strict, Err(RegistryError::SignatureInvalid(id)) if id == v1.id));
    assert!(!registry.verify_history("calc", &owner).await.unwrap());
}

#[tokio::test]
async fn test_verify_history_detects_missing_record() {
    let Setup {
        dir: _dir,
        store,
        registry,
    } = setup();
    let k1 = Keypair::derive("k1");

    let v1 = registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    registry
        .register("calc", &files(&[("a.py", "2")]), &k1, None)
        .await
        .unwrap();

    assert!(store.remove(&v1.id).await.unwrap());
    assert!(!registry.verify_history("calc", &k1.address()).await.unwrap());
    assert!(matches!(
        registry.history("calc", &k1.address()).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_diff_reports_changed_added_and_removed() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let k1 = Keypair::derive("k1");

    registry
        .register("calc", &files(&[("a.py", "1"), ("b.py", "same"), ("gone.py", "x")]), &k1, None)
        .await
        .unwrap();
    registry
        .register("calc", &files(&[("a.py", "2"), ("b.py", "same"), ("new.py", "y")]), &k1, None)
        .await
        .unwrap();

    let diff = registry.diff("calc", &k1.address()).await.unwrap();
    let paths: Vec<&str> = diff.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["a.py", "gone.py", "new.py"]);
    assert!(diff["gone.py"].current.is_none());
    assert!(diff["new.py"].previous.is_none());
    assert_ne!(diff["a.py"].previous, diff["a.py"].current);
}

#[tokio::test]
async fn test_setback_restores_working_tree_exactly() {
    let Setup { dir, registry, .. } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();
    let module = dir.path().join("modules/calc");

    let v1 = registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    let v2 = registry
        .register("calc", &files(&[("a.py", "2"), ("pkg/b.py", "b")]), &k1, None)
        .await
        .unwrap();

    registry.setback("calc", &owner, &v2.id).await.unwrap();
    assert!(module.join("pkg/b.py").exists());

    let restored = registry.setback("calc", &owner, &v1.id).await.unwrap();
    assert_eq!(restored.id, v1.id);
    assert_eq!(registry.head("calc", &owner).unwrap(), Some(v1.id.clone()));
    assert_eq!(fs::read_to_string(module.join("a.py")).unwrap(), "1");
    assert!(!module.join("pkg").exists());
    assert_eq!(
        registry.worktree().read("calc").unwrap(),
        registry.files(v1.id.as_str(), None).await.unwrap()
    );

    // Registering from the restored tree is a no-op
    let again = registry.register_dir("calc", &k1, None).await.unwrap();
    assert_eq!(again.id, v1.id);
}

#[tokio::test]
async fn test_setback_switches_between_file_and_directory() {
    let Setup { dir, registry, .. } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();
    let module = dir.path().join("modules/calc");

    let v1 = registry
        .register("calc", &files(&[("pkg", "x")]), &k1, None)
        .await
        .unwrap();
    let v2 = registry
        .register("calc", &files(&[("pkg/b.py", "b")]), &k1, None)
        .await
        .unwrap();

    registry.setback("calc", &owner, &v2.id).await.unwrap();
    assert!(module.join("pkg").is_dir());

    registry.setback("calc", &owner, &v1.id).await.unwrap();
    assert_eq!(fs::read_to_string(module.join("pkg")).unwrap(), "x");
    assert_eq!(registry.head("calc", &owner).unwrap(), Some(v1.id.clone()));
    assert_eq!(
        registry.worktree().read("calc").unwrap(),
        registry.files(v1.id.as_str(), None).await.unwrap()
    );
}

#[tokio::test]
async fn test_hidden_files_never_enter_a_version() {
    let Setup { dir, registry, .. } = setup();
    let k1 = Keypair::derive("k1");
    let module = dir.path().join("modules/calc");

    let rejected = registry
        .register("calc", &files(&[("a.py", "1"), (".env", "TOKEN=1")]), &k1, None)
        .await;
    assert!(matches!(rejected, Err(RegistryError::InvalidPath(_))));

    fs::create_dir_all(module.join("__pycache__")).unwrap();
    fs::write(module.join("a.py"), "1").unwrap();
    fs::write(module.join(".env"), "TOKEN=1").unwrap();
    fs::write(module.join("__pycache__/a.pyc"), "bytecode").unwrap();

    let v1 = registry.register_dir("calc", &k1, None).await.unwrap();
    let content = registry.content(v1.id.as_str(), None).await.unwrap();
    assert_eq!(content.paths().collect::<Vec<_>>(), vec!["a.py"]);
}

#[tokio::test]
async fn test_setback_outside_history() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let k1 = Keypair::derive("k1");

    registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    let other = registry
        .register("echo", &files(&[("e.py", "1")]), &k1, None)
        .await
        .unwrap();

    let result = registry.setback("calc", &k1.address(), &other.id).await;
    assert!(matches!(result, Err(RegistryError::NotInHistory { .. })));
}

#[tokio::test]
async fn test_remove_deletes_everything() {
    let Setup {
        dir: _dir,
        store,
        registry,
    } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();

    let schema = RegisterOptions {
        schema: Some(bytes::Bytes::from_static(b"{\"fn\": []}")),
        ..RegisterOptions::comment("with schema")
    };
    registry
        .register_with("calc", &files(&[("a.py", "1"), ("b.py", "b")]), &k1, schema)
        .await
        .unwrap();
    registry
        .register("calc", &files(&[("a.py", "2"), ("b.py", "b")]), &k1, None)
        .await
        .unwrap();
    let versions = registry.versions("calc", &owner).await.unwrap();
    assert_eq!(versions.len(), 2);

    let report = registry.remove("calc", &owner).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.versions, 2);
    assert!(report.deleted > 0);
    assert!(store.ids().is_empty());
    assert_eq!(registry.head("calc", &owner).unwrap(), None);
    assert!(registry.owners().unwrap().is_empty());
    assert!(!registry
        .local()
        .contains(&format!("versions/{}/calc", owner.to_hex()))
        .unwrap());
}

#[tokio::test]
async fn test_remove_tolerates_missing_blobs() {
    let Setup {
        dir: _dir,
        store,
        registry,
    } = setup();
    let k1 = Keypair::derive("k1");

    let v1 = registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    store.remove(&v1.record.content).await.unwrap();

    let report = registry.remove("calc", &k1.address()).await.unwrap();
    assert_eq!(report.versions, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, v1.record.content);
    assert_eq!(registry.head("calc", &k1.address()).unwrap(), None);
}

#[tokio::test]
async fn test_resolve_name_ambiguous_across_owners() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let (k1, k2) = (Keypair::derive("k1"), Keypair::derive("k2"));

    let a = registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    let b = registry
        .register("calc", &files(&[("a.py", "1")]), &k2, None)
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert!(matches!(
        registry.resolve("calc", None).await,
        Err(RegistryError::NotFound(_))
    ));
    assert_eq!(registry.resolve("calc", Some(&k2.address())).await.unwrap(), b);
    assert_eq!(registry.modules(&k1.address()).unwrap(), vec!["calc".to_string()]);
    assert_eq!(registry.owners().unwrap().len(), 2);
}

struct FakeChain {
    fail: bool,
}

#[async_trait]
impl ChainRegistry for FakeChain {
    fn network(&self) -> &str {
        "testnet"
    }

    async fn registry(&self, _owner: &Address) -> Result<BTreeMap<String, String>, ChainError> {
        if self.fail {
            return Err(ChainError("rpc unavailable".into()));
        }
        Ok(BTreeMap::from([("calc".to_string(), "42".to_string())]))
    }
}

#[tokio::test]
async fn test_info_annotates_from_chain() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();

    registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    registry
        .register("echo", &files(&[("e.py", "1")]), &k1, None)
        .await
        .unwrap();

    let chain = FakeChain { fail: false };
    let calc = registry.info("calc", Some(&owner), Some(&chain)).await.unwrap();
    assert_eq!(calc.network, "testnet");
    assert_eq!(calc.onchain_id.as_deref(), Some("42"));

    let echo = registry.info("echo", Some(&owner), Some(&chain)).await.unwrap();
    assert_eq!(echo.network, LOCAL_NETWORK);

    let broken = FakeChain { fail: true };
    let fallback = registry.info("calc", Some(&owner), Some(&broken)).await.unwrap();
    assert_eq!(fallback.network, LOCAL_NETWORK);
    assert!(fallback.onchain_id.is_none());

    let json = serde_json::to_value(&calc).unwrap();
    assert_eq!(json["name"], "calc");
    assert_eq!(json["key"], owner.to_hex());
}

#[tokio::test]
async fn test_authenticated_registration_request() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let k1 = Keypair::derive("k1");
    let auth = Auth::default();

    let request = serde_json::json!({ "module": "calc", "files": { "a.py": "print(1)" } });
    let envelope = auth.sign(&request, &k1).unwrap();

    // Server side: verify before acting, register under the envelope's key
    auth.verify_data(&envelope, &request).unwrap();
    assert_eq!(envelope.key, k1.address());
    let version = registry
        .register("calc", &files(&[("a.py", "print(1)")]), &k1, None)
        .await
        .unwrap();
    assert_eq!(version.record.key, envelope.key);

    let tampered = serde_json::json!({ "module": "calc", "files": { "a.py": "rm -rf" } });
    assert!(matches!(
        auth.verify_data(&envelope, &tampered),
        Err(AuthError::DataMismatch)
    ));
}

#[tokio::test]
async fn test_record_signed_elsewhere() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let k1 = Keypair::derive("k1");
    let owner = k1.address();
    let auth = Auth::default();

    let v1 = registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();

    // Server prepares, the key holder signs the record and the request
    let prepared = registry
        .prepare("calc", &files(&[("a.py", "2")]), &owner, RegisterOptions::comment("remote"))
        .await
        .unwrap();
    let Prepared::Unsigned(unsigned) = prepared else {
        panic!("changed content must produce a record");
    };
    assert_eq!(unsigned.prev, Some(v1.id.clone()));
    assert!(unsigned.is_unsigned());

    let mut record = unsigned.clone();
    record.signature = k1.sign(&unsigned.signing_bytes());
    let envelope = auth.sign(&record, &k1).unwrap();

    auth.verify_data(&envelope, &record).unwrap();
    assert_eq!(envelope.key, record.key);
    let v2 = registry.register_signed(record).await.unwrap();

    assert_eq!(registry.head("calc", &owner).unwrap(), Some(v2.id.clone()));
    assert!(registry.verify_history("calc", &owner).await.unwrap());
    assert_eq!(registry.versions("calc", &owner).await.unwrap()[0].comment.as_deref(), Some("remote"));

    let unchanged = registry
        .prepare("calc", &files(&[("a.py", "2")]), &owner, RegisterOptions::default())
        .await
        .unwrap();
    assert_eq!(unchanged, Prepared::Unchanged(v2));
}

#[tokio::test]
async fn test_register_signed_rejects_bad_records() {
    let Setup {
        dir: _dir, registry, ..
    } = setup();
    let (k1, k2) = (Keypair::derive("k1"), Keypair::derive("k2"));
    let owner = k1.address();

    registry
        .register("calc", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    let prepare = |body: &'static str| {
        let registry = registry.clone();
        async move {
            match registry
                .prepare("calc", &files(&[("a.py", body)]), &owner, RegisterOptions::default())
                .await
                .unwrap()
            {
                Prepared::Unsigned(record) => record,
                Prepared::Unchanged(_) => panic!("content changed"),
            }
        }
    };

    // Signed by a key other than the record's
    let mut forged = prepare("2").await;
    forged.signature = k2.sign(&forged.signing_bytes());
    assert!(matches!(
        registry.register_signed(forged).await,
        Err(RegistryError::Validation(_))
    ));

    // Left unsigned
    assert!(registry.register_signed(prepare("2").await).await.is_err());

    // Based on a head that has since moved
    let stale = prepare("3").await.signed_by(&k1);
    registry.register_signed(prepare("4").await.signed_by(&k1)).await.unwrap();
    assert!(matches!(
        registry.register_signed(stale).await,
        Err(RegistryError::HeadMoved { .. })
    ));

    // Re-signed by another key, so it claims another owner's chain
    let hijack = prepare("5").await.signed_by(&k2);
    assert!(registry.register_signed(hijack).await.is_err());
    assert_eq!(registry.history("calc", &owner).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sqlite_backend_and_encrypted_table() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(LocalStoreConfig {
        root: dir.path().join("storage"),
        password: Some("hunter2".into()),
        ..LocalStoreConfig::default()
    })
    .unwrap();
    let config = RegistryConfig {
        workspace: dir.path().join("modules"),
        ..RegistryConfig::default()
    };
    let store = SqliteStore::open(dir.path().join("cas.db")).unwrap();
    let registry = RegistryManager::new(store, local, config);
    let k1 = Keypair::derive("k1");

    let v1 = registry
        .register("secret-module", &files(&[("a.py", "1")]), &k1, None)
        .await
        .unwrap();
    assert_eq!(
        registry.resolve("secret-module", Some(&k1.address())).await.unwrap(),
        v1
    );

    let raw = fs::read_to_string(dir.path().join("storage/registry.json")).unwrap();
    assert!(!raw.contains("secret-module"));
    assert!(registry.local().is_encrypted("registry").unwrap());
}

#[tokio::test]
async fn test_register_all_isolates_failures() {
    let Setup {
        dir: _dir, registry, ..
    } = setup_with(RegistryConfig {
        max_concurrency: 2,
        ..RegistryConfig::default()
    });
    let signer: Arc<dyn Signer> = Arc::new(Keypair::derive("bulk"));

    let mut modules = BTreeMap::new();
    for name in ["alpha", "beta", "gamma", "delta"] {
        modules.insert(name.to_string(), files(&[("main.py", "pass")]));
    }
    modules.insert("bad/name".to_string(), files(&[("main.py", "pass")]));

    let results = registry
        .register_all(modules, Arc::clone(&signer), Some("batch".into()))
        .await;

    assert_eq!(results.len(), 5);
    assert!(results["bad/name"].is_err());
    assert_eq!(results.values().filter(|r| r.is_ok()).count(), 4);
    assert_eq!(registry.modules(&signer.address()).unwrap().len(), 4);
}

fn tree_strategy() -> impl Strategy<Value = FileTree> {
    prop::collection::btree_map("[a-z]{1,8}\\.py", prop::collection::vec(any::<u8>(), 0..64), 1..6)
        .prop_map(|files| FileTree::from_pairs(files).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn register_is_idempotent(tree in tree_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let Setup { dir: _dir, store, registry } = setup();
        let k1 = Keypair::derive("k1");

        let (first, second, before, after) = runtime.block_on(async {
            let first = registry.register("prop", &tree, &k1, None).await.unwrap();
            let before = store.len().await.unwrap();
            let second = registry.register("prop", &tree, &k1, Some("again")).await.unwrap();
            let after = store.len().await.unwrap();
            (first, second, before, after)
        });

        prop_assert_eq!(first, second);
        prop_assert_eq!(before, after);
    }
}
