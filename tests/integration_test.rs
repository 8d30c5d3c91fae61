use std::sync::Arc;

use binstore::{
    application::gc::GcConfig,
    domain::value_objects::{BinaryInfo, ExternalMode},
    infrastructure::storage::ContentHasher,
    ports::{
        BinaryCatalog, CollectingReporter, NeverInterrupt, ReferenceSet, TaskControl,
        TracingReporter,
    },
    BinaryStoreError, BinaryUpload,
};

use test_fixtures::{assertions, read_all, ExternalDir, TestEnvironment};

fn unreferenced() -> Arc<ReferenceSet> {
    Arc::new(ReferenceSet::new())
}

#[tokio::test]
async fn test_hello_lifecycle() {
    let env = TestEnvironment::new().await;
    let store = &env.store;

    let info = store
        .add_stream(BinaryUpload::from_bytes(&b"hello"[..]))
        .await
        .unwrap();
    assert_eq!(info.length(), 5);
    assert_eq!(
        info.primary_hash().as_hex(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assertions::assert_catalog_stats(store, 1, 5).await;

    let again = store
        .add_stream(BinaryUpload::from_bytes(&b"hello"[..]))
        .await
        .unwrap();
    assert_eq!(again, info);
    assertions::assert_catalog_stats(store, 1, 5).await;
    assert_eq!(read_all(store, info.primary_hash()).await.unwrap(), b"hello");

    let result = store
        .garbage_collect(unreferenced(), &NeverInterrupt, &TracingReporter)
        .await
        .unwrap();
    assert_eq!(result.rows_removed, 1);
    assert_eq!(result.binaries_removed, 1);
    assert_eq!(result.bytes_removed, 5);

    assertions::assert_catalog_stats(store, 0, 0).await;
    assertions::assert_not_found(store, info.primary_hash()).await;
    assert!(!env.binary_path(info.primary_hash()).exists());
    assert_eq!(store.usage().tracked(), 0);
}

#[tokio::test]
async fn test_lookups() {
    let env = TestEnvironment::new().await;
    let store = &env.store;

    let mut stored = Vec::new();
    for payload in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        stored.push(store.add_stream(BinaryUpload::from_bytes(payload)).await.unwrap());
    }

    assert_eq!(
        store.find(stored[1].primary_hash()).await.unwrap(),
        Some(stored[1].clone())
    );
    assert_eq!(
        store
            .find(ContentHasher::hash_bytes(b"absent").unwrap().primary_hash())
            .await
            .unwrap(),
        None
    );

    let absent = ContentHasher::hash_bytes(b"absent").unwrap();
    let found = store
        .find_many(&[
            stored[0].primary_hash().clone(),
            absent.primary_hash().clone(),
            stored[2].primary_hash().clone(),
        ])
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    let all = store.find_all().await.unwrap();
    assert_eq!(all.len(), 3);
    assertions::assert_catalog_stats(store, 3, 11).await;
}

#[tokio::test]
async fn test_concurrent_identical_uploads_share_one_record() {
    let env = TestEnvironment::new().await;
    let payload = vec![7u8; 64 * 1024];

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&env.store);
        let payload = payload.clone();
        handles.push(tokio::spawn(async move {
            store.add_stream(BinaryUpload::from_bytes(payload)).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    let first = &results[0];
    assert!(results.iter().all(|info| info == first));
    assertions::assert_catalog_stats(&env.store, 1, 64 * 1024).await;
    assert_eq!(
        read_all(&env.store, first.primary_hash()).await.unwrap(),
        payload
    );
    assert_eq!(env.store.usage().tracked(), 0);

    let temp_files = std::fs::read_dir(env.root.path().join("temp")).unwrap().count();
    assert_eq!(temp_files, 0);
}

#[tokio::test]
async fn test_open_reader_protects_binary_from_gc() {
    let env = TestEnvironment::new().await;
    let store = &env.store;
    let info = store
        .add_stream(BinaryUpload::from_bytes(&b"being read"[..]))
        .await
        .unwrap();

    let reader = store.get_stream(info.primary_hash()).await.unwrap();
    let reporter = CollectingReporter::new();
    let result = store
        .garbage_collect(unreferenced(), &NeverInterrupt, &reporter)
        .await
        .unwrap();

    assert_eq!(result.candidates, 1);
    assert_eq!(result.skipped_in_use, 1);
    assert_eq!(result.rows_removed, 0);
    assert!(store.find(info.primary_hash()).await.unwrap().is_some());
    assert!(env.binary_path(info.primary_hash()).is_file());

    drop(reader);

    let result = store
        .garbage_collect(unreferenced(), &NeverInterrupt, &reporter)
        .await
        .unwrap();
    assert_eq!(result.rows_removed, 1);
    assertions::assert_not_found(store, info.primary_hash()).await;
}

#[tokio::test]
async fn test_usage_counter_blocks_gc_until_released() {
    let env = TestEnvironment::new().await;
    let store = &env.store;
    let info = store
        .add_stream(BinaryUpload::from_bytes(&b"counted"[..]))
        .await
        .unwrap();

    assert!(store.increment_usage(info.primary_hash()));
    let result = store
        .garbage_collect(unreferenced(), &NeverInterrupt, &TracingReporter)
        .await
        .unwrap();
    assert_eq!(result.skipped_in_use, 1);

    store.decrement_usage(info.primary_hash());
    let result = store
        .garbage_collect(unreferenced(), &NeverInterrupt, &TracingReporter)
        .await
        .unwrap();
    assert_eq!(result.rows_removed, 1);
}

#[tokio::test]
async fn test_gc_keeps_referenced_binaries() {
    let env = TestEnvironment::new().await;
    let store = &env.store;
    let kept = store
        .add_stream(BinaryUpload::from_bytes(&b"referenced"[..]))
        .await
        .unwrap();
    let dropped = store
        .add_stream(BinaryUpload::from_bytes(&b"forgotten"[..]))
        .await
        .unwrap();

    let references: ReferenceSet = [kept.primary_hash().clone()].into_iter().collect();
    let result = store
        .garbage_collect(Arc::new(references), &NeverInterrupt, &TracingReporter)
        .await
        .unwrap();

    assert_eq!(result.candidates, 1);
    assert_eq!(result.rows_removed, 1);
    assert_eq!(read_all(store, kept.primary_hash()).await.unwrap(), b"referenced");
    assertions::assert_not_found(store, dropped.primary_hash()).await;
}

#[tokio::test]
async fn test_gc_min_age_spares_fresh_records() {
    let env = TestEnvironment::with_gc(GcConfig {
        min_candidate_age: std::time::Duration::from_secs(3600),
        ..GcConfig::default()
    })
    .await;
    env.store
        .add_stream(BinaryUpload::from_bytes(&b"fresh"[..]))
        .await
        .unwrap();

    let result = env
        .store
        .garbage_collect(unreferenced(), &NeverInterrupt, &TracingReporter)
        .await
        .unwrap();
    assert_eq!(result.candidates, 0);
    assertions::assert_catalog_stats(&env.store, 1, 5).await;
}

#[tokio::test]
async fn test_cancelled_gc_removes_nothing() {
    let env = TestEnvironment::with_gc(GcConfig {
        batch_size: 1,
        ..GcConfig::default()
    })
    .await;
    for payload in [&b"a"[..], &b"b"[..]] {
        env.store.add_stream(BinaryUpload::from_bytes(payload)).await.unwrap();
    }

    let control = TaskControl::new();
    control.cancel();
    let result = env
        .store
        .garbage_collect(unreferenced(), &control, &TracingReporter)
        .await
        .unwrap();

    assert!(result.cancelled);
    assertions::assert_catalog_stats(&env.store, 2, 2).await;
}

#[tokio::test]
async fn test_mismatching_info_is_rejected() {
    let env = TestEnvironment::new().await;
    let store = &env.store;
    let info = store
        .add_stream(BinaryUpload::from_bytes(&b"genuine"[..]))
        .await
        .unwrap();

    let wrong_length = BinaryInfo::new(info.primary_hash().clone(), info.secondary_hash(), 99);
    let err = store
        .add_stream(BinaryUpload::tagged(
            Box::pin(std::io::Cursor::new(b"genuine".to_vec())),
            wrong_length,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, BinaryStoreError::HashMismatch { .. }));

    let err = store
        .add_record(info.primary_hash().clone(), "ff", info.length())
        .await
        .unwrap_err();
    assert!(matches!(err, BinaryStoreError::HashMismatch { .. }));
    assertions::assert_catalog_stats(store, 1, 7).await;
}

#[tokio::test]
async fn test_add_record_catalogs_present_bytes_only() {
    let env = TestEnvironment::new().await;
    let store = &env.store;

    let planted = env.plant_orphan(b"already on disk");
    let added = store
        .add_record(
            planted.primary_hash().clone(),
            planted.secondary_hash(),
            planted.length(),
        )
        .await
        .unwrap();
    assert_eq!(added, Some(planted.clone()));
    assert!(store.find(planted.primary_hash()).await.unwrap().is_some());

    let ghost = ContentHasher::hash_bytes(b"never stored").unwrap();
    let missing = store
        .add_record(
            ghost.primary_hash().clone(),
            ghost.secondary_hash(),
            ghost.length(),
        )
        .await
        .unwrap();
    assert_eq!(missing, None);
    assertions::assert_catalog_stats(store, 1, 15).await;
}

#[tokio::test]
async fn test_prune_removes_orphans_and_keeps_protected_files() {
    let env = TestEnvironment::new().await;
    let store = &env.store;

    let cataloged = store
        .add_stream(BinaryUpload::from_bytes(&b"cataloged"[..]))
        .await
        .unwrap();
    let orphan = env.plant_orphan(b"orphaned");
    let protected = env.plant_orphan(b"being written");
    let guard = store.protect(protected.primary_hash()).unwrap();

    let report = store.prune(&TracingReporter).await;

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.providers_scanned, 1);
    assert_eq!(report.binaries_scanned, 3);
    assert_eq!(report.orphans_removed, 1);
    assert_eq!(report.bytes_freed, 8);
    assert_eq!(report.skipped_in_use, 1);

    assert!(!env.binary_path(orphan.primary_hash()).exists());
    assert!(env.binary_path(protected.primary_hash()).is_file());
    assert!(env.binary_path(cataloged.primary_hash()).is_file());

    drop(guard);
    let report = store.prune(&TracingReporter).await;
    assert_eq!(report.orphans_removed, 1);
    assert!(!env.binary_path(protected.primary_hash()).exists());
    assert_eq!(read_all(store, cataloged.primary_hash()).await.unwrap(), b"cataloged");
}

#[tokio::test]
async fn test_passthrough_external_store_attach_and_detach() {
    let env = TestEnvironment::new().await;
    let store = &env.store;
    let external = ExternalDir::new();
    let legacy = external.seed(b"legacy artifact");

    let report = store
        .attach_external_store(external.config(ExternalMode::Passthrough), &TracingReporter)
        .await
        .unwrap();
    assert!(report.chain_updated);
    assert_eq!(report.records, 0);
    assert_eq!(
        store.chain().describe(),
        vec![
            "usage-tracking",
            "filesystem",
            "external-wrapper",
            "external",
            "empty"
        ]
    );

    let added = store
        .add_record(
            legacy.primary_hash().clone(),
            legacy.secondary_hash(),
            legacy.length(),
        )
        .await
        .unwrap();
    assert_eq!(added, Some(legacy.clone()));
    assert_eq!(
        read_all(store, legacy.primary_hash()).await.unwrap(),
        b"legacy artifact"
    );
    assert!(!env.binary_path(legacy.primary_hash()).exists());

    let report = store.detach_external_store(&TracingReporter).await.unwrap();
    assert!(report.chain_updated);
    assert_eq!(report.copied, 1);
    assert!(env.binary_path(legacy.primary_hash()).is_file());
    assert!(external.contains(legacy.primary_hash()));
    assert!(store.chain().external().is_none());
    assert_eq!(
        read_all(store, legacy.primary_hash()).await.unwrap(),
        b"legacy artifact"
    );
}

#[tokio::test]
async fn test_evict_attach_moves_cataloged_content() {
    let env = TestEnvironment::new().await;
    let external = ExternalDir::new();
    let legacy = external.seed(b"move me");
    env.catalog.create(&legacy).await.unwrap();

    let report = env
        .store
        .attach_external_store(external.config(ExternalMode::Evict), &TracingReporter)
        .await
        .unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(report.moved, 1);
    assert_eq!(report.bytes_transferred, 7);
    assert!(!external.contains(legacy.primary_hash()));
    assert!(env.binary_path(legacy.primary_hash()).is_file());
}

#[tokio::test]
async fn test_attach_rejects_missing_directory_and_double_attach() {
    let env = TestEnvironment::new().await;
    let external = ExternalDir::new();

    let missing = binstore::infrastructure::storage::ExternalStoreConfig::new(
        external.dir.path().join("nope"),
        ExternalMode::Adopt,
    );
    let err = env
        .store
        .attach_external_store(missing, &TracingReporter)
        .await
        .unwrap_err();
    assert!(matches!(err, BinaryStoreError::InvalidRequest(_)));

    env.store
        .attach_external_store(external.config(ExternalMode::Adopt), &TracingReporter)
        .await
        .unwrap();
    let err = env
        .store
        .attach_external_store(external.config(ExternalMode::Adopt), &TracingReporter)
        .await
        .unwrap_err();
    assert!(matches!(err, BinaryStoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_detach_without_external_store_fails() {
    let env = TestEnvironment::new().await;
    let err = env
        .store
        .detach_external_store(&TracingReporter)
        .await
        .unwrap_err();
    assert!(matches!(err, BinaryStoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_blob_provider_lifecycle() {
    let env = TestEnvironment::with_blob_provider().await;
    let store = &env.store;

    let info = store
        .add_stream(BinaryUpload::from_bytes(&b"hello"[..]))
        .await
        .unwrap();
    let again = store
        .add_stream(BinaryUpload::from_bytes(&b"hello"[..]))
        .await
        .unwrap();
    assert_eq!(info, again);
    assertions::assert_catalog_stats(store, 1, 5).await;
    assert_eq!(read_all(store, info.primary_hash()).await.unwrap(), b"hello");

    let result = store
        .garbage_collect(unreferenced(), &NeverInterrupt, &TracingReporter)
        .await
        .unwrap();
    assert_eq!(result.binaries_removed, 1);
    assertions::assert_catalog_stats(store, 0, 0).await;
    assertions::assert_not_found(store, info.primary_hash()).await;
}

#[tokio::test]
async fn test_health_check_reports_chain() {
    let env = TestEnvironment::new().await;
    let report = env.store.health_check().await;

    assert!(report.healthy, "{:?}", report.issues);
    assert_eq!(report.details["catalog"]["status"], "healthy");
    assert_eq!(report.details["providers"]["status"], "healthy");
    assert_eq!(report.details["chain"][1], "filesystem");
    assert!(report.details["external"].is_null());
}
