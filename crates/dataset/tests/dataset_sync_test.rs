use std::fs;
use std::sync::Arc;
use std::time::Duration;

use modelops_core::traits::{DatasetAnalyzer, DatasetRepository, DatasetValidator};
use modelops_dataset::{DatasetTreeSync, LayoutValidator, SummaryAnalyzer};
use modelops_infrastructure::MetricsCollector;
use modelops_testing_utils::{write_files, RecordingCollaborators, TestContext, TestEnv};
use tempfile::TempDir;
use tokio::sync::broadcast;

fn recording_sync(ctx: &TestContext, recorder: &RecordingCollaborators) -> DatasetTreeSync {
    DatasetTreeSync::new(
        ctx.datasets.clone(),
        Arc::new(recorder.clone()),
        Arc::new(recorder.clone()),
        Arc::new(MetricsCollector::new()),
        Duration::from_millis(50),
    )
}

fn layout_sync(ctx: &TestContext) -> DatasetTreeSync {
    let validator: Arc<dyn DatasetValidator> = Arc::new(LayoutValidator::new(ctx.datasets.clone()));
    let analyzer: Arc<dyn DatasetAnalyzer> = Arc::new(SummaryAnalyzer::new(ctx.datasets.clone()));
    DatasetTreeSync::new(
        ctx.datasets.clone(),
        validator,
        analyzer,
        Arc::new(MetricsCollector::new()),
        Duration::from_secs(20),
    )
}

fn path_of(dir: &TempDir, rel: &str) -> String {
    dir.path().join(rel).to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_first_sync_inserts_forest_top_down() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "ds1/train/cat", 1, "jpg");
    write_files(dir.path(), "ds1/train/dog", 1, "jpg");
    let root = ctx
        .datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let recorder = RecordingCollaborators::new();
    let report = recording_sync(&ctx, &recorder).sync_root(&root).await.unwrap();
    assert_eq!(report.nodes, 4);
    assert_eq!(report.inserted, 4);

    let ds1 = ctx
        .datasets
        .find_by_path(root.id, &path_of(&dir, "ds1"))
        .await
        .unwrap()
        .unwrap();
    let train = ctx
        .datasets
        .find_by_path(root.id, &path_of(&dir, "ds1/train"))
        .await
        .unwrap()
        .unwrap();
    let cat = ctx
        .datasets
        .find_by_path(root.id, &path_of(&dir, "ds1/train/cat"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ds1.parent_id, 0);
    assert!(!ds1.is_leaf);
    assert_eq!(train.parent_id, ds1.id);
    assert_eq!(cat.parent_id, train.id);
    assert!(cat.is_leaf);
    assert_eq!(cat.name, "cat");
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "a/x", 1, "jpg");
    write_files(dir.path(), "b", 1, "jpg");
    ctx.datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let recorder = RecordingCollaborators::new();
    let sync = recording_sync(&ctx, &recorder);

    let first = sync.run_once().await.unwrap();
    assert_eq!(first[0].inserted, 3);
    let root_id = first[0].root_id;
    let before = ctx.datasets.list_by_root(root_id).await.unwrap();

    let second = sync.run_once().await.unwrap();
    assert_eq!(second[0].writes(), 0);

    let after = ctx.datasets.list_by_root(root_id).await.unwrap();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.id, a.id);
        assert_eq!(b.is_deleted, a.is_deleted);
        assert_eq!(b.updated_at, a.updated_at);
    }
}

#[tokio::test]
async fn test_removed_directory_reappears_on_same_row() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "keep", 1, "jpg");
    write_files(dir.path(), "gone/inner", 1, "jpg");
    let root = ctx
        .datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let recorder = RecordingCollaborators::new();
    let sync = recording_sync(&ctx, &recorder);
    sync.sync_root(&root).await.unwrap();

    let gone_path = path_of(&dir, "gone");
    let original = ctx
        .datasets
        .find_by_path(root.id, &gone_path)
        .await
        .unwrap()
        .unwrap();

    fs::remove_dir_all(dir.path().join("gone")).unwrap();
    let report = sync.sync_root(&root).await.unwrap();
    assert_eq!(report.deleted, 2);
    let deleted = ctx.datasets.get_by_id(original.id).await.unwrap().unwrap();
    assert!(deleted.is_deleted);

    // 再删一次不会重复写
    let report = sync.sync_root(&root).await.unwrap();
    assert_eq!(report.writes(), 0);

    write_files(dir.path(), "gone/inner", 1, "jpg");
    let report = sync.sync_root(&root).await.unwrap();
    assert_eq!(report.restored, 2);
    assert_eq!(report.inserted, 0);

    let restored = ctx
        .datasets
        .find_by_path(root.id, &gone_path)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.id, original.id);
    assert!(!restored.is_deleted);
    assert_eq!(ctx.datasets.list_by_root(root.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_collaborators_run_in_order_per_root() {
    let ctx = TestContext::new().await;
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let inactive = TempDir::new().unwrap();
    let r1 = ctx
        .datasets
        .create_root(first.path().to_str().unwrap())
        .await
        .unwrap();
    let r2 = ctx
        .datasets
        .create_root(second.path().to_str().unwrap())
        .await
        .unwrap();
    let r3 = ctx
        .datasets
        .create_root(inactive.path().to_str().unwrap())
        .await
        .unwrap();
    ctx.datasets.set_root_active(r3.id, false).await.unwrap();

    let recorder = RecordingCollaborators::new();
    let reports = recording_sync(&ctx, &recorder).run_once().await.unwrap();
    assert_eq!(reports.len(), 2);

    assert_eq!(
        recorder.log(),
        vec![
            format!("validate:{}", r1.id),
            format!("analyze:{}", r1.id),
            format!("validate:{}", r2.id),
            format!("analyze:{}", r2.id),
        ]
    );
}

#[tokio::test]
async fn test_unreadable_root_skipped_without_soft_delete() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "mnt/ds", 1, "jpg");
    let mount = dir.path().join("mnt");
    let root = ctx
        .datasets
        .create_root(mount.to_str().unwrap())
        .await
        .unwrap();
    let healthy = TempDir::new().unwrap();
    ctx.datasets
        .create_root(healthy.path().to_str().unwrap())
        .await
        .unwrap();

    let recorder = RecordingCollaborators::new();
    let sync = recording_sync(&ctx, &recorder);
    sync.run_once().await.unwrap();

    fs::remove_dir_all(&mount).unwrap();
    let reports = sync.run_once().await.unwrap();
    assert_eq!(reports.len(), 1);

    let rows = ctx.datasets.list_by_root(root.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_deleted);
}

#[tokio::test]
async fn test_train_only_image_dataset_is_trainable() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "ds1/train/cat", 4, "jpg");
    write_files(dir.path(), "ds1/train/dog", 3, "jpg");
    let root = ctx
        .datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    layout_sync(&ctx).sync_root(&root).await.unwrap();

    let ds1 = ctx
        .datasets
        .find_by_path(root.id, &path_of(&dir, "ds1"))
        .await
        .unwrap()
        .unwrap();
    assert!(ds1.is_valid);
    assert!(ds1.is_trainable);
    assert!(!ds1.is_testable);
    assert_eq!(ds1.data_format.as_deref(), Some("train-only"));
    assert!(ds1.supports_engine("vcls-sl"));

    let stats = ds1.statistics.unwrap();
    assert_eq!(stats["splits"]["train"]["cat"], 4);
    assert_eq!(stats["splits"]["train"]["dog"], 3);

    let cat = ctx
        .datasets
        .find_by_path(root.id, &path_of(&dir, "ds1/train/cat"))
        .await
        .unwrap()
        .unwrap();
    assert!(!cat.is_valid);
    assert!(cat.statistics.is_none());
}

#[tokio::test]
async fn test_layout_collaborators_write_only_on_change() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "ds1/train/cat", 2, "jpg");
    write_files(dir.path(), "ds1/train/dog", 2, "jpg");
    let root = ctx
        .datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let sync = layout_sync(&ctx);
    sync.sync_root(&root).await.unwrap();
    let path = path_of(&dir, "ds1");
    let first = ctx.datasets.find_by_path(root.id, &path).await.unwrap().unwrap();

    sync.sync_root(&root).await.unwrap();
    let second = ctx.datasets.find_by_path(root.id, &path).await.unwrap().unwrap();
    assert_eq!(first.updated_at, second.updated_at);

    write_files(dir.path(), "ds1/test/cat", 1, "jpg");
    sync.sync_root(&root).await.unwrap();
    let third = ctx.datasets.find_by_path(root.id, &path).await.unwrap().unwrap();
    assert!(third.is_testable);
    assert_eq!(third.data_format.as_deref(), Some("train-test"));
    assert_eq!(third.statistics.unwrap()["splits"]["test"]["cat"], 1);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let ctx = TestContext::new().await;
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), "ds1", 1, "jpg");
    let root = ctx
        .datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let recorder = RecordingCollaborators::new();
    let sync = Arc::new(recording_sync(&ctx, &recorder));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.run(shutdown_rx).await })
    };

    let datasets = ctx.datasets.clone();
    let inserted = TestEnv::wait_for(
        || {
            let datasets = datasets.clone();
            let root_id = root.id;
            async move { !datasets.list_by_root(root_id).await.unwrap().is_empty() }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(inserted);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
