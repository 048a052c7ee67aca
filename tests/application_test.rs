use std::sync::Arc;
use std::time::Duration;

use modelops::{Application, ShutdownManager};
use modelops_core::models::ModelingStep;
use modelops_core::traits::{DatasetRepository, ModelingRepository};
use modelops_core::AppConfig;
use modelops_infrastructure::DatabaseManager;
use modelops_testing_utils::{write_files, MockWorkerClient, NewTaskBuilder, TestContext, TestEnv};

fn loops_only(scheduler: bool, dataset_sync: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.enabled = scheduler;
    config.scheduler.tick_interval_seconds = 1;
    config.dataset_sync.enabled = dataset_sync;
    // 探测会用Mock的空GPU清单覆盖资源池
    config.health_probe.enabled = false;
    config
}

fn assemble(ctx: &TestContext, config: AppConfig, worker: &MockWorkerClient) -> Arc<Application> {
    Arc::new(Application::assemble(
        config,
        DatabaseManager::from_pool(ctx.db.pool().clone()),
        Arc::new(worker.clone()),
    ))
}

#[tokio::test]
async fn test_dataset_sync_runs_immediately_and_stops_on_shutdown() {
    let ctx = TestContext::new().await;
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), "flowers/train/rose", 2, "jpg");
    write_files(dir.path(), "flowers/train/tulip", 2, "jpg");
    let root = ctx
        .datasets
        .create_root(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let app = assemble(&ctx, loops_only(false, true), &MockWorkerClient::new());
    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { app.run(shutdown).await })
    };

    let datasets = ctx.datasets.clone();
    let synced = TestEnv::wait_for(
        || {
            let datasets = datasets.clone();
            async move {
                datasets
                    .list_by_root(root.id)
                    .await
                    .map(|nodes| nodes.len() == 4)
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(synced);

    shutdown.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_started_modeling_dispatched_by_scheduler_loop() {
    let ctx = TestContext::new().await;
    ctx.seed_device("node-1", 8001, &["GPU-0"]).await;
    let worker = MockWorkerClient::new();
    let app = assemble(&ctx, loops_only(true, false), &worker);

    let (_, modeling) = app
        .controller()
        .start_modeling(&NewTaskBuilder::new().build())
        .await
        .unwrap();

    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { app.run(shutdown).await })
    };

    let modelings = ctx.modelings.clone();
    let modeling_id = modeling.id;
    let dispatched = TestEnv::wait_for(
        || {
            let modelings = modelings.clone();
            async move {
                matches!(
                    modelings.get_by_id(modeling_id).await,
                    Ok(Some(m)) if m.step == ModelingStep::Request
                )
            }
        },
        Duration::from_secs(4),
    )
    .await;
    assert!(dispatched);
    assert_eq!(worker.touched_modelings(), vec![modeling_id]);

    shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_before_run_stops_loops_immediately() {
    let ctx = TestContext::new().await;
    let mut config = loops_only(true, true);
    config.health_probe.enabled = true;
    let app = assemble(&ctx, config, &MockWorkerClient::new());

    let shutdown = ShutdownManager::new();
    shutdown.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), app.run(shutdown))
        .await
        .unwrap();
    assert!(result.is_ok());
}
