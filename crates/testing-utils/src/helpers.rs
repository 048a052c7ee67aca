//! Test helper utilities and common setup

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use modelops_core::{
    models::{Device, Gpu},
    traits::{
        DatasetRepository, ModelingDetailRepository, ModelingRepository, ResourcePool,
        TaskRepository,
    },
};
use modelops_infrastructure::DatabaseManager;
use tokio::time::sleep;

use crate::builders::{new_device, reported_gpu};

/// In-memory SQLite database with migrations applied
pub async fn setup_test_db() -> DatabaseManager {
    let manager = DatabaseManager::in_memory().await.unwrap();
    manager.migrate().await.unwrap();
    manager
}

/// Every repository over one fresh in-memory database
pub struct TestContext {
    pub db: DatabaseManager,
    pub datasets: Arc<dyn DatasetRepository>,
    pub resources: Arc<dyn ResourcePool>,
    pub tasks: Arc<dyn TaskRepository>,
    pub modelings: Arc<dyn ModelingRepository>,
    pub details: Arc<dyn ModelingDetailRepository>,
}

impl TestContext {
    pub async fn new() -> Self {
        let db = setup_test_db().await;
        Self {
            datasets: db.dataset_repository(),
            resources: db.resource_pool(),
            tasks: db.task_repository(),
            modelings: db.modeling_repository(),
            details: db.modeling_detail_repository(),
            db,
        }
    }

    /// Register a device and report the given GPU uuids on it, all idle
    pub async fn seed_device(&self, name: &str, port: i32, gpu_uuids: &[&str]) -> (Device, Vec<Gpu>) {
        let device = self
            .resources
            .register_device(&new_device(name, "127.0.0.1", port))
            .await
            .unwrap();
        let reported: Vec<_> = gpu_uuids
            .iter()
            .enumerate()
            .map(|(index, uuid)| reported_gpu(uuid, index as i32))
            .collect();
        self.resources.refresh(device.id, &reported).await.unwrap();

        let gpus = self
            .resources
            .snapshot()
            .await
            .unwrap()
            .into_iter()
            .find(|d| d.device.id == device.id)
            .map(|d| d.gpus)
            .unwrap_or_default();
        (device, gpus)
    }
}

/// Create `count` small files under `dir/rel`
pub fn write_files(dir: &Path, rel: &str, count: usize, extension: &str) {
    let target = dir.join(rel);
    std::fs::create_dir_all(&target).unwrap();
    for i in 0..count {
        std::fs::write(target.join(format!("{i}.{extension}")), b"x").unwrap();
    }
}

pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}
