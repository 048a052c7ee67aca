use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use modelops_core::{traits::WorkerClient, AppConfig};
use modelops_dataset::{DatasetTreeSync, LayoutValidator, SummaryAnalyzer};
use modelops_dispatcher::{allocation_lock, HealthProbe, ModelingController, Scheduler};
use modelops_infrastructure::{DatabaseManager, HttpWorkerClient, MetricsCollector};
use modelops_registry::{ModelCatalog, ModelRegistry};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::shutdown::ShutdownManager;

/// 主应用程序
///
/// 持有数据库和所有组件；后台循环在 [`Application::run`] 中启动，
/// 控制器、模型登记表和模型目录供上层服务接口调用。
pub struct Application {
    config: AppConfig,
    db: DatabaseManager,
    scheduler: Arc<Scheduler>,
    dataset_sync: Arc<DatasetTreeSync>,
    health_probe: Arc<HealthProbe>,
    controller: Arc<ModelingController>,
    registry: Arc<ModelRegistry>,
    catalog: Arc<ModelCatalog>,
}

impl Application {
    /// 连接数据库、执行迁移并组装各组件
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let db = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
        db.migrate().await.context("执行数据库迁移失败")?;

        let worker: Arc<dyn WorkerClient> = Arc::new(
            HttpWorkerClient::new(&config.worker_client).context("创建Worker客户端失败")?,
        );

        Ok(Self::assemble(config, db, worker))
    }

    /// 用已迁移的数据库和给定的Worker客户端组装各组件
    pub fn assemble(config: AppConfig, db: DatabaseManager, worker: Arc<dyn WorkerClient>) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let allocation = allocation_lock();

        let datasets = db.dataset_repository();
        let resources = db.resource_pool();
        let tasks = db.task_repository();
        let modelings = db.modeling_repository();
        let details = db.modeling_detail_repository();

        let scheduler = Arc::new(Scheduler::new(
            modelings.clone(),
            resources.clone(),
            worker.clone(),
            metrics.clone(),
            allocation.clone(),
            Duration::from_secs(config.scheduler.tick_interval_seconds),
        ));
        let dataset_sync = Arc::new(DatasetTreeSync::new(
            datasets.clone(),
            Arc::new(LayoutValidator::new(datasets.clone())),
            Arc::new(SummaryAnalyzer::new(datasets)),
            metrics.clone(),
            Duration::from_secs(config.dataset_sync.interval_seconds),
        ));
        let health_probe = Arc::new(HealthProbe::new(
            resources.clone(),
            modelings.clone(),
            worker.clone(),
            metrics.clone(),
            allocation.clone(),
            Duration::from_secs(config.health_probe.interval_seconds),
        ));
        let controller = Arc::new(ModelingController::new(
            tasks.clone(),
            modelings.clone(),
            resources.clone(),
            worker.clone(),
            metrics.clone(),
            allocation,
        ));
        let registry = Arc::new(ModelRegistry::new(
            details.clone(),
            resources,
            worker,
            metrics,
        ));
        let catalog = Arc::new(ModelCatalog::new(tasks, modelings, details));

        Self {
            config,
            db,
            scheduler,
            dataset_sync,
            health_probe,
            controller,
            registry,
            catalog,
        }
    }

    /// 启动已启用的后台循环，收到关闭信号后等待全部退出
    ///
    /// 每个循环单独订阅，启动前已发出的关闭信号同样生效。
    pub async fn run(&self, shutdown: ShutdownManager) -> Result<()> {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        if self.config.scheduler.enabled {
            let scheduler = Arc::clone(&self.scheduler);
            let shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                scheduler.run(shutdown_rx).await;
            }));
        }

        if self.config.dataset_sync.enabled {
            let dataset_sync = Arc::clone(&self.dataset_sync);
            let shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                dataset_sync.run(shutdown_rx).await;
            }));
        }

        if self.config.health_probe.enabled {
            let health_probe = Arc::clone(&self.health_probe);
            let shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                health_probe.run(shutdown_rx).await;
            }));
        }

        if handles.is_empty() {
            warn!("所有后台循环均已禁用");
        }
        info!("已启动 {} 个后台循环", handles.len());

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("后台循环异常退出: {e}");
            }
        }

        self.db.close().await;
        info!("所有后台循环已停止");
        Ok(())
    }

    pub fn controller(&self) -> Arc<ModelingController> {
        Arc::clone(&self.controller)
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn catalog(&self) -> Arc<ModelCatalog> {
        Arc::clone(&self.catalog)
    }
}
