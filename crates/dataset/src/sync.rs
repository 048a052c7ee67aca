use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use modelops_core::{
    models::{DatasetRoot, NewDataset},
    traits::{DatasetAnalyzer, DatasetRepository, DatasetValidator},
    ModelOpsError, ModelOpsResult,
};
use modelops_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::tree::DatasetForest;

/// 一个根目录一轮同步的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub root_id: i64,
    pub nodes: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub restored: usize,
    pub updated: usize,
    /// 位于读取失败目录下、本轮未比对的已存节点
    pub unverified: usize,
}

impl SyncReport {
    /// 本轮对 `datasets` 表的写入次数
    pub fn writes(&self) -> usize {
        self.inserted + self.deleted + self.restored + self.updated
    }
}

/// 数据集树同步服务
pub struct DatasetTreeSync {
    datasets: Arc<dyn DatasetRepository>,
    validator: Arc<dyn DatasetValidator>,
    analyzer: Arc<dyn DatasetAnalyzer>,
    metrics: Arc<MetricsCollector>,
    interval: Duration,
}

impl DatasetTreeSync {
    pub fn new(
        datasets: Arc<dyn DatasetRepository>,
        validator: Arc<dyn DatasetValidator>,
        analyzer: Arc<dyn DatasetAnalyzer>,
        metrics: Arc<MetricsCollector>,
        interval: Duration,
    ) -> Self {
        Self {
            datasets,
            validator,
            analyzer,
            metrics,
            interval,
        }
    }

    /// 运行同步循环，首轮立即执行，收到关闭信号后退出
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动数据集同步循环，间隔 {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        StructuredLogger::log_system_error("dataset_sync", "run_once", &e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("数据集同步循环收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 同步所有启用的根目录；单个根目录失败只记录日志
    pub async fn run_once(&self) -> ModelOpsResult<Vec<SyncReport>> {
        let start = Instant::now();
        let roots = self.datasets.list_active_roots().await?;

        let mut reports = Vec::with_capacity(roots.len());
        for root in &roots {
            match self.sync_root(root).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(root.id = root.id, root.path = %root.path, "数据集根目录同步失败: {e}");
                }
            }
        }

        let inserted = reports.iter().map(|r| r.inserted as u64).sum();
        let deleted = reports.iter().map(|r| r.deleted as u64).sum();
        self.metrics
            .record_dataset_sync(start.elapsed().as_secs_f64(), inserted, deleted);

        Ok(reports)
    }

    /// 同步一个根目录，然后依次调用校验器和统计分析器
    pub async fn sync_root(&self, root: &DatasetRoot) -> ModelOpsResult<SyncReport> {
        let start = Instant::now();
        let root_path = PathBuf::from(&root.path);
        let forest = tokio::task::spawn_blocking(move || DatasetForest::scan(&root_path))
            .await
            .map_err(|e| ModelOpsError::Internal(format!("目录扫描任务异常退出: {e}")))??;

        let report = self.reconcile(root.id, &forest).await?;

        if let Err(e) = self.validator.validate(root.id).await {
            warn!(root.id = root.id, "数据集校验失败: {e}");
        }
        if let Err(e) = self.analyzer.analyze(root.id).await {
            warn!(root.id = root.id, "数据集统计失败: {e}");
        }

        StructuredLogger::log_dataset_sync(
            root.id,
            report.nodes,
            report.inserted,
            report.deleted,
            report.restored,
            start.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    /// 按路径比对磁盘与已存节点
    async fn reconcile(&self, root_id: i64, forest: &DatasetForest) -> ModelOpsResult<SyncReport> {
        let persisted = self.datasets.list_by_root(root_id).await?;
        let on_disk: HashMap<&str, usize> = forest
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| (node.path.as_str(), i))
            .collect();

        let mut report = SyncReport {
            root_id,
            nodes: forest.len(),
            ..Default::default()
        };
        let mut ids: Vec<Option<i64>> = vec![None; forest.len()];

        for row in &persisted {
            match on_disk.get(row.path.as_str()) {
                Some(&i) => {
                    ids[i] = Some(row.id);
                    if row.is_deleted {
                        self.datasets.set_deleted(row.id, false).await?;
                        report.restored += 1;
                    }
                    // 不可读目录的子节点未知，保留原叶子标记
                    let is_leaf = forest.nodes()[i].is_leaf;
                    if row.is_leaf != is_leaf && !forest.is_unverified(&row.path) {
                        self.datasets.set_leaf(row.id, is_leaf).await?;
                        report.updated += 1;
                    }
                }
                None if forest.is_unverified(&row.path) => report.unverified += 1,
                None => {
                    if !row.is_deleted {
                        self.datasets.set_deleted(row.id, true).await?;
                        report.deleted += 1;
                    }
                }
            }
        }

        if report.unverified > 0 {
            warn!(
                root.id = root_id,
                unverified = report.unverified,
                "部分目录读取失败，其下节点本轮保持不变"
            );
        }

        // 先序遍历保证父节点先于子节点写入
        for (i, node) in forest.nodes().iter().enumerate() {
            if ids[i].is_some() {
                continue;
            }
            let parent_id = match node.parent {
                None => 0,
                Some(p) => match ids[p] {
                    Some(id) => id,
                    None => {
                        warn!(path = %node.path, "父节点未写入，跳过");
                        continue;
                    }
                },
            };

            if let Some(existing) = self.datasets.find_by_path(root_id, &node.path).await? {
                ids[i] = Some(existing.id);
                continue;
            }

            let created = self
                .datasets
                .insert(&NewDataset {
                    root_id,
                    name: node.name.clone(),
                    path: node.path.clone(),
                    parent_id,
                    is_leaf: node.is_leaf,
                })
                .await?;
            ids[i] = Some(created.id);
            report.inserted += 1;
        }

        Ok(report)
    }
}
