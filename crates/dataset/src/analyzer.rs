use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use modelops_core::{
    traits::{DatasetAnalyzer, DatasetRepository},
    ModelOpsError, ModelOpsResult,
};
use tracing::{debug, warn};

use crate::layout::Layout;

/// 为有效数据集生成文件计数摘要
pub struct SummaryAnalyzer {
    datasets: Arc<dyn DatasetRepository>,
}

impl SummaryAnalyzer {
    pub fn new(datasets: Arc<dyn DatasetRepository>) -> Self {
        Self { datasets }
    }
}

#[async_trait]
impl DatasetAnalyzer for SummaryAnalyzer {
    async fn analyze(&self, root_id: i64) -> ModelOpsResult<()> {
        let valid: Vec<_> = self
            .datasets
            .list_by_root(root_id)
            .await?
            .into_iter()
            .filter(|d| !d.is_deleted && d.is_valid)
            .collect();

        let paths: Vec<PathBuf> = valid.iter().map(|d| PathBuf::from(&d.path)).collect();
        let summaries = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|p| Layout::detect(p).map(|layout| layout.statistics()))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ModelOpsError::Internal(format!("数据集统计任务异常退出: {e}")))?;

        let mut updated = 0;
        for (dataset, result) in valid.iter().zip(summaries) {
            let statistics = match result {
                Ok(Some(statistics)) => statistics,
                Ok(None) => continue,
                Err(e) => {
                    warn!(dataset.id = dataset.id, path = %dataset.path, "读取数据集目录失败，跳过统计: {e}");
                    continue;
                }
            };
            if dataset.statistics.as_ref() != Some(&statistics) {
                self.datasets
                    .update_statistics(dataset.id, &statistics, dataset.statistics_dir.as_deref())
                    .await?;
                updated += 1;
            }
        }

        debug!(root.id = root_id, datasets = valid.len(), updated, "数据集统计完成");
        Ok(())
    }
}
