use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use modelops_core::{
    models::DatasetValidation, traits::DatasetRepository, traits::DatasetValidator, ModelOpsError,
    ModelOpsResult,
};
use tracing::{debug, warn};

use crate::layout::Layout;

/// 按目录布局校验数据集，只在结果与已存标记不同时写回
pub struct LayoutValidator {
    datasets: Arc<dyn DatasetRepository>,
}

impl LayoutValidator {
    pub fn new(datasets: Arc<dyn DatasetRepository>) -> Self {
        Self { datasets }
    }
}

#[async_trait]
impl DatasetValidator for LayoutValidator {
    async fn validate(&self, root_id: i64) -> ModelOpsResult<()> {
        let live: Vec<_> = self
            .datasets
            .list_by_root(root_id)
            .await?
            .into_iter()
            .filter(|d| !d.is_deleted)
            .collect();

        let paths: Vec<PathBuf> = live.iter().map(|d| PathBuf::from(&d.path)).collect();
        let detected = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .map(|p| Layout::detect(p).map(|layout| layout.validation()))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ModelOpsError::Internal(format!("数据集校验任务异常退出: {e}")))?;

        let mut updated = 0;
        for (dataset, result) in live.iter().zip(detected) {
            let validation: DatasetValidation = match result {
                Ok(validation) => validation,
                Err(e) => {
                    warn!(dataset.id = dataset.id, path = %dataset.path, "读取数据集目录失败，跳过校验: {e}");
                    continue;
                }
            };
            if validation != dataset.validation() {
                self.datasets
                    .update_validation(dataset.id, &validation)
                    .await?;
                updated += 1;
            }
        }

        debug!(root.id = root_id, datasets = live.len(), updated, "数据集校验完成");
        Ok(())
    }
}
