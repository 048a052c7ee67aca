use async_trait::async_trait;

use crate::ModelOpsResult;

/// 每轮同步后对一个根目录下的数据集做格式校验，写回 `is_valid` 等标记
#[async_trait]
pub trait DatasetValidator: Send + Sync {
    async fn validate(&self, root_id: i64) -> ModelOpsResult<()>;
}

/// 每轮同步、校验之后生成数据集统计信息
#[async_trait]
pub trait DatasetAnalyzer: Send + Sync {
    async fn analyze(&self, root_id: i64) -> ModelOpsResult<()>;
}
