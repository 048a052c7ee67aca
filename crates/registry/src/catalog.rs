use std::sync::Arc;

use futures::future::try_join_all;
use modelops_core::{
    models::{ModelingStep, ModelingType},
    traits::{ModelingDetailRepository, ModelingRepository, TaskRepository},
    ModelOpsError, ModelOpsResult,
};
use serde::Serialize;
use tracing::debug;

/// 一个建模产出的最优模型文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelingModels {
    pub modeling_id: i64,
    pub modeling_type: ModelingType,
    pub step: ModelingStep,
    pub model_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskModels {
    pub task_id: i64,
    pub modelings: Vec<ModelingModels>,
}

/// 按Task汇总可加载的模型
pub struct ModelCatalog {
    tasks: Arc<dyn TaskRepository>,
    modelings: Arc<dyn ModelingRepository>,
    details: Arc<dyn ModelingDetailRepository>,
}

impl ModelCatalog {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        modelings: Arc<dyn ModelingRepository>,
        details: Arc<dyn ModelingDetailRepository>,
    ) -> Self {
        Self {
            tasks,
            modelings,
            details,
        }
    }

    /// 并发查询每个Task的最优模型，结果顺序与 `task_ids` 一致
    ///
    /// 任一Task查询失败则整体失败，不返回部分结果。
    pub async fn list_best_models(&self, task_ids: &[i64]) -> ModelOpsResult<Vec<TaskModels>> {
        let listed = try_join_all(task_ids.iter().map(|&id| self.task_models(id))).await?;
        debug!(tasks = listed.len(), "汇总最优模型");
        Ok(listed)
    }

    async fn task_models(&self, task_id: i64) -> ModelOpsResult<TaskModels> {
        if self.tasks.get_by_id(task_id).await?.is_none() {
            return Err(ModelOpsError::TaskNotFound { id: task_id });
        }

        let mut modelings = Vec::new();
        for modeling in self.modelings.list_by_task(task_id).await? {
            // 没有最优模型记录的建模不可加载
            let Some(best) = self.details.select_best_models(modeling.id).await? else {
                continue;
            };
            modelings.push(ModelingModels {
                modeling_id: modeling.id,
                modeling_type: modeling.modeling_type,
                step: modeling.step,
                model_paths: best.model_paths(),
            });
        }
        Ok(TaskModels { task_id, modelings })
    }
}
