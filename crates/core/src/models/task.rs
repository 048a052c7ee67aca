use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EngineType, ModelingParams};

/// 一个建模工作单元
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub dataset_id: i64,
    pub engine_type: EngineType,
    pub target_metric: String,
    pub params: ModelingParams,
    pub created_at: DateTime<Utc>,
}

/// 创建任务请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub project_id: i64,
    pub dataset_id: i64,
    pub target_metric: String,
    pub params: ModelingParams,
}

impl NewTask {
    pub fn engine_type(&self) -> EngineType {
        self.params.engine_type()
    }
}
