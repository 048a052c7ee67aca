use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 被监视的数据集根目录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetRoot {
    pub id: i64,
    pub path: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// 数据集树中的一个节点
///
/// `path` 在同一根目录下唯一，是文件系统状态与持久化状态之间的连接键。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub id: i64,
    pub root_id: i64,
    pub name: String,
    pub path: String,
    /// 0 表示根层级节点
    pub parent_id: i64,
    pub is_leaf: bool,
    pub is_deleted: bool,
    pub is_valid: bool,
    pub is_trainable: bool,
    pub is_testable: bool,
    pub data_type: Option<String>,
    pub data_format: Option<String>,
    pub engine_types: Vec<String>,
    pub statistics: Option<serde_json::Value>,
    pub statistics_dir: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn validation(&self) -> DatasetValidation {
        DatasetValidation {
            is_valid: self.is_valid,
            is_trainable: self.is_trainable,
            is_testable: self.is_testable,
            data_type: self.data_type.clone(),
            data_format: self.data_format.clone(),
            engine_types: self.engine_types.clone(),
        }
    }

    pub fn supports_engine(&self, engine: &str) -> bool {
        self.engine_types.iter().any(|e| e == engine)
    }
}

/// 首次在磁盘上发现的节点
#[derive(Debug, Clone, PartialEq)]
pub struct NewDataset {
    pub root_id: i64,
    pub name: String,
    pub path: String,
    pub parent_id: i64,
    pub is_leaf: bool,
}

/// 校验器写回的数据集标记
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatasetValidation {
    pub is_valid: bool,
    pub is_trainable: bool,
    pub is_testable: bool,
    pub data_type: Option<String>,
    pub data_format: Option<String>,
    pub engine_types: Vec<String>,
}
