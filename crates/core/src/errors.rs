use thiserror::Error;

/// 控制平面错误类型定义
#[derive(Debug, Error)]
pub enum ModelOpsError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移错误: {0}")]
    Migration(String),

    #[error("数据集根目录未找到: {id}")]
    DatasetRootNotFound { id: i64 },

    #[error("数据集未找到: {id}")]
    DatasetNotFound { id: i64 },

    #[error("设备未找到: {id}")]
    DeviceNotFound { id: i64 },

    #[error("GPU未找到: {id}")]
    GpuNotFound { id: i64 },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("建模记录未找到: {id}")]
    ModelingNotFound { id: i64 },

    #[error("建模正在进行中: {id} ({step})")]
    ModelingInProgress { id: i64, step: String },

    #[error("建模状态不允许该操作: {id} {from} -> {to}")]
    InvalidTransition { id: i64, from: String, to: String },

    #[error("可用GPU不足")]
    NotEnoughGpus,

    #[error("多节点调度尚未实现: 涉及 {device_count} 个设备")]
    MultiNodeNotImplemented { device_count: usize },

    #[error("模型未找到: {0}")]
    ModelNotFound(String),

    #[error("已加载模型未找到: test_id={test_id}")]
    LoadedModelNotFound { test_id: i64 },

    #[error("引擎类型不匹配: 期望 {expected}, 实际 {actual}")]
    EngineMismatch { expected: String, actual: String },

    #[error("Worker请求失败: {endpoint} - {message}")]
    WorkerRequest { endpoint: String, message: String },

    #[error("Worker返回错误状态: {endpoint} HTTP {status} - {body}")]
    WorkerStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("文件系统错误: {0}")]
    FileSystem(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的参数: {0}")]
    InvalidArgument(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ModelOpsError {
    /// 稳定的错误码，供调用方展示和匹配
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "DATABASE_MIGRATION_ERROR",
            Self::DatasetRootNotFound { .. } => "DATASET_ROOT_NOT_FOUND",
            Self::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            Self::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Self::GpuNotFound { .. } => "GPU_NOT_FOUND",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::ModelingNotFound { .. } => "MODELING_NOT_FOUND",
            Self::ModelingInProgress { .. } => "MODELING_IN_PROGRESS",
            Self::InvalidTransition { .. } => "MODELING_INVALID_TRANSITION",
            Self::NotEnoughGpus => "MODELING_DEVICE_NOT_EXIST",
            Self::MultiNodeNotImplemented { .. } => "MODELING_MULTI_NODE_NOT_IMPLEMENTED",
            Self::ModelNotFound(_) => "MODEL_NOT_FOUND",
            Self::LoadedModelNotFound { .. } => "LOADED_MODEL_NOT_FOUND",
            Self::EngineMismatch { .. } => "ENGINE_MISMATCH",
            Self::WorkerRequest { .. } => "WORKER_REQUEST_FAILED",
            Self::WorkerStatus { .. } => "WORKER_STATUS_ERROR",
            Self::FileSystem(_) => "FILE_SYSTEM_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为远程Worker相关错误
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::WorkerRequest { .. } | Self::WorkerStatus { .. })
    }

    pub fn worker_request(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::WorkerRequest {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ModelOpsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ModelOpsError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(err.to_string())
    }
}

/// 统一的Result类型
pub type ModelOpsResult<T> = std::result::Result<T, ModelOpsError>;
