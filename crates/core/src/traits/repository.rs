//! 持久化仓储抽象

use async_trait::async_trait;

use crate::models::{
    BestModels, Dataset, DatasetRoot, DatasetValidation, Device, DeviceWithGpus, Gpu, GpuState,
    Modeling, ModelingParams, ModelingStep, ModelingType, NewDataset, NewDevice, NewModeling,
    NewTask, ReportedGpu, Task,
};
use crate::ModelOpsResult;

/// 数据集根目录与数据集树节点仓储
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    async fn create_root(&self, path: &str) -> ModelOpsResult<DatasetRoot>;
    async fn set_root_active(&self, root_id: i64, is_active: bool) -> ModelOpsResult<()>;
    async fn list_active_roots(&self) -> ModelOpsResult<Vec<DatasetRoot>>;
    async fn get_root(&self, root_id: i64) -> ModelOpsResult<Option<DatasetRoot>>;

    async fn get_by_id(&self, id: i64) -> ModelOpsResult<Option<Dataset>>;
    /// 根目录下的全部节点，包括已软删除的
    async fn list_by_root(&self, root_id: i64) -> ModelOpsResult<Vec<Dataset>>;
    async fn find_by_path(&self, root_id: i64, path: &str) -> ModelOpsResult<Option<Dataset>>;
    async fn insert(&self, dataset: &NewDataset) -> ModelOpsResult<Dataset>;
    async fn set_deleted(&self, id: i64, is_deleted: bool) -> ModelOpsResult<()>;
    async fn set_leaf(&self, id: i64, is_leaf: bool) -> ModelOpsResult<()>;
    async fn update_validation(
        &self,
        id: i64,
        validation: &DatasetValidation,
    ) -> ModelOpsResult<()>;
    async fn update_statistics(
        &self,
        id: i64,
        statistics: &serde_json::Value,
        statistics_dir: Option<&str>,
    ) -> ModelOpsResult<()>;
}

/// 设备/GPU资源池
///
/// `select_*` 与 `try_claim` 之间没有锁；调度器依赖 `try_claim` 的
/// 原子性保证同一GPU不会被两个建模同时占用。
#[async_trait]
pub trait ResourcePool: Send + Sync {
    async fn register_device(&self, device: &NewDevice) -> ModelOpsResult<Device>;
    async fn set_device_use(&self, device_id: i64, is_use: bool) -> ModelOpsResult<()>;
    async fn get_device(&self, device_id: i64) -> ModelOpsResult<Option<Device>>;
    async fn get_gpu(&self, gpu_id: i64) -> ModelOpsResult<Option<Gpu>>;

    /// 拥有这些GPU中任一块空闲GPU的设备
    async fn select_idle_by_gpu(&self, gpu_ids: &[i64]) -> ModelOpsResult<Vec<Device>>;
    /// 拥有这些GPU中任一块的设备，不看GPU状态
    async fn select_by_gpu(&self, gpu_ids: &[i64]) -> ModelOpsResult<Vec<Device>>;
    async fn select_active_devices(&self) -> ModelOpsResult<Vec<Device>>;
    /// `is_use=true` 且 `state=idle` 的GPU，按id升序
    async fn select_idle_gpus(&self) -> ModelOpsResult<Vec<Gpu>>;

    /// 按uuid upsert设备上报的GPU，新GPU默认为 `idle`
    async fn refresh(&self, device_id: i64, reported: &[ReportedGpu]) -> ModelOpsResult<()>;
    /// 全部GPU置为 `is_use=false, state=idle`
    async fn set_all_disuse(&self) -> ModelOpsResult<()>;
    async fn set_many_state(&self, gpu_ids: &[i64], state: GpuState) -> ModelOpsResult<()>;
    /// 仅当所有GPU都可用时，原子地把它们切换到 `state`
    async fn try_claim(&self, gpu_ids: &[i64], state: GpuState) -> ModelOpsResult<bool>;
    /// 只把当前处于 `from` 的GPU切换到 `to`，返回实际切换的数量
    async fn transition_state(
        &self,
        gpu_ids: &[i64],
        from: GpuState,
        to: GpuState,
    ) -> ModelOpsResult<u64>;

    async fn snapshot(&self) -> ModelOpsResult<Vec<DeviceWithGpus>>;
}

/// 任务仓储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 在同一事务中写入Task及其 `idle` 状态的初始建模
    async fn create_with_modeling(
        &self,
        task: &NewTask,
        modeling_type: ModelingType,
    ) -> ModelOpsResult<(Task, Modeling)>;
    async fn get_by_id(&self, id: i64) -> ModelOpsResult<Option<Task>>;
    async fn delete(&self, id: i64) -> ModelOpsResult<()>;
}

/// 建模尝试仓储
#[async_trait]
pub trait ModelingRepository: Send + Sync {
    async fn create(&self, modeling: &NewModeling) -> ModelOpsResult<Modeling>;
    async fn get_by_id(&self, id: i64) -> ModelOpsResult<Option<Modeling>>;
    /// 按创建时间升序
    async fn list_by_step(&self, step: ModelingStep) -> ModelOpsResult<Vec<Modeling>>;
    async fn list_by_task(&self, task_id: i64) -> ModelOpsResult<Vec<Modeling>>;
    async fn count_by_task(&self, task_id: i64) -> ModelOpsResult<i64>;
    async fn update_step(&self, id: i64, step: ModelingStep) -> ModelOpsResult<()>;
    async fn update_params(&self, id: i64, params: &ModelingParams) -> ModelOpsResult<()>;
    async fn update_progress(&self, id: i64, progress: f64) -> ModelOpsResult<()>;
    async fn delete(&self, id: i64) -> ModelOpsResult<()>;
}

/// 建模结果详情（最优模型字典等）
#[async_trait]
pub trait ModelingDetailRepository: Send + Sync {
    async fn save_detail(
        &self,
        modeling_id: i64,
        detail_type: &str,
        data: &serde_json::Value,
    ) -> ModelOpsResult<()>;
    async fn get_detail(
        &self,
        modeling_id: i64,
        detail_type: &str,
    ) -> ModelOpsResult<Option<serde_json::Value>>;
    async fn select_best_models(&self, modeling_id: i64) -> ModelOpsResult<Option<BestModels>>;
}
