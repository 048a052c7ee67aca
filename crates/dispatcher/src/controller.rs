use std::sync::Arc;

use modelops_core::{
    models::{
        Device, EngineType, GpuState, Modeling, ModelingParams, ModelingStep, ModelingType,
        NewModeling, NewTask, Task,
    },
    traits::{ModelingRepository, ResourcePool, TaskRepository, WorkerClient},
    ModelOpsError, ModelOpsResult,
};
use modelops_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gpu_matcher::GpuMatcher;
use crate::AllocationLock;

/// 面向用户操作的建模控制器
///
/// 启动、追加、取消和删除都同步返回结果；远程Worker的确认只作参考，
/// 本地状态以数据库为准。
pub struct ModelingController {
    tasks: Arc<dyn TaskRepository>,
    modelings: Arc<dyn ModelingRepository>,
    resources: Arc<dyn ResourcePool>,
    worker: Arc<dyn WorkerClient>,
    matcher: GpuMatcher,
    metrics: Arc<MetricsCollector>,
    allocation: AllocationLock,
}

impl ModelingController {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        modelings: Arc<dyn ModelingRepository>,
        resources: Arc<dyn ResourcePool>,
        worker: Arc<dyn WorkerClient>,
        metrics: Arc<MetricsCollector>,
        allocation: AllocationLock,
    ) -> Self {
        Self {
            matcher: GpuMatcher::new(resources.clone(), modelings.clone()),
            tasks,
            modelings,
            resources,
            worker,
            metrics,
            allocation,
        }
    }

    /// 创建Task及其 `idle` 状态的初始建模
    pub async fn start_modeling(&self, task: &NewTask) -> ModelOpsResult<(Task, Modeling)> {
        if !task.params.gpu_auto && task.params.device_ids.is_empty() {
            return Err(ModelOpsError::InvalidArgument(
                "未指定GPU且未开启自动分配".to_string(),
            ));
        }

        let (task, modeling) = self
            .tasks
            .create_with_modeling(task, ModelingType::Initial)
            .await?;
        info!(
            task.id = task.id,
            modeling.id = modeling.id,
            engine = %task.engine_type,
            "创建建模任务"
        );
        Ok((task, modeling))
    }

    /// 在已完成的建模上继续训练
    pub async fn request_update(&self, parent_id: i64, data_path: &str) -> ModelOpsResult<Modeling> {
        self.request_child(parent_id, ModelingType::Update, data_path)
            .await
    }

    /// 用已完成建模的模型评估新数据
    pub async fn request_evaluation(
        &self,
        parent_id: i64,
        data_path: &str,
    ) -> ModelOpsResult<Modeling> {
        self.request_child(parent_id, ModelingType::Evaluation, data_path)
            .await
    }

    /// 对无标签图像做盲测推理，仅支持图像分类引擎
    pub async fn request_blind(&self, parent_id: i64, data_path: &str) -> ModelOpsResult<Modeling> {
        self.request_child(parent_id, ModelingType::Blind, data_path)
            .await
    }

    async fn request_child(
        &self,
        parent_id: i64,
        modeling_type: ModelingType,
        data_path: &str,
    ) -> ModelOpsResult<Modeling> {
        let parent = self.get_modeling(parent_id).await?;
        if parent.step != ModelingStep::Complete {
            return Err(ModelOpsError::InvalidTransition {
                id: parent.id,
                from: parent.step.to_string(),
                to: modeling_type.to_string(),
            });
        }

        let engine = parent.params.engine_type();
        if modeling_type == ModelingType::Blind && !engine.is_vision() {
            return Err(ModelOpsError::EngineMismatch {
                expected: EngineType::VisionClassification.to_string(),
                actual: engine.to_string(),
            });
        }

        let child = self
            .modelings
            .create(&NewModeling {
                task_id: parent.task_id,
                parent_id: parent.id,
                modeling_type,
                params: Self::child_params(&parent.params, modeling_type, data_path),
            })
            .await?;
        info!(
            modeling.id = child.id,
            parent.id = parent.id,
            modeling.kind = modeling_type.as_str(),
            "创建子建模"
        );
        Ok(child)
    }

    /// 复制父建模参数，换成新的数据路径和独立的保存目录
    ///
    /// 自动分配GPU的父建模会清空已选GPU，让调度器重新挑选。
    fn child_params(
        parent: &ModelingParams,
        modeling_type: ModelingType,
        data_path: &str,
    ) -> ModelingParams {
        let mut params = parent.clone();
        params.data_path = data_path.to_string();
        params.save_path = format!(
            "{}/{}_{}",
            parent.save_path.trim_end_matches('/'),
            modeling_type.as_str(),
            Uuid::new_v4().simple()
        );
        if params.gpu_auto {
            params.device_ids.clear();
        }
        params
    }

    /// 取消建模
    ///
    /// 本地步骤总是改为 `cancel`，`request`/`run` 占用的GPU归还为 `idle`；
    /// 本地写入完成后才通知Worker，远程失败只记录日志。
    pub async fn cancel_modeling(&self, modeling_id: i64) -> ModelOpsResult<Modeling> {
        let (modeling, assignment) = {
            let _pending = self.allocation.lock().await;
            let modeling = self.get_modeling(modeling_id).await?;
            if !modeling.step.is_cancellable() {
                return Err(ModelOpsError::InvalidTransition {
                    id: modeling.id,
                    from: modeling.step.to_string(),
                    to: ModelingStep::Cancel.to_string(),
                });
            }

            // idle 建模还没有占用GPU
            if modeling.step.holds_gpu() {
                self.resources
                    .set_many_state(&modeling.params.device_ids, GpuState::Idle)
                    .await?;
            }
            self.modelings
                .update_step(modeling.id, ModelingStep::Cancel)
                .await?;

            let assignment = if modeling.params.device_ids.is_empty() {
                None
            } else {
                Some(self.matcher.match_assigned(&modeling).await)
            };
            (modeling, assignment)
        };

        let gpu_ids = &modeling.params.device_ids;
        let mut remote_acknowledged = false;
        if let Some(assignment) = assignment {
            let result = match assignment {
                Ok(assignment) => {
                    self.worker
                        .cancel(&assignment.base_url(), modeling.id)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => remote_acknowledged = true,
                Err(e) => warn!(modeling.id = modeling.id, "通知Worker取消失败: {e}"),
            }
        }

        self.metrics.record_cancellation();
        StructuredLogger::log_modeling_cancelled(modeling.id, gpu_ids, remote_acknowledged);
        self.get_modeling(modeling_id).await
    }

    /// 删除建模
    ///
    /// - `idle`：直接删除，若是Task的最后一个建模则一并删除Task
    /// - 进行中：拒绝
    /// - 终态：删除后通知所有相关设备删除保存目录
    ///
    /// 步骤检查和删除在分配锁内完成，不会与正在下发的同一建模交错。
    pub async fn delete_modeling(&self, modeling_id: i64) -> ModelOpsResult<()> {
        let (modeling, devices, task_deleted) = {
            let _pending = self.allocation.lock().await;
            let modeling = self.get_modeling(modeling_id).await?;
            Self::ensure_deletable(&modeling)?;

            let devices = self.artifact_devices(&modeling).await;
            self.modelings.delete(modeling.id).await?;
            let task_deleted = if self.modelings.count_by_task(modeling.task_id).await? == 0 {
                self.tasks.delete(modeling.task_id).await?;
                true
            } else {
                false
            };
            (modeling, devices, task_deleted)
        };

        self.remove_artifacts(&modeling, devices).await;
        StructuredLogger::log_modeling_deleted(modeling.id, modeling.task_id, task_deleted);
        Ok(())
    }

    /// 删除Task及其全部建模，任何一个建模在进行中都会拒绝整个删除
    pub async fn delete_task(&self, task_id: i64) -> ModelOpsResult<()> {
        let removed = {
            let _pending = self.allocation.lock().await;
            if self.tasks.get_by_id(task_id).await?.is_none() {
                return Err(ModelOpsError::TaskNotFound { id: task_id });
            }

            let modelings = self.modelings.list_by_task(task_id).await?;
            for modeling in &modelings {
                Self::ensure_deletable(modeling)?;
            }

            let mut removed = Vec::with_capacity(modelings.len());
            for modeling in modelings {
                let devices = self.artifact_devices(&modeling).await;
                self.modelings.delete(modeling.id).await?;
                removed.push((modeling, devices));
            }
            self.tasks.delete(task_id).await?;
            removed
        };

        let count = removed.len();
        for (modeling, devices) in removed {
            self.remove_artifacts(&modeling, devices).await;
            StructuredLogger::log_modeling_deleted(modeling.id, task_id, false);
        }
        info!(task.id = task_id, modelings = count, "删除任务");
        Ok(())
    }

    fn ensure_deletable(modeling: &Modeling) -> ModelOpsResult<()> {
        if modeling.step.is_in_progress() {
            return Err(ModelOpsError::ModelingInProgress {
                id: modeling.id,
                step: modeling.step.to_string(),
            });
        }
        Ok(())
    }

    /// 终态建模的产物所在设备，其他建模没有产物
    async fn artifact_devices(&self, modeling: &Modeling) -> Vec<Device> {
        if !modeling.is_terminal() {
            return Vec::new();
        }
        match self.matcher.owning_devices(modeling).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(modeling.id = modeling.id, "查询建模所属设备失败: {e}");
                Vec::new()
            }
        }
    }

    async fn remove_artifacts(&self, modeling: &Modeling, devices: Vec<Device>) {
        for device in devices {
            let url = device.base_url();
            match self
                .worker
                .remove_artifacts(&url, &modeling.params.save_path)
                .await
            {
                Ok(()) => debug!(
                    modeling.id = modeling.id,
                    device.url = %url,
                    "删除建模产物"
                ),
                Err(e) => warn!(
                    modeling.id = modeling.id,
                    device.url = %url,
                    "通知Worker删除产物失败: {e}"
                ),
            }
        }
    }

    async fn get_modeling(&self, modeling_id: i64) -> ModelOpsResult<Modeling> {
        self.modelings
            .get_by_id(modeling_id)
            .await?
            .ok_or(ModelOpsError::ModelingNotFound { id: modeling_id })
    }
}
