use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use modelops_core::{
    models::{Device, EngineType, Gpu, GpuState, LoadModelRequest, UnloadModelRequest},
    traits::{ModelingDetailRepository, ResourcePool, WorkerClient},
    ModelOpsError, ModelOpsResult,
};
use modelops_infrastructure::{MetricsCollector, StructuredLogger};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Worker卸载成功时响应体中包含的文本
const UNLOAD_ACKNOWLEDGEMENT: &str = "Successfully";

/// 已加载到GPU上的推理模型
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedModel {
    /// 进程内递增的编号，推理请求以此定位模型
    pub test_id: i64,
    pub modeling_id: i64,
    pub gpu_id: i64,
    pub gpu_uuid: String,
    /// Worker本地的GPU序号
    pub gpu_index: i32,
    pub base_url: String,
    pub model_name: String,
    /// Worker为这次加载分配的实例编号
    pub model_num: i64,
    pub engine_type: EngineType,
}

/// 一台设备上加载的模型
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInventory {
    pub device: Device,
    pub models: Vec<LoadedModel>,
}

/// 进程内的模型登记表
///
/// 所有登记项都在一把读写锁之后；调用Worker时不持有锁，
/// 登记表只在Worker确认后修改。
pub struct ModelRegistry {
    details: Arc<dyn ModelingDetailRepository>,
    resources: Arc<dyn ResourcePool>,
    pub(crate) worker: Arc<dyn WorkerClient>,
    metrics: Arc<MetricsCollector>,
    entries: RwLock<Vec<LoadedModel>>,
    next_test_id: AtomicI64,
}

impl ModelRegistry {
    pub fn new(
        details: Arc<dyn ModelingDetailRepository>,
        resources: Arc<dyn ResourcePool>,
        worker: Arc<dyn WorkerClient>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            details,
            resources,
            worker,
            metrics,
            entries: RwLock::new(Vec::new()),
            next_test_id: AtomicI64::new(0),
        }
    }

    /// 把建模产出的最优模型加载到指定GPU
    ///
    /// 模型文件从最优模型字典中按名称子串查找。加载成功后空闲GPU标记为
    /// `inference`；其他状态的GPU保持原状态。
    pub async fn load(
        &self,
        modeling_id: i64,
        model_name: &str,
        gpu_id: i64,
        engine_type: EngineType,
    ) -> ModelOpsResult<LoadedModel> {
        let best = self
            .details
            .select_best_models(modeling_id)
            .await?
            .ok_or_else(|| {
                ModelOpsError::ModelNotFound(format!("建模 {modeling_id} 没有最优模型记录"))
            })?;
        let file = best
            .find(model_name)
            .ok_or_else(|| ModelOpsError::ModelNotFound(model_name.to_string()))?;

        let (gpu, device) = self.resolve_gpu(gpu_id).await?;
        let base_url = device.base_url();
        let request = LoadModelRequest {
            device_id: gpu.gpu_index,
            model_name: model_name.to_string(),
            model_path: file.path,
            model_type: file.model_type,
        };
        let response = self.worker.load_model(&base_url, &request).await?;
        let model_num = response
            .latest_model_num()
            .ok_or_else(|| ModelOpsError::WorkerRequest {
                endpoint: format!("{base_url}/api/load"),
                message: "响应中没有模型编号".to_string(),
            })?;

        let loaded = LoadedModel {
            test_id: self.next_test_id.fetch_add(1, Ordering::SeqCst) + 1,
            modeling_id,
            gpu_id: gpu.id,
            gpu_uuid: gpu.uuid.clone(),
            gpu_index: gpu.gpu_index,
            base_url,
            model_name: model_name.to_string(),
            model_num,
            engine_type,
        };
        let count = {
            let mut entries = self.entries.write().await;
            entries.push(loaded.clone());
            entries.len()
        };

        // 按加载完成时的状态判断，期间被训练占用的GPU保持 `modeling`
        if !self
            .resources
            .try_claim(&[gpu.id], GpuState::Inference)
            .await?
        {
            debug!(gpu.id = gpu.id, "GPU不是空闲状态，保留原状态");
        }
        self.metrics.update_loaded_models(count);
        StructuredLogger::log_model_loaded(loaded.test_id, gpu.id, model_name, model_num);
        Ok(loaded)
    }

    /// 卸载一个已加载的模型
    ///
    /// 只有Worker响应中包含确认文本时才移除登记项，返回是否已移除。
    pub async fn unload(&self, test_id: i64, gpu_id: i64) -> ModelOpsResult<bool> {
        let entry = self
            .find_first(|e| e.test_id == test_id && e.gpu_id == gpu_id)
            .await
            .ok_or(ModelOpsError::LoadedModelNotFound { test_id })?;
        self.unload_entry(&entry).await
    }

    /// 卸载某块GPU上指定名称的全部模型，返回移除的数量
    pub async fn unload_by_gpu_and_model_name(
        &self,
        gpu_id: i64,
        model_name: &str,
    ) -> ModelOpsResult<usize> {
        let targets: Vec<LoadedModel> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.gpu_id == gpu_id && e.model_name == model_name)
            .cloned()
            .collect();

        let mut removed = 0;
        for entry in &targets {
            if self.unload_entry(entry).await? {
                removed += 1;
            }
        }
        debug!(
            gpu.id = gpu_id,
            model.name = model_name,
            matched = targets.len(),
            removed,
            "按GPU和模型名卸载"
        );
        Ok(removed)
    }

    pub async fn get_test_id_by_gpu_and_model_name(
        &self,
        gpu_id: i64,
        model_name: &str,
    ) -> Option<i64> {
        self.find_first(|e| e.gpu_id == gpu_id && e.model_name == model_name)
            .await
            .map(|e| e.test_id)
    }

    pub async fn get(&self, test_id: i64) -> ModelOpsResult<LoadedModel> {
        self.find_first(|e| e.test_id == test_id)
            .await
            .ok_or(ModelOpsError::LoadedModelNotFound { test_id })
    }

    pub async fn list(&self) -> Vec<LoadedModel> {
        self.entries.read().await.clone()
    }

    /// 按设备汇总已加载的模型，没有加载模型的设备不出现在结果中
    pub async fn grouped_by_device(&self) -> ModelOpsResult<Vec<DeviceInventory>> {
        let snapshot = self.resources.snapshot().await?;
        let entries = self.list().await;

        let mut grouped = Vec::new();
        for device in snapshot {
            let models: Vec<LoadedModel> = entries
                .iter()
                .filter(|e| device.owns_gpu_uuid(&e.gpu_uuid))
                .cloned()
                .collect();
            if !models.is_empty() {
                grouped.push(DeviceInventory {
                    device: device.device,
                    models,
                });
            }
        }

        let placed: usize = grouped.iter().map(|g| g.models.len()).sum();
        if placed < entries.len() {
            warn!(
                orphaned = entries.len() - placed,
                "部分已加载模型的GPU不在资源池中"
            );
        }
        Ok(grouped)
    }

    async fn unload_entry(&self, entry: &LoadedModel) -> ModelOpsResult<bool> {
        let request = UnloadModelRequest {
            device_id: entry.gpu_index,
            model_name: entry.model_name.clone(),
            model_num: entry.model_num,
        };
        let body = self.worker.unload_model(&entry.base_url, &request).await?;
        if !body.contains(UNLOAD_ACKNOWLEDGEMENT) {
            warn!(
                test.id = entry.test_id,
                gpu.id = entry.gpu_id,
                response = %body,
                "Worker未确认卸载，保留登记项"
            );
            return Ok(false);
        }

        let (count, gpu_still_loaded) = {
            let mut entries = self.entries.write().await;
            entries.retain(|e| e.test_id != entry.test_id);
            let still_loaded = entries.iter().any(|e| e.gpu_id == entry.gpu_id);
            (entries.len(), still_loaded)
        };

        if !gpu_still_loaded {
            self.release_inference_gpu(entry.gpu_id).await?;
        }
        self.metrics.update_loaded_models(count);
        StructuredLogger::log_model_unloaded(entry.test_id, entry.gpu_id, &entry.model_name);
        Ok(true)
    }

    /// GPU上最后一个模型卸载后，`inference` 状态恢复为 `idle`
    async fn release_inference_gpu(&self, gpu_id: i64) -> ModelOpsResult<()> {
        self.resources
            .transition_state(&[gpu_id], GpuState::Inference, GpuState::Idle)
            .await?;
        Ok(())
    }

    async fn resolve_gpu(&self, gpu_id: i64) -> ModelOpsResult<(Gpu, Device)> {
        let gpu = self
            .resources
            .get_gpu(gpu_id)
            .await?
            .ok_or(ModelOpsError::GpuNotFound { id: gpu_id })?;
        let device = self
            .resources
            .get_device(gpu.device_id)
            .await?
            .ok_or(ModelOpsError::DeviceNotFound { id: gpu.device_id })?;
        Ok((gpu, device))
    }

    async fn find_first<F>(&self, predicate: F) -> Option<LoadedModel>
    where
        F: Fn(&LoadedModel) -> bool,
    {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| predicate(e))
            .cloned()
    }
}
