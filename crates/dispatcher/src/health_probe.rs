use std::sync::Arc;
use std::time::Duration;

use modelops_core::{
    models::{Device, GpuState, SystemInfo},
    traits::{ModelingRepository, ResourcePool, WorkerClient},
    ModelOpsResult,
};
use modelops_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::gpu_matcher::GpuMatcher;
use crate::AllocationLock;

/// 一轮探测的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub responding: Vec<i64>,
    pub unreachable: Vec<i64>,
}

/// 设备健康探测
///
/// 每轮先把全部GPU置为不可用，再用响应设备上报的GPU清单刷新；
/// 刷新后按数据库中的建模、在途下发和探测前的推理占用恢复GPU状态。
pub struct HealthProbe {
    resources: Arc<dyn ResourcePool>,
    worker: Arc<dyn WorkerClient>,
    matcher: GpuMatcher,
    metrics: Arc<MetricsCollector>,
    allocation: AllocationLock,
    interval: Duration,
}

impl HealthProbe {
    pub fn new(
        resources: Arc<dyn ResourcePool>,
        modelings: Arc<dyn ModelingRepository>,
        worker: Arc<dyn WorkerClient>,
        metrics: Arc<MetricsCollector>,
        allocation: AllocationLock,
        interval: Duration,
    ) -> Self {
        Self {
            matcher: GpuMatcher::new(resources.clone(), modelings),
            resources,
            worker,
            metrics,
            allocation,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动设备健康探测循环，间隔 {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.probe_all().await {
                        StructuredLogger::log_system_error("health_probe", "probe_all", &e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("设备健康探测循环收到关闭信号");
                    break;
                }
            }
        }
    }

    pub async fn probe_all(&self) -> ModelOpsResult<ProbeReport> {
        let devices = self.resources.select_active_devices().await?;
        let mut report = ProbeReport::default();
        let mut responses: Vec<(Device, SystemInfo)> = Vec::new();

        for device in devices {
            let url = device.base_url();
            match self.worker.probe_system(&url).await {
                Ok(info) => {
                    StructuredLogger::log_device_probe(device.id, &url, info.gpus.len());
                    report.responding.push(device.id);
                    responses.push((device, info));
                }
                Err(e) => {
                    StructuredLogger::log_device_unreachable(device.id, &url, &e);
                    report.unreachable.push(device.id);
                }
            }
        }

        // HTTP探测在锁外完成，锁内只有数据库写入
        let pending = self.allocation.lock().await;
        let inference: Vec<i64> = self
            .resources
            .snapshot()
            .await?
            .into_iter()
            .flat_map(|d| d.gpus)
            .filter(|g| g.state == GpuState::Inference)
            .map(|g| g.id)
            .collect();

        self.resources.set_all_disuse().await?;
        for (device, info) in &responses {
            self.resources.refresh(device.id, &info.gpus).await?;
        }

        let mut held = self.matcher.held_gpu_ids().await?;
        held.extend(pending.gpu_ids());
        let held_ids: Vec<i64> = held.iter().copied().collect();
        let inference_ids: Vec<i64> = inference
            .into_iter()
            .filter(|id| !held.contains(id))
            .collect();
        self.resources
            .set_many_state(&held_ids, GpuState::Modeling)
            .await?;
        self.resources
            .set_many_state(&inference_ids, GpuState::Inference)
            .await?;

        self.metrics
            .update_responding_devices(report.responding.len());
        debug!(
            responding = report.responding.len(),
            unreachable = report.unreachable.len(),
            held = held_ids.len(),
            "设备探测完成"
        );
        Ok(report)
    }
}
