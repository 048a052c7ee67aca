use std::sync::Arc;
use std::time::{Duration, Instant};

use modelops_core::{
    models::{GpuState, Modeling, ModelingStep},
    traits::{ModelingRepository, ResourcePool, WorkerClient},
    ModelOpsError, ModelOpsResult,
};
use modelops_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::gpu_matcher::{GpuAssignment, GpuMatcher};
use crate::AllocationLock;

/// 一次调度的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub finalized: Vec<i64>,
    pub dispatched: Vec<i64>,
    pub skipped: Vec<i64>,
}

/// 建模调度器
///
/// 每次调度先收尾 `finish` 建模，再按创建时间下发 `idle` 建模。
/// 单个建模出错只记录日志并跳过，下一次调度会重试。
pub struct Scheduler {
    modelings: Arc<dyn ModelingRepository>,
    resources: Arc<dyn ResourcePool>,
    worker: Arc<dyn WorkerClient>,
    matcher: GpuMatcher,
    metrics: Arc<MetricsCollector>,
    allocation: AllocationLock,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        modelings: Arc<dyn ModelingRepository>,
        resources: Arc<dyn ResourcePool>,
        worker: Arc<dyn WorkerClient>,
        metrics: Arc<MetricsCollector>,
        allocation: AllocationLock,
        interval: Duration,
    ) -> Self {
        Self {
            matcher: GpuMatcher::new(resources.clone(), modelings.clone()),
            modelings,
            resources,
            worker,
            metrics,
            allocation,
            interval,
        }
    }

    /// 运行调度循环，第一次调度在一个周期之后
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动调度循环，间隔 {:?}", self.interval);
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        StructuredLogger::log_system_error("scheduler", "tick", &e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到关闭信号");
                    break;
                }
            }
        }
    }

    #[instrument(name = "scheduler_tick", skip(self))]
    pub async fn tick(&self) -> ModelOpsResult<TickReport> {
        let start = Instant::now();
        let mut report = TickReport::default();

        for modeling in self.modelings.list_by_step(ModelingStep::Finish).await? {
            match self.finalize(&modeling).await {
                Ok(()) => report.finalized.push(modeling.id),
                Err(e) => {
                    StructuredLogger::log_modeling_skipped(modeling.id, "finalize", &e);
                    report.skipped.push(modeling.id);
                }
            }
        }

        for modeling in self.modelings.list_by_step(ModelingStep::Idle).await? {
            let id = modeling.id;
            match self.dispatch(id).await {
                Ok(true) => report.dispatched.push(id),
                Ok(false) => {}
                Err(e) => {
                    self.metrics.record_dispatch_failure(e.code());
                    StructuredLogger::log_modeling_skipped(id, "dispatch", &e);
                    report.skipped.push(id);
                }
            }
        }

        self.metrics
            .record_scheduler_tick(start.elapsed().as_secs_f64());
        debug!(
            finalized = report.finalized.len(),
            dispatched = report.dispatched.len(),
            skipped = report.skipped.len(),
            "调度完成"
        );
        Ok(report)
    }

    /// 通知Worker收尾，成功后释放未被其他建模占用的GPU
    ///
    /// 不改写建模步骤，`complete` 由Worker写入。
    pub async fn finalize(&self, modeling: &Modeling) -> ModelOpsResult<()> {
        let assignment = self.matcher.match_assigned(modeling).await?;
        let device_url = assignment.base_url();
        let response = self.worker.finish(&device_url, modeling.id).await?;
        StructuredLogger::log_finalize_requested(modeling.id, &device_url, &response);
        self.metrics.record_finalize_request();

        let pending = self.allocation.lock().await;
        let mut held = self.matcher.held_gpu_ids().await?;
        held.extend(pending.gpu_ids());
        let releasable: Vec<i64> = assignment
            .gpu_ids
            .iter()
            .copied()
            .filter(|id| !held.contains(id))
            .collect();
        self.resources
            .set_many_state(&releasable, GpuState::Idle)
            .await
    }

    /// 下发一个 `idle` 建模，返回是否实际下发
    ///
    /// 锁内占用GPU，锁外调用Worker，再回到锁内提交 `request` 或归还GPU。
    /// 调用期间建模被取消或删除时归还GPU，并通知Worker取消。
    pub async fn dispatch(&self, modeling_id: i64) -> ModelOpsResult<bool> {
        let Some((modeling, assignment)) = self.claim(modeling_id).await? else {
            return Ok(false);
        };
        let gpu_ids = assignment.gpu_ids.clone();
        let device_url = assignment.base_url();

        let sent = self
            .worker
            .dispatch(&device_url, modeling.dispatch_endpoint(), modeling.id)
            .await;

        let committed = {
            let mut pending = self.allocation.lock().await;
            pending.remove(modeling.id);
            match sent {
                Ok(_) => self.commit_request(modeling.id, &gpu_ids).await,
                Err(e) => {
                    self.release_claim(&gpu_ids).await?;
                    return Err(e);
                }
            }
        };

        match committed {
            Ok(true) => {
                self.metrics.record_dispatch(modeling.modeling_type.as_str());
                StructuredLogger::log_modeling_dispatched(
                    modeling.id,
                    modeling.modeling_type.as_str(),
                    &device_url,
                    &gpu_ids,
                );
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    modeling.id = modeling.id,
                    "下发期间建模已被取消或删除，归还GPU并通知Worker取消"
                );
                if let Err(e) = self.worker.cancel(&device_url, modeling.id).await {
                    warn!(modeling.id = modeling.id, "通知Worker取消失败: {e}");
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// 锁内重新读取建模并原子占用GPU，登记为在途
    async fn claim(&self, modeling_id: i64) -> ModelOpsResult<Option<(Modeling, GpuAssignment)>> {
        let mut pending = self.allocation.lock().await;
        if pending.contains_modeling(modeling_id) {
            return Ok(None);
        }

        // 等锁期间可能已被取消或删除
        let mut modeling = match self.modelings.get_by_id(modeling_id).await? {
            Some(current) if current.step == ModelingStep::Idle => current,
            _ => return Ok(None),
        };

        let assignment = self.matcher.match_for_dispatch(&mut modeling).await?;
        if !self
            .resources
            .try_claim(&assignment.gpu_ids, GpuState::Modeling)
            .await?
        {
            return Err(ModelOpsError::NotEnoughGpus);
        }
        pending.insert(modeling.id, assignment.gpu_ids.clone());
        Ok(Some((modeling, assignment)))
    }

    /// 建模仍为 `idle` 时写入 `request`，否则归还GPU；须在锁内调用
    async fn commit_request(&self, modeling_id: i64, gpu_ids: &[i64]) -> ModelOpsResult<bool> {
        let current = match self.modelings.get_by_id(modeling_id).await {
            Ok(current) => current,
            Err(e) => {
                self.release_claim(gpu_ids).await?;
                return Err(e);
            }
        };
        if current.is_some_and(|m| m.step == ModelingStep::Idle) {
            match self
                .modelings
                .update_step(modeling_id, ModelingStep::Request)
                .await
            {
                Ok(()) => return Ok(true),
                Err(e) => {
                    self.release_claim(gpu_ids).await?;
                    return Err(e);
                }
            }
        }
        self.release_claim(gpu_ids).await?;
        Ok(false)
    }

    async fn release_claim(&self, gpu_ids: &[i64]) -> ModelOpsResult<()> {
        self.resources
            .transition_state(gpu_ids, GpuState::Modeling, GpuState::Idle)
            .await?;
        Ok(())
    }
}
