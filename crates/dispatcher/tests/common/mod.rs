#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use modelops_core::models::{Modeling, ModelingParams, ModelingStep, ModelingType};
use modelops_core::traits::{ModelingRepository, TaskRepository};
use modelops_dispatcher::{allocation_lock, HealthProbe, ModelingController, Scheduler};
use modelops_infrastructure::MetricsCollector;
use modelops_testing_utils::{MockWorkerClient, NewTaskBuilder, TestContext};

pub struct Harness {
    pub ctx: TestContext,
    pub worker: MockWorkerClient,
    pub scheduler: Arc<Scheduler>,
    pub controller: ModelingController,
    pub probe: HealthProbe,
}

impl Harness {
    pub async fn new() -> Self {
        let ctx = TestContext::new().await;
        let worker = MockWorkerClient::new();
        let metrics = Arc::new(MetricsCollector::new());
        let allocation = allocation_lock();

        let scheduler = Arc::new(Scheduler::new(
            ctx.modelings.clone(),
            ctx.resources.clone(),
            Arc::new(worker.clone()),
            metrics.clone(),
            allocation.clone(),
            Duration::from_millis(20),
        ));
        let controller = ModelingController::new(
            ctx.tasks.clone(),
            ctx.modelings.clone(),
            ctx.resources.clone(),
            Arc::new(worker.clone()),
            metrics.clone(),
            allocation.clone(),
        );
        let probe = HealthProbe::new(
            ctx.resources.clone(),
            ctx.modelings.clone(),
            Arc::new(worker.clone()),
            metrics,
            allocation,
            Duration::from_millis(20),
        );

        Self {
            ctx,
            worker,
            scheduler,
            controller,
            probe,
        }
    }

    /// 新建Task并返回其初始建模
    pub async fn create_modeling(&self, params: ModelingParams) -> Modeling {
        let task = NewTaskBuilder::new().with_params(params).build();
        let (_, modeling) = self
            .ctx
            .tasks
            .create_with_modeling(&task, ModelingType::Initial)
            .await
            .unwrap();
        modeling
    }

    /// 模拟Worker写入的步骤变化
    pub async fn set_step(&self, modeling_id: i64, step: ModelingStep) {
        self.ctx
            .modelings
            .update_step(modeling_id, step)
            .await
            .unwrap();
    }

    pub async fn modeling(&self, modeling_id: i64) -> Modeling {
        self.ctx
            .modelings
            .get_by_id(modeling_id)
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn url(port: i32) -> String {
    format!("http://127.0.0.1:{port}")
}
