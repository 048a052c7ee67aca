#![allow(dead_code)]

use std::sync::Arc;

use modelops_core::{
    models::{Modeling, ModelingType},
    traits::{ModelingDetailRepository, TaskRepository},
};
use modelops_infrastructure::{MetricsCollector, BEST_MODELS_DETAIL};
use modelops_registry::{ModelCatalog, ModelRegistry};
use modelops_testing_utils::{MockWorkerClient, NewTaskBuilder, TestContext};
use serde_json::{json, Value};

pub struct Harness {
    pub ctx: TestContext,
    pub worker: MockWorkerClient,
    pub registry: ModelRegistry,
    pub catalog: ModelCatalog,
}

impl Harness {
    pub async fn new() -> Self {
        let ctx = TestContext::new().await;
        let worker = MockWorkerClient::new();
        let registry = ModelRegistry::new(
            ctx.details.clone(),
            ctx.resources.clone(),
            Arc::new(worker.clone()),
            Arc::new(MetricsCollector::new()),
        );
        let catalog = ModelCatalog::new(
            ctx.tasks.clone(),
            ctx.modelings.clone(),
            ctx.details.clone(),
        );
        Self {
            ctx,
            worker,
            registry,
            catalog,
        }
    }

    /// 新建一个带最优模型字典的建模
    pub async fn trained_modeling(&self, best_models: Value) -> Modeling {
        let (_, modeling) = self
            .ctx
            .tasks
            .create_with_modeling(&NewTaskBuilder::new().build(), ModelingType::Initial)
            .await
            .unwrap();
        self.ctx
            .details
            .save_detail(modeling.id, BEST_MODELS_DETAIL, &best_models)
            .await
            .unwrap();
        modeling
    }
}

pub fn resnet_best_models() -> Value {
    json!({
        "accuracy": {
            "1": ["/models/t1/resnet_1.pt", "0.93", "vision"],
            "2": ["/models/t1/resnet_2.pt", "0.91", "vision"]
        }
    })
}

pub fn url(port: i32) -> String {
    format!("http://127.0.0.1:{port}")
}
