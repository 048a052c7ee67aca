use std::collections::BTreeSet;
use std::sync::Arc;

use modelops_core::{
    models::{Device, Modeling, ModelingStep},
    traits::{ModelingRepository, ResourcePool},
    ModelOpsError, ModelOpsResult,
};
use tracing::debug;

/// 建模匹配到的单个设备及其GPU
#[derive(Debug, Clone, PartialEq)]
pub struct GpuAssignment {
    pub device: Device,
    pub gpu_ids: Vec<i64>,
}

impl GpuAssignment {
    pub fn base_url(&self) -> String {
        self.device.base_url()
    }
}

/// 把建模参数中的GPU id解析为所属设备
#[derive(Clone)]
pub struct GpuMatcher {
    resources: Arc<dyn ResourcePool>,
    modelings: Arc<dyn ModelingRepository>,
}

impl GpuMatcher {
    pub fn new(resources: Arc<dyn ResourcePool>, modelings: Arc<dyn ModelingRepository>) -> Self {
        Self {
            resources,
            modelings,
        }
    }

    /// 下发前的匹配
    ///
    /// `gpu_auto` 且尚未分配时取第一块空闲GPU，并把选择写回参数文档，
    /// 之后的重试和收尾都看到同一份分配。只在空闲GPU中解析设备。
    pub async fn match_for_dispatch(&self, modeling: &mut Modeling) -> ModelOpsResult<GpuAssignment> {
        if modeling.params.needs_auto_assignment() {
            let idle = self.resources.select_idle_gpus().await?;
            let first = idle.first().ok_or(ModelOpsError::NotEnoughGpus)?;
            modeling.params.device_ids = vec![first.id];
            self.modelings
                .update_params(modeling.id, &modeling.params)
                .await?;
            debug!(modeling.id = modeling.id, gpu.id = first.id, "自动分配GPU");
        }

        let devices = self
            .resources
            .select_idle_by_gpu(&modeling.params.device_ids)
            .await?;
        Self::single_device(devices, &modeling.params.device_ids)
    }

    /// 建模实际持有的GPU所在设备，不看GPU状态
    pub async fn match_assigned(&self, modeling: &Modeling) -> ModelOpsResult<GpuAssignment> {
        let devices = self
            .resources
            .select_by_gpu(&modeling.params.device_ids)
            .await?;
        Self::single_device(devices, &modeling.params.device_ids)
    }

    /// 拥有这些GPU的全部设备，删除产物时逐个通知
    pub async fn owning_devices(&self, modeling: &Modeling) -> ModelOpsResult<Vec<Device>> {
        self.resources
            .select_by_gpu(&modeling.params.device_ids)
            .await
    }

    /// 处于 `request`/`run` 的建模占用的全部GPU
    pub async fn held_gpu_ids(&self) -> ModelOpsResult<BTreeSet<i64>> {
        let mut held = BTreeSet::new();
        for step in [ModelingStep::Request, ModelingStep::Run] {
            for modeling in self.modelings.list_by_step(step).await? {
                held.extend(modeling.params.device_ids.iter().copied());
            }
        }
        Ok(held)
    }

    fn single_device(mut devices: Vec<Device>, gpu_ids: &[i64]) -> ModelOpsResult<GpuAssignment> {
        match devices.len() {
            0 => Err(ModelOpsError::NotEnoughGpus),
            1 => Ok(GpuAssignment {
                device: devices.remove(0),
                gpu_ids: gpu_ids.to_vec(),
            }),
            n => Err(ModelOpsError::MultiNodeNotImplemented { device_count: n }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelops_core::models::{GpuState, ModelingParams, ModelingType};
    use modelops_core::traits::TaskRepository;
    use modelops_testing_utils::{ModelingParamsBuilder, NewTaskBuilder, TestContext};

    async fn idle_modeling(ctx: &TestContext, params: ModelingParams) -> Modeling {
        let task = NewTaskBuilder::new().with_params(params).build();
        let (_, modeling) = ctx
            .tasks
            .create_with_modeling(&task, ModelingType::Initial)
            .await
            .unwrap();
        modeling
    }

    #[tokio::test]
    async fn test_auto_assignment_takes_first_idle_and_persists() {
        let ctx = TestContext::new().await;
        let (device, gpus) = ctx.seed_device("node-1", 8001, &["GPU-a", "GPU-b"]).await;
        let matcher = GpuMatcher::new(ctx.resources.clone(), ctx.modelings.clone());

        let mut modeling = idle_modeling(&ctx, ModelingParamsBuilder::new().build()).await;
        let assignment = matcher.match_for_dispatch(&mut modeling).await.unwrap();

        assert_eq!(assignment.device.id, device.id);
        assert_eq!(assignment.gpu_ids, vec![gpus[0].id]);
        let stored = ctx.modelings.get_by_id(modeling.id).await.unwrap().unwrap();
        assert_eq!(stored.params.device_ids, vec![gpus[0].id]);
    }

    #[tokio::test]
    async fn test_no_idle_gpu() {
        let ctx = TestContext::new().await;
        let (_, gpus) = ctx.seed_device("node-1", 8001, &["GPU-a"]).await;
        ctx.resources
            .set_many_state(&[gpus[0].id], GpuState::Modeling)
            .await
            .unwrap();
        let matcher = GpuMatcher::new(ctx.resources.clone(), ctx.modelings.clone());

        let mut auto = idle_modeling(&ctx, ModelingParamsBuilder::new().build()).await;
        let err = matcher.match_for_dispatch(&mut auto).await.unwrap_err();
        assert!(matches!(err, ModelOpsError::NotEnoughGpus));

        let mut fixed = idle_modeling(
            &ctx,
            ModelingParamsBuilder::new()
                .with_device_ids(vec![gpus[0].id])
                .build(),
        )
        .await;
        let err = matcher.match_for_dispatch(&mut fixed).await.unwrap_err();
        assert!(matches!(err, ModelOpsError::NotEnoughGpus));

        // 取消/收尾不看GPU状态
        let assignment = matcher.match_assigned(&fixed).await.unwrap();
        assert_eq!(assignment.gpu_ids, vec![gpus[0].id]);
    }

    #[tokio::test]
    async fn test_multi_node_rejected() {
        let ctx = TestContext::new().await;
        let (_, a) = ctx.seed_device("node-1", 8001, &["GPU-a"]).await;
        let (_, b) = ctx.seed_device("node-2", 8002, &["GPU-b"]).await;
        let matcher = GpuMatcher::new(ctx.resources.clone(), ctx.modelings.clone());

        let mut modeling = idle_modeling(
            &ctx,
            ModelingParamsBuilder::new()
                .with_device_ids(vec![a[0].id, b[0].id])
                .build(),
        )
        .await;
        let err = matcher.match_for_dispatch(&mut modeling).await.unwrap_err();
        assert!(matches!(
            err,
            ModelOpsError::MultiNodeNotImplemented { device_count: 2 }
        ));
    }

    #[tokio::test]
    async fn test_held_gpu_ids_only_request_and_run() {
        let ctx = TestContext::new().await;
        let ids = [
            (ModelingStep::Request, 1),
            (ModelingStep::Run, 2),
            (ModelingStep::Finish, 3),
            (ModelingStep::Idle, 4),
        ];
        for (step, gpu) in ids {
            let modeling = idle_modeling(
                &ctx,
                ModelingParamsBuilder::new().with_device_ids(vec![gpu]).build(),
            )
            .await;
            ctx.modelings.update_step(modeling.id, step).await.unwrap();
        }
        let matcher = GpuMatcher::new(ctx.resources.clone(), ctx.modelings.clone());

        let held: Vec<i64> = matcher.held_gpu_ids().await.unwrap().into_iter().collect();
        assert_eq!(held, vec![1, 2]);
    }
}
