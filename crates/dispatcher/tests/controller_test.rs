mod common;

use common::{url, Harness};
use modelops_core::models::{GpuState, ModelingStep, ModelingType};
use modelops_core::traits::{ModelingRepository, ResourcePool, TaskRepository};
use modelops_core::ModelOpsError;
use modelops_testing_utils::{ModelingParamsBuilder, NewTaskBuilder, WorkerCall, WorkerOp};

#[tokio::test]
async fn test_start_modeling_requires_gpu_selection() {
    let h = Harness::new().await;
    let params = ModelingParamsBuilder::new().with_gpu_auto(false).build();
    let err = h
        .controller
        .start_modeling(&NewTaskBuilder::new().with_params(params).build())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_cancel_with_unreachable_device_is_still_local() {
    let h = Harness::new().await;
    let (_, gpus) = h.ctx.seed_device("node-1", 8001, &["GPU-0"]).await;
    let modeling = h.create_modeling(ModelingParamsBuilder::new().build()).await;
    h.scheduler.tick().await.unwrap();
    assert_eq!(h.modeling(modeling.id).await.step, ModelingStep::Request);

    h.worker.set_unreachable(&url(8001));
    let cancelled = h.controller.cancel_modeling(modeling.id).await.unwrap();

    assert_eq!(cancelled.step, ModelingStep::Cancel);
    let gpu = h.ctx.resources.get_gpu(gpus[0].id).await.unwrap().unwrap();
    assert_eq!(gpu.state, GpuState::Idle);
    assert!(h.worker.calls().contains(&WorkerCall::Cancel {
        base_url: url(8001),
        modeling_id: modeling.id,
    }));
}

#[tokio::test]
async fn test_cancel_running_modeling_notifies_worker() {
    let h = Harness::new().await;
    let (_, gpus) = h.ctx.seed_device("node-1", 8001, &["GPU-0"]).await;
    let modeling = h.create_modeling(ModelingParamsBuilder::new().build()).await;
    h.scheduler.tick().await.unwrap();
    h.set_step(modeling.id, ModelingStep::Run).await;
    h.worker.clear_calls();

    h.controller.cancel_modeling(modeling.id).await.unwrap();

    assert_eq!(
        h.worker.calls(),
        vec![WorkerCall::Cancel {
            base_url: url(8001),
            modeling_id: modeling.id,
        }]
    );
    let gpu = h.ctx.resources.get_gpu(gpus[0].id).await.unwrap().unwrap();
    assert_eq!(gpu.state, GpuState::Idle);

    // 已取消的建模不会再被调度
    let report = h.scheduler.tick().await.unwrap();
    assert!(report.dispatched.is_empty());
}

#[tokio::test]
async fn test_cancel_idle_does_not_free_gpu_held_elsewhere() {
    let h = Harness::new().await;
    let (_, gpus) = h.ctx.seed_device("node-1", 8001, &["GPU-0"]).await;
    let gpu = gpus[0].id;

    let holder = h.create_modeling(ModelingParamsBuilder::new().build()).await;
    h.scheduler.tick().await.unwrap();
    assert_eq!(h.modeling(holder.id).await.step, ModelingStep::Request);

    let waiting = h
        .create_modeling(ModelingParamsBuilder::new().with_device_ids(vec![gpu]).build())
        .await;
    let cancelled = h.controller.cancel_modeling(waiting.id).await.unwrap();

    assert_eq!(cancelled.step, ModelingStep::Cancel);
    let state = h.ctx.resources.get_gpu(gpu).await.unwrap().unwrap().state;
    assert_eq!(state, GpuState::Modeling);
}

#[tokio::test]
async fn test_cancel_rejected_for_finish_and_terminal_steps() {
    let h = Harness::new().await;
    for step in [
        ModelingStep::Finish,
        ModelingStep::Complete,
        ModelingStep::Cancel,
        ModelingStep::Fail,
    ] {
        let modeling = h.create_modeling(ModelingParamsBuilder::new().build()).await;
        h.set_step(modeling.id, step).await;

        let err = h.controller.cancel_modeling(modeling.id).await.unwrap_err();
        assert!(matches!(err, ModelOpsError::InvalidTransition { .. }), "{step}");
        assert_eq!(h.modeling(modeling.id).await.step, step);
    }
}

#[tokio::test]
async fn test_cancel_unknown_modeling() {
    let h = Harness::new().await;
    let err = h.controller.cancel_modeling(404).await.unwrap_err();
    assert!(matches!(err, ModelOpsError::ModelingNotFound { id: 404 }));
}

#[tokio::test]
async fn test_delete_last_idle_modeling_removes_task() {
    let h = Harness::new().await;
    let modeling = h.create_modeling(ModelingParamsBuilder::new().build()).await;

    h.controller.delete_modeling(modeling.id).await.unwrap();

    assert!(h.ctx.modelings.get_by_id(modeling.id).await.unwrap().is_none());
    assert!(h.ctx.tasks.get_by_id(modeling.task_id).await.unwrap().is_none());
    assert!(h.worker.calls().is_empty());
}

#[tokio::test]
async fn test_delete_keeps_task_with_remaining_modelings() {
    let h = Harness::new().await;
    let parent = h.create_modeling(ModelingParamsBuilder::new().build()).await;
    h.set_step(parent.id, ModelingStep::Complete).await;
    let child = h
        .controller
        .request_evaluation(parent.id, "/data/eval")
        .await
        .unwrap();

    h.controller.delete_modeling(child.id).await.unwrap();

    assert!(h.ctx.tasks.get_by_id(parent.task_id).await.unwrap().is_some());
    assert_eq!(h.ctx.modelings.count_by_task(parent.task_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_in_progress_modeling_rejected() {
    let h = Harness::new().await;
    for step in [ModelingStep::Request, ModelingStep::Run, ModelingStep::Finish] {
        let modeling = h.create_modeling(ModelingParamsBuilder::new().build()).await;
        h.set_step(modeling.id, step).await;

        let err = h.controller.delete_modeling(modeling.id).await.unwrap_err();
        assert_eq!(err.code(), "MODELING_IN_PROGRESS");
        assert!(h.ctx.modelings.get_by_id(modeling.id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_delete_terminal_modeling_removes_artifacts() {
    let h = Harness::new().await;
    let (_, gpus) = h.ctx.seed_device("node-1", 8001, &["GPU-0"]).await;
    let params = ModelingParamsBuilder::new()
        .with_device_ids(vec![gpus[0].id])
        .with_save_path("/models/task-9")
        .build();
    let modeling = h.create_modeling(params).await;
    h.set_step(modeling.id, ModelingStep::Complete).await;

    h.controller.delete_modeling(modeling.id).await.unwrap();

    assert_eq!(
        h.worker.calls(),
        vec![WorkerCall::Remove {
            base_url: url(8001),
            target_path: "/models/task-9".to_string(),
        }]
    );
    assert!(h.ctx.tasks.get_by_id(modeling.task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_terminal_modeling_with_failed_removal() {
    let h = Harness::new().await;
    let (_, gpus) = h.ctx.seed_device("node-1", 8001, &["GPU-0"]).await;
    let modeling = h
        .create_modeling(
            ModelingParamsBuilder::new()
                .with_device_ids(vec![gpus[0].id])
                .build(),
        )
        .await;
    h.set_step(modeling.id, ModelingStep::Fail).await;
    h.worker.fail_on(WorkerOp::Remove);

    h.controller.delete_modeling(modeling.id).await.unwrap();
    assert!(h.ctx.modelings.get_by_id(modeling.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_task_blocked_by_any_in_progress_modeling() {
    let h = Harness::new().await;
    let parent = h.create_modeling(ModelingParamsBuilder::new().build()).await;
    h.set_step(parent.id, ModelingStep::Complete).await;
    let child = h
        .controller
        .request_update(parent.id, "/data/more")
        .await
        .unwrap();
    h.set_step(child.id, ModelingStep::Run).await;

    let err = h.controller.delete_task(parent.task_id).await.unwrap_err();
    assert!(matches!(err, ModelOpsError::ModelingInProgress { id, .. } if id == child.id));
    assert_eq!(h.ctx.modelings.count_by_task(parent.task_id).await.unwrap(), 2);

    h.set_step(child.id, ModelingStep::Fail).await;
    h.controller.delete_task(parent.task_id).await.unwrap();
    assert!(h.ctx.tasks.get_by_id(parent.task_id).await.unwrap().is_none());
    assert_eq!(h.ctx.modelings.count_by_task(parent.task_id).await.unwrap(), 0);

    let err = h.controller.delete_task(parent.task_id).await.unwrap_err();
    assert!(matches!(err, ModelOpsError::TaskNotFound { .. }));
}

#[tokio::test]
async fn test_child_modeling_copies_parent_params() {
    let h = Harness::new().await;
    let parent = h
        .create_modeling(
            ModelingParamsBuilder::new()
                .with_save_path("/models/task-1/")
                .build(),
        )
        .await;
    h.set_step(parent.id, ModelingStep::Complete).await;

    let child = h
        .controller
        .request_evaluation(parent.id, "/data/eval")
        .await
        .unwrap();

    assert_eq!(child.parent_id, parent.id);
    assert_eq!(child.task_id, parent.task_id);
    assert_eq!(child.modeling_type, ModelingType::Evaluation);
    assert_eq!(child.step, ModelingStep::Idle);
    assert_eq!(child.params.data_path, "/data/eval");
    assert!(child.params.save_path.starts_with("/models/task-1/evaluation_"));
    assert_eq!(child.params.engine, parent.params.engine);
}

#[tokio::test]
async fn test_child_requires_complete_parent() {
    let h = Harness::new().await;
    let parent = h.create_modeling(ModelingParamsBuilder::new().build()).await;
    h.set_step(parent.id, ModelingStep::Run).await;

    let err = h
        .controller
        .request_evaluation(parent.id, "/data/eval")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MODELING_INVALID_TRANSITION");
}

#[tokio::test]
async fn test_blind_requires_vision_engine() {
    let h = Harness::new().await;
    let parent = h.create_modeling(ModelingParamsBuilder::tabular().build()).await;
    h.set_step(parent.id, ModelingStep::Complete).await;

    let err = h
        .controller
        .request_blind(parent.id, "/data/blind")
        .await
        .unwrap_err();
    assert!(matches!(err, ModelOpsError::EngineMismatch { .. }));

    h.controller
        .request_evaluation(parent.id, "/data/table/eval.csv")
        .await
        .unwrap();
}
