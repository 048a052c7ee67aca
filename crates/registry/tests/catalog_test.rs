mod common;

use common::{resnet_best_models, Harness};
use modelops_core::models::{ModelingStep, ModelingType};
use modelops_core::traits::{ModelingDetailRepository, ModelingRepository, TaskRepository};
use modelops_core::ModelOpsError;
use modelops_infrastructure::BEST_MODELS_DETAIL;
use modelops_testing_utils::NewTaskBuilder;
use serde_json::json;

#[tokio::test]
async fn test_list_best_models_per_task_in_request_order() {
    let h = Harness::new().await;
    let first = h.trained_modeling(resnet_best_models()).await;
    let second = h
        .trained_modeling(json!({
            "rmse": {"1": ["/models/t2/lgbm_1.pkl", "0.12", "tabular"]}
        }))
        .await;
    h.ctx
        .modelings
        .update_step(second.id, ModelingStep::Complete)
        .await
        .unwrap();

    let listed = h
        .catalog
        .list_best_models(&[second.task_id, first.task_id])
        .await
        .unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].task_id, second.task_id);
    assert_eq!(listed[0].modelings[0].step, ModelingStep::Complete);
    assert_eq!(
        listed[0].modelings[0].model_paths,
        vec!["/models/t2/lgbm_1.pkl".to_string()]
    );
    assert_eq!(listed[1].task_id, first.task_id);
    assert_eq!(listed[1].modelings[0].modeling_type, ModelingType::Initial);
    assert_eq!(
        listed[1].modelings[0].model_paths,
        vec![
            "/models/t1/resnet_1.pt".to_string(),
            "/models/t1/resnet_2.pt".to_string()
        ]
    );
}

#[tokio::test]
async fn test_modelings_without_best_models_are_skipped() {
    let h = Harness::new().await;
    let (task, _) = h
        .ctx
        .tasks
        .create_with_modeling(&NewTaskBuilder::new().build(), ModelingType::Initial)
        .await
        .unwrap();

    let listed = h.catalog.list_best_models(&[task.id]).await.unwrap();
    assert_eq!(listed[0].task_id, task.id);
    assert!(listed[0].modelings.is_empty());
}

#[tokio::test]
async fn test_first_error_aborts_whole_listing() {
    let h = Harness::new().await;
    let good = h.trained_modeling(resnet_best_models()).await;
    let broken = h.trained_modeling(resnet_best_models()).await;
    h.ctx
        .details
        .save_detail(broken.id, BEST_MODELS_DETAIL, &json!(["not", "a", "dictionary"]))
        .await
        .unwrap();

    let err = h
        .catalog
        .list_best_models(&[good.task_id, broken.task_id])
        .await
        .unwrap_err();
    assert!(matches!(err, ModelOpsError::Serialization(_)));

    let err = h
        .catalog
        .list_best_models(&[good.task_id, 9999])
        .await
        .unwrap_err();
    assert!(matches!(err, ModelOpsError::TaskNotFound { id: 9999 }));

    assert_eq!(h.catalog.list_best_models(&[]).await.unwrap(), Vec::new());
}
