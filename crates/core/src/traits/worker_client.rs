use async_trait::async_trait;

use crate::models::{
    DispatchEndpoint, LoadModelRequest, LoadModelResponse, SystemInfo, TabularInferenceRequest,
    UnloadModelRequest, VisionInferenceRequest,
};
use crate::ModelOpsResult;

/// 远程Worker的HTTP接口
///
/// 所有方法的 `base_url` 形如 `http://10.0.0.7:8000`，由设备信息拼出。
/// 非2xx响应以 [`crate::ModelOpsError::WorkerStatus`] 返回。
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// `POST {worker}/api/train|/api/evaluation|/api/vision/blind`
    async fn dispatch(
        &self,
        base_url: &str,
        endpoint: DispatchEndpoint,
        modeling_id: i64,
    ) -> ModelOpsResult<String>;

    /// `POST {worker}/api/train/finish`
    async fn finish(&self, base_url: &str, modeling_id: i64) -> ModelOpsResult<String>;

    /// `DELETE {worker}/api/train/{modeling_id}`
    async fn cancel(&self, base_url: &str, modeling_id: i64) -> ModelOpsResult<()>;

    /// `POST {worker}/api/remove`
    async fn remove_artifacts(&self, base_url: &str, target_path: &str) -> ModelOpsResult<()>;

    /// `POST {worker}/api/load`
    async fn load_model(
        &self,
        base_url: &str,
        request: &LoadModelRequest,
    ) -> ModelOpsResult<LoadModelResponse>;

    /// `DELETE {worker}/api/model`，返回纯文本响应体
    async fn unload_model(
        &self,
        base_url: &str,
        request: &UnloadModelRequest,
    ) -> ModelOpsResult<String>;

    /// `POST {worker}/api/vcls`
    async fn infer_vision(
        &self,
        base_url: &str,
        request: &VisionInferenceRequest,
    ) -> ModelOpsResult<serde_json::Value>;

    /// `POST {worker}/api/tabular`
    async fn infer_tabular(
        &self,
        base_url: &str,
        request: &TabularInferenceRequest,
    ) -> ModelOpsResult<serde_json::Value>;

    /// `GET {device}/api/sys`
    async fn probe_system(&self, base_url: &str) -> ModelOpsResult<SystemInfo>;
}
