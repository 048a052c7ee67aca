use async_trait::async_trait;
use modelops_core::{
    config::WorkerClientConfig,
    models::{
        DispatchEndpoint, LoadModelRequest, LoadModelResponse, ModelingRequest, RemoveRequest,
        SystemInfo, TabularInferenceRequest, UnloadModelRequest, VisionInferenceRequest,
    },
    traits::WorkerClient,
    ModelOpsError, ModelOpsResult,
};
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

/// 推理请求中固定的 `device_id`，设备由选用的Worker地址决定
const INFERENCE_DEVICE_ID: &str = "0";

/// 基于reqwest的Worker HTTP客户端
///
/// 普通请求与推理请求使用两个独立的连接池，推理请求的超时更长。
pub struct HttpWorkerClient {
    http_client: reqwest::Client,
    inference_client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(config: &WorkerClientConfig) -> ModelOpsResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ModelOpsError::Configuration(format!("创建HTTP客户端失败: {e}")))?;
        let inference_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.inference_timeout())
            .build()
            .map_err(|e| ModelOpsError::Configuration(format!("创建推理HTTP客户端失败: {e}")))?;

        Ok(Self {
            http_client,
            inference_client,
        })
    }

    async fn check_status(
        url: &str,
        response: reqwest::Response,
    ) -> ModelOpsResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Worker返回错误: {} HTTP {} - {}", url, status, body);
        Err(ModelOpsError::WorkerStatus {
            endpoint: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn send(url: &str, request: reqwest::RequestBuilder) -> ModelOpsResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ModelOpsError::worker_request(url, e))?;
        Self::check_status(url, response).await
    }

    async fn read_text(url: &str, response: reqwest::Response) -> ModelOpsResult<String> {
        response
            .text()
            .await
            .map_err(|e| ModelOpsError::worker_request(url, e))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> ModelOpsResult<T> {
        response.json::<T>().await.map_err(|e| {
            ModelOpsError::Serialization(format!("解析Worker响应失败 {url}: {e}"))
        })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn dispatch(
        &self,
        base_url: &str,
        endpoint: DispatchEndpoint,
        modeling_id: i64,
    ) -> ModelOpsResult<String> {
        let url = format!("{base_url}{}", endpoint.path());
        let response = Self::send(
            &url,
            self.http_client
                .post(&url)
                .json(&ModelingRequest { modeling_id }),
        )
        .await?;
        let body = Self::read_text(&url, response).await?;
        debug!("下发建模 {} 到 {} 成功: {}", modeling_id, url, body);
        Ok(body)
    }

    async fn finish(&self, base_url: &str, modeling_id: i64) -> ModelOpsResult<String> {
        let url = format!("{base_url}/api/train/finish");
        let response = Self::send(
            &url,
            self.http_client
                .post(&url)
                .json(&ModelingRequest { modeling_id }),
        )
        .await?;
        Self::read_text(&url, response).await
    }

    async fn cancel(&self, base_url: &str, modeling_id: i64) -> ModelOpsResult<()> {
        let url = format!("{base_url}/api/train/{modeling_id}");
        Self::send(&url, self.http_client.delete(&url)).await?;
        debug!("已通知Worker取消建模 {}", modeling_id);
        Ok(())
    }

    async fn remove_artifacts(&self, base_url: &str, target_path: &str) -> ModelOpsResult<()> {
        let url = format!("{base_url}/api/remove");
        Self::send(
            &url,
            self.http_client.post(&url).json(&RemoveRequest {
                target_path: target_path.to_string(),
            }),
        )
        .await?;
        debug!("已通知Worker删除产物: {}", target_path);
        Ok(())
    }

    async fn load_model(
        &self,
        base_url: &str,
        request: &LoadModelRequest,
    ) -> ModelOpsResult<LoadModelResponse> {
        let url = format!("{base_url}/api/load");
        let response = Self::send(&url, self.inference_client.post(&url).json(request)).await?;
        Self::read_json(&url, response).await
    }

    async fn unload_model(
        &self,
        base_url: &str,
        request: &UnloadModelRequest,
    ) -> ModelOpsResult<String> {
        let url = format!("{base_url}/api/model");
        let response = Self::send(&url, self.http_client.delete(&url).json(request)).await?;
        Self::read_text(&url, response).await
    }

    async fn infer_vision(
        &self,
        base_url: &str,
        request: &VisionInferenceRequest,
    ) -> ModelOpsResult<serde_json::Value> {
        let url = format!("{base_url}/api/vcls");
        let file = Part::bytes(request.file.clone()).file_name(request.file_name.clone());
        let form = Form::new()
            .part("file", file)
            .text("device_id", INFERENCE_DEVICE_ID)
            .text("model_name", request.model_name.clone())
            .text("model_num", request.model_num.to_string())
            .text("heatmap", request.heatmap.to_string());

        let response = Self::send(&url, self.inference_client.post(&url).multipart(form)).await?;
        Self::read_json(&url, response).await
    }

    async fn infer_tabular(
        &self,
        base_url: &str,
        request: &TabularInferenceRequest,
    ) -> ModelOpsResult<serde_json::Value> {
        let url = format!("{base_url}/api/tabular");
        let form = Form::new()
            .text("device_id", INFERENCE_DEVICE_ID)
            .text("model_name", request.model_name.clone())
            .text("model_num", request.model_num.to_string())
            .text("x_input", request.x_input.to_string());

        let response = Self::send(&url, self.inference_client.post(&url).multipart(form)).await?;
        Self::read_json(&url, response).await
    }

    async fn probe_system(&self, base_url: &str) -> ModelOpsResult<SystemInfo> {
        let url = format!("{base_url}/api/sys");
        let response = Self::send(&url, self.http_client.get(&url)).await?;
        Self::read_json(&url, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client() -> HttpWorkerClient {
        HttpWorkerClient::new(&WorkerClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_posts_modeling_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/evaluation")
            .match_body(Matcher::Json(json!({"modeling_id": 42})))
            .with_status(200)
            .with_body("accepted")
            .create_async()
            .await;

        let body = client()
            .dispatch(&server.url(), DispatchEndpoint::Evaluation, 42)
            .await
            .unwrap();

        assert_eq!(body, "accepted");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/train/finish")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;

        let err = client().finish(&server.url(), 7).await.unwrap_err();
        match err {
            ModelOpsError::WorkerStatus { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_a_request_error() {
        // 端口1上没有服务
        let err = client()
            .cancel("http://127.0.0.1:1", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelOpsError::WorkerRequest { .. }));
        assert!(err.is_remote());
    }

    #[tokio::test]
    async fn test_cancel_and_remove_paths() {
        let mut server = mockito::Server::new_async().await;
        let cancel = server
            .mock("DELETE", "/api/train/9")
            .with_status(200)
            .create_async()
            .await;
        let remove = server
            .mock("POST", "/api/remove")
            .match_body(Matcher::Json(json!({"target_path": "/models/t1"})))
            .with_status(200)
            .create_async()
            .await;

        let client = client();
        client.cancel(&server.url(), 9).await.unwrap();
        client.remove_artifacts(&server.url(), "/models/t1").await.unwrap();

        cancel.assert_async().await;
        remove.assert_async().await;
    }

    #[tokio::test]
    async fn test_load_and_unload_model() {
        let mut server = mockito::Server::new_async().await;
        let _load = server
            .mock("POST", "/api/load")
            .match_body(Matcher::Json(json!({
                "device_id": 1,
                "model_name": "resnet_1",
                "model_path": "/models/t1/resnet_1.pt",
                "model_type": "vision"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"resnet_1","models":[{"model_num":3,"model_file":"resnet_1.pt","engine":"vcls-sl"}]}"#)
            .create_async()
            .await;
        let _unload = server
            .mock("DELETE", "/api/model")
            .match_body(Matcher::Json(json!({
                "device_id": 1,
                "model_name": "resnet_1",
                "model_num": 3
            })))
            .with_status(200)
            .with_body("Successfully unloaded")
            .create_async()
            .await;

        let client = client();
        let loaded = client
            .load_model(
                &server.url(),
                &LoadModelRequest {
                    device_id: 1,
                    model_name: "resnet_1".to_string(),
                    model_path: "/models/t1/resnet_1.pt".to_string(),
                    model_type: "vision".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(loaded.latest_model_num(), Some(3));

        let text = client
            .unload_model(
                &server.url(),
                &UnloadModelRequest {
                    device_id: 1,
                    model_name: "resnet_1".to_string(),
                    model_num: 3,
                },
            )
            .await
            .unwrap();
        assert!(text.contains("Successfully"));
    }

    #[tokio::test]
    async fn test_vision_inference_is_multipart_with_zero_device_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/vcls")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="device_id"\r\n\r\n0\r\n"#.to_string()),
                Matcher::Regex(r#"name="model_name"\r\n\r\nresnet_1\r\n"#.to_string()),
                Matcher::Regex(r#"filename="cat.png""#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"label":["cat"],"prob":[0.9]}"#)
            .create_async()
            .await;

        let result = client()
            .infer_vision(
                &server.url(),
                &VisionInferenceRequest {
                    file_name: "cat.png".to_string(),
                    file: vec![1, 2, 3],
                    model_name: "resnet_1".to_string(),
                    model_num: 0,
                    heatmap: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(result["label"][0], "cat");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_probe_system_parses_gpus() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/sys")
            .with_status(200)
            .with_body(r#"{"cpu":{"usage":12.5},"disk":{},"gpus":[{"uuid":"GPU-a","index":0,"name":"A100"}]}"#)
            .create_async()
            .await;

        let info = client().probe_system(&server.url()).await.unwrap();
        assert_eq!(info.gpus.len(), 1);
        assert_eq!(info.gpus[0].uuid, "GPU-a");
    }
}
