//! 推理请求路由和结果整理

use base64::{engine::general_purpose::STANDARD, Engine as _};
use modelops_core::{
    models::{EngineType, TabularInferenceRequest, VisionInferenceRequest},
    ModelOpsError, ModelOpsResult,
};
use serde_json::Value;
use tracing::debug;

use crate::registry::ModelRegistry;

const HEATMAP_PREFIX: &str = "data:image/png;base64,";

impl ModelRegistry {
    /// 用已加载的图像分类模型推理一张图片
    pub async fn infer_vision(
        &self,
        test_id: i64,
        file_name: &str,
        file: Vec<u8>,
        heatmap: bool,
    ) -> ModelOpsResult<Value> {
        let entry = self.get(test_id).await?;
        if !entry.engine_type.is_vision() {
            return Err(ModelOpsError::EngineMismatch {
                expected: EngineType::VisionClassification.to_string(),
                actual: entry.engine_type.to_string(),
            });
        }

        let request = VisionInferenceRequest {
            file_name: file_name.to_string(),
            file,
            model_name: entry.model_name.clone(),
            model_num: entry.model_num,
            heatmap,
        };
        let raw = self.worker.infer_vision(&entry.base_url, &request).await?;
        debug!(test.id = test_id, gpu.id = entry.gpu_id, "图像推理完成");
        Ok(normalize_vision_result(raw))
    }

    /// 用已加载的表格模型推理一组特征
    pub async fn infer_tabular(&self, test_id: i64, x_input: Value) -> ModelOpsResult<Value> {
        let entry = self.get(test_id).await?;
        if entry.engine_type.is_vision() {
            return Err(ModelOpsError::EngineMismatch {
                expected: "tabular".to_string(),
                actual: entry.engine_type.to_string(),
            });
        }

        let request = TabularInferenceRequest {
            model_name: entry.model_name.clone(),
            model_num: entry.model_num,
            x_input,
        };
        let result = self.worker.infer_tabular(&entry.base_url, &request).await?;
        debug!(test.id = test_id, gpu.id = entry.gpu_id, "表格推理完成");
        Ok(result)
    }
}

/// 整理Worker返回的图像推理结果
///
/// - `label`/`prob` 为单个值时包装成数组，字符串形式的概率转为数字
/// - `heatmap` 为字节数组时先做base64编码；缺少 `data:image` 前缀时补上
pub fn normalize_vision_result(mut result: Value) -> Value {
    let Some(object) = result.as_object_mut() else {
        return result;
    };

    if let Some(label) = object.get_mut("label") {
        wrap_scalar(label);
    }
    if let Some(prob) = object.get_mut("prob") {
        wrap_scalar(prob);
        if let Value::Array(items) = prob {
            for item in items.iter_mut() {
                if let Some(parsed) = item.as_str().and_then(|s| s.trim().parse::<f64>().ok()) {
                    *item = Value::from(parsed);
                }
            }
        }
    }
    if let Some(heatmap) = object.get_mut("heatmap") {
        if let Some(encoded) = heatmap_data_url(heatmap) {
            *heatmap = Value::String(encoded);
        }
    }
    result
}

fn wrap_scalar(value: &mut Value) {
    if !value.is_array() && !value.is_null() {
        *value = Value::Array(vec![value.take()]);
    }
}

fn heatmap_data_url(heatmap: &Value) -> Option<String> {
    match heatmap {
        Value::String(s) if s.starts_with("data:image") => None,
        Value::String(s) if !s.is_empty() => Some(format!("{HEATMAP_PREFIX}{s}")),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect();
            bytes.map(|b| format!("{HEATMAP_PREFIX}{}", STANDARD.encode(b)))
        }
        _ => None,
    }
}
