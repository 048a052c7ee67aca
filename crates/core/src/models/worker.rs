//! 与远程Worker（训练引擎节点）交互的请求/响应格式

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ReportedGpu;

/// 训练/评估/盲测/完成通知的请求体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelingRequest {
    pub modeling_id: i64,
}

/// 删除产物请求体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveRequest {
    pub target_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadModelRequest {
    /// Worker本地的GPU序号
    pub device_id: i32,
    pub model_name: String,
    pub model_path: String,
    pub model_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadModelResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub models: Vec<WorkerModel>,
}

impl LoadModelResponse {
    /// 本次加载得到的模型编号，Worker把最新的实例放在列表末尾
    pub fn latest_model_num(&self) -> Option<i64> {
        self.models.last().map(|m| m.model_num)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerModel {
    pub model_num: i64,
    #[serde(default)]
    pub model_file: String,
    #[serde(default)]
    pub engine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnloadModelRequest {
    pub device_id: i32,
    pub model_name: String,
    pub model_num: i64,
}

/// 图像推理请求，以multipart发送
#[derive(Debug, Clone)]
pub struct VisionInferenceRequest {
    pub file_name: String,
    pub file: Vec<u8>,
    pub model_name: String,
    pub model_num: i64,
    pub heatmap: bool,
}

/// 表格推理请求，`x_input` 以JSON字符串放入multipart
#[derive(Debug, Clone)]
pub struct TabularInferenceRequest {
    pub model_name: String,
    pub model_num: i64,
    pub x_input: serde_json::Value,
}

/// `GET /api/sys` 的健康探测结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    #[serde(default)]
    pub cpu: serde_json::Value,
    #[serde(default)]
    pub disk: serde_json::Value,
    #[serde(default)]
    pub gpus: Vec<ReportedGpu>,
}

/// 最优模型字典：metric -> rank -> [模型文件路径, ..., 模型类型标签]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BestModels(pub BTreeMap<String, BTreeMap<String, Vec<String>>>);

/// 在最优模型字典中解析出的模型文件
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFile {
    pub metric: String,
    pub rank: String,
    pub path: String,
    pub model_type: String,
}

impl BestModels {
    /// 查找路径中包含 `model_name` 的第一个条目
    ///
    /// 指标按名称排序，同一指标内按名次的数值排序，非数字名次排在最后。
    pub fn find(&self, model_name: &str) -> Option<ModelFile> {
        for (metric, ranks) in &self.0 {
            for (rank, entry) in Self::by_rank(ranks) {
                if entry.len() < 2 {
                    continue;
                }
                let path = &entry[0];
                if path.contains(model_name) {
                    return Some(ModelFile {
                        metric: metric.clone(),
                        rank: rank.clone(),
                        path: path.clone(),
                        model_type: entry[entry.len() - 1].clone(),
                    });
                }
            }
        }
        None
    }

    fn by_rank(ranks: &BTreeMap<String, Vec<String>>) -> Vec<(&String, &Vec<String>)> {
        let mut ordered: Vec<_> = ranks.iter().collect();
        ordered.sort_by_key(|(rank, _)| (rank.parse::<u64>().map_or((1, 0), |n| (0, n)), *rank));
        ordered
    }

    /// 所有条目中出现的模型文件路径（去重、有序）
    pub fn model_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .0
            .values()
            .flat_map(|ranks| ranks.values())
            .filter(|entry| entry.len() >= 2)
            .map(|entry| entry[0].clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
