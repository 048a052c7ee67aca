use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::sqlite_text_enum;

/// 训练引擎类型，同时作为数据集的引擎兼容标签
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EngineType {
    /// 单标签图像分类
    #[serde(rename = "vcls-sl")]
    VisionClassification,
    #[serde(rename = "tabular-cls")]
    TabularClassification,
    #[serde(rename = "tabular-reg")]
    TabularRegression,
}

impl EngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::VisionClassification => "vcls-sl",
            EngineType::TabularClassification => "tabular-cls",
            EngineType::TabularRegression => "tabular-reg",
        }
    }

    pub fn is_vision(&self) -> bool {
        matches!(self, EngineType::VisionClassification)
    }
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vcls-sl" => Ok(EngineType::VisionClassification),
            "tabular-cls" => Ok(EngineType::TabularClassification),
            "tabular-reg" => Ok(EngineType::TabularRegression),
            _ => Err(format!("Invalid engine type: {s}")),
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

sqlite_text_enum!(EngineType);

/// 建模参数文档
///
/// 由Task创建时给出，复制到每个Modeling，调度时写回选中的GPU。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelingParams {
    pub data_path: String,
    pub save_path: String,
    /// 分配给该建模的GPU id列表
    #[serde(default)]
    pub device_ids: Vec<i64>,
    #[serde(default)]
    pub gpu_auto: bool,
    pub engine: EngineParams,
}

impl ModelingParams {
    pub fn engine_type(&self) -> EngineType {
        self.engine.engine_type()
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 是否需要调度器自动挑选GPU
    pub fn needs_auto_assignment(&self) -> bool {
        self.gpu_auto && self.device_ids.is_empty()
    }
}

/// 各引擎特有的参数，按 `engine_type` 区分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "engine_type")]
pub enum EngineParams {
    #[serde(rename = "vcls-sl")]
    VisionClassification {
        #[serde(default = "default_epochs")]
        epochs: u32,
        #[serde(default = "default_batch_size")]
        batch_size: u32,
        #[serde(default = "default_image_size")]
        image_size: u32,
        #[serde(default)]
        pretrained: bool,
    },
    #[serde(rename = "tabular-cls")]
    TabularClassification {
        target_column: String,
        #[serde(default)]
        feature_columns: Vec<String>,
        #[serde(default = "default_trials")]
        trials: u32,
    },
    #[serde(rename = "tabular-reg")]
    TabularRegression {
        target_column: String,
        #[serde(default)]
        feature_columns: Vec<String>,
        #[serde(default = "default_trials")]
        trials: u32,
    },
}

impl EngineParams {
    pub fn engine_type(&self) -> EngineType {
        match self {
            EngineParams::VisionClassification { .. } => EngineType::VisionClassification,
            EngineParams::TabularClassification { .. } => EngineType::TabularClassification,
            EngineParams::TabularRegression { .. } => EngineType::TabularRegression,
        }
    }
}

fn default_epochs() -> u32 {
    30
}

fn default_batch_size() -> u32 {
    32
}

fn default_image_size() -> u32 {
    224
}

fn default_trials() -> u32 {
    20
}
