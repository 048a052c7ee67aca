use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sqlite_text_enum;

/// Worker节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub port: i32,
    pub is_use: bool,
    pub transport: TransportType,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Worker HTTP服务的基础地址
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.transport.scheme(), self.ip, self.port)
    }
}

/// 注册设备请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub name: String,
    pub ip: String,
    pub port: i32,
    pub transport: TransportType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Http,
    Https,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Http => "http",
            TransportType::Https => "https",
        }
    }

    pub fn scheme(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(TransportType::Http),
            "https" => Ok(TransportType::Https),
            _ => Err(format!("Invalid transport type: {s}")),
        }
    }
}

sqlite_text_enum!(TransportType);

/// 设备上的一块GPU
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gpu {
    pub id: i64,
    pub device_id: i64,
    /// 全局唯一，刷新时作为upsert键
    pub uuid: String,
    /// Worker本地的GPU序号
    pub gpu_index: i32,
    pub name: String,
    pub is_use: bool,
    pub state: GpuState,
    pub updated_at: DateTime<Utc>,
}

impl Gpu {
    pub fn is_available(&self) -> bool {
        self.is_use && self.state == GpuState::Idle
    }
}

/// GPU分配状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GpuState {
    Idle,
    Modeling,
    Inference,
    Complete,
}

impl GpuState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuState::Idle => "idle",
            GpuState::Modeling => "modeling",
            GpuState::Inference => "inference",
            GpuState::Complete => "complete",
        }
    }
}

impl FromStr for GpuState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(GpuState::Idle),
            "modeling" => Ok(GpuState::Modeling),
            "inference" => Ok(GpuState::Inference),
            "complete" => Ok(GpuState::Complete),
            _ => Err(format!("Invalid gpu state: {s}")),
        }
    }
}

impl fmt::Display for GpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

sqlite_text_enum!(GpuState);

/// 健康探测时Worker上报的GPU
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportedGpu {
    pub uuid: String,
    #[serde(alias = "gpu_index")]
    pub index: i32,
    #[serde(default)]
    pub name: String,
}

/// 设备及其GPU的快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceWithGpus {
    pub device: Device,
    pub gpus: Vec<Gpu>,
}

impl DeviceWithGpus {
    pub fn owns_gpu_uuid(&self, uuid: &str) -> bool {
        self.gpus.iter().any(|gpu| gpu.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_state_rejects_unknown_values() {
        assert_eq!("idle".parse::<GpuState>().unwrap(), GpuState::Idle);
        assert_eq!("inference".parse::<GpuState>().unwrap(), GpuState::Inference);
        assert!("busy".parse::<GpuState>().is_err());
        assert!("IDLE".parse::<GpuState>().is_err());
    }

    #[test]
    fn test_device_base_url() {
        let device = Device {
            id: 1,
            name: "gpu-node-1".to_string(),
            ip: "10.0.0.7".to_string(),
            port: 8000,
            is_use: true,
            transport: TransportType::Http,
            created_at: Utc::now(),
        };
        assert_eq!(device.base_url(), "http://10.0.0.7:8000");
    }

    #[test]
    fn test_reported_gpu_accepts_index_alias() {
        let gpu: ReportedGpu =
            serde_json::from_str(r#"{"uuid":"GPU-1","gpu_index":2,"name":"A100"}"#).unwrap();
        assert_eq!(gpu.index, 2);
        assert_eq!(gpu.name, "A100");
    }
}
