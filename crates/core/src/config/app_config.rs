use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::{ModelOpsError, ModelOpsResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub dataset_sync: DatasetSyncConfig,
    pub health_probe: HealthProbeConfig,
    pub worker_client: WorkerClientConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSyncConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProbeConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

/// 访问Worker时的超时设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerClientConfig {
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    /// 推理请求（含图片上传）单独的超时
    pub inference_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig {
                enabled: true,
                tick_interval_seconds: 10,
            },
            dataset_sync: DatasetSyncConfig {
                enabled: true,
                interval_seconds: 20,
            },
            health_probe: HealthProbeConfig {
                enabled: true,
                interval_seconds: 30,
            },
            worker_client: WorkerClientConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "pretty".to_string(),
                metrics_enabled: false,
                metrics_bind_address: "0.0.0.0:9100".to_string(),
            },
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://modelops.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl Default for WorkerClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 5,
            request_timeout_seconds: 30,
            inference_timeout_seconds: 120,
        }
    }
}

impl WorkerClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_seconds)
    }
}

impl AppConfig {
    /// 从TOML文件和 `MODELOPS__<SECTION>__<KEY>` 环境变量加载配置
    pub fn load(config_path: Option<&str>) -> ModelOpsResult<Self> {
        let mut builder = Self::with_defaults(ConfigBuilder::builder())?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(ModelOpsError::Configuration(format!(
                    "配置文件不存在: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/modelops.toml", "modelops.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("MODELOPS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ModelOpsError::Configuration(format!("解析配置失败: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> ModelOpsResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = AppConfig::default();
        let map_err = |e: config::ConfigError| ModelOpsError::Configuration(e.to_string());

        builder
            .set_default("database.url", defaults.database.url)
            .and_then(|b| b.set_default("database.max_connections", 10_i64))
            .and_then(|b| b.set_default("database.min_connections", 1_i64))
            .and_then(|b| b.set_default("database.connection_timeout_seconds", 30_i64))
            .and_then(|b| b.set_default("database.idle_timeout_seconds", 600_i64))
            .and_then(|b| b.set_default("scheduler.enabled", true))
            .and_then(|b| b.set_default("scheduler.tick_interval_seconds", 10_i64))
            .and_then(|b| b.set_default("dataset_sync.enabled", true))
            .and_then(|b| b.set_default("dataset_sync.interval_seconds", 20_i64))
            .and_then(|b| b.set_default("health_probe.enabled", true))
            .and_then(|b| b.set_default("health_probe.interval_seconds", 30_i64))
            .and_then(|b| b.set_default("worker_client.connect_timeout_seconds", 5_i64))
            .and_then(|b| b.set_default("worker_client.request_timeout_seconds", 30_i64))
            .and_then(|b| b.set_default("worker_client.inference_timeout_seconds", 120_i64))
            .and_then(|b| b.set_default("observability.log_level", "info"))
            .and_then(|b| b.set_default("observability.log_format", "pretty"))
            .and_then(|b| b.set_default("observability.metrics_enabled", false))
            .and_then(|b| b.set_default("observability.metrics_bind_address", "0.0.0.0:9100"))
            .map_err(map_err)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        self.database.validate()?;
        self.scheduler.validate()?;
        self.dataset_sync.validate()?;
        self.health_probe.validate()?;
        self.worker_client.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;
        if !self.url.starts_with("sqlite:") {
            return Err(ModelOpsError::Configuration(
                "database.url must start with sqlite:".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ModelOpsError::Configuration(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ModelOpsError::Configuration(
                "database.min_connections must be less than or equal to max_connections"
                    .to_string(),
            ));
        }
        ValidationUtils::validate_timeout_seconds(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.idle_timeout_seconds,
            "database.idle_timeout_seconds",
        )
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        ValidationUtils::validate_interval_seconds(
            self.tick_interval_seconds,
            "scheduler.tick_interval_seconds",
        )
    }
}

impl ConfigValidator for DatasetSyncConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        ValidationUtils::validate_interval_seconds(
            self.interval_seconds,
            "dataset_sync.interval_seconds",
        )
    }
}

impl ConfigValidator for HealthProbeConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        ValidationUtils::validate_interval_seconds(
            self.interval_seconds,
            "health_probe.interval_seconds",
        )
    }
}

impl ConfigValidator for WorkerClientConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.connect_timeout_seconds,
            "worker_client.connect_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.request_timeout_seconds,
            "worker_client.request_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.inference_timeout_seconds,
            "worker_client.inference_timeout_seconds",
        )
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ModelOpsResult<()> {
        ValidationUtils::validate_one_of(
            &self.log_level,
            &["trace", "debug", "info", "warn", "error"],
            "observability.log_level",
        )?;
        ValidationUtils::validate_one_of(
            &self.log_format,
            &["json", "pretty"],
            "observability.log_format",
        )?;
        if self.metrics_enabled {
            ValidationUtils::validate_not_empty(
                &self.metrics_bind_address,
                "observability.metrics_bind_address",
            )?;
        }
        Ok(())
    }
}
