//! Observability module
//!
//! - Metrics collection and the Prometheus exporter
//! - Structured lifecycle logging

pub mod metrics_collector;
pub mod structured_logger;

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use modelops_core::{ModelOpsError, ModelOpsResult};
use tracing::info;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;

/// 在指定地址上安装Prometheus导出器，需在tokio运行时内调用
pub fn init_metrics(bind_address: &str) -> ModelOpsResult<()> {
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        ModelOpsError::Configuration(format!("无效的指标监听地址 {bind_address}: {e}"))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ModelOpsError::Internal(format!("安装Prometheus导出器失败: {e}")))?;

    info!("Prometheus指标导出器监听于 {}", addr);
    Ok(())
}
