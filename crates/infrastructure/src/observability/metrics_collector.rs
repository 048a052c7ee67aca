//! 控制平面的指标采集
//!
//! 通过 `metrics` 门面记录，未安装导出器时所有记录都是空操作。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

pub struct MetricsCollector {
    // 调度指标
    modelings_dispatched_total: Counter,
    dispatch_failures_total: Counter,
    finalize_requests_total: Counter,
    cancellations_total: Counter,
    scheduler_tick_duration: Histogram,

    // 数据集同步指标
    dataset_sync_duration: Histogram,
    dataset_nodes_inserted_total: Counter,
    dataset_nodes_deleted_total: Counter,

    // 资源指标
    responding_devices: Gauge,
    loaded_models: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            modelings_dispatched_total: counter!("modelops_modelings_dispatched_total"),
            dispatch_failures_total: counter!("modelops_dispatch_failures_total"),
            finalize_requests_total: counter!("modelops_finalize_requests_total"),
            cancellations_total: counter!("modelops_cancellations_total"),
            scheduler_tick_duration: histogram!("modelops_scheduler_tick_duration_seconds"),
            dataset_sync_duration: histogram!("modelops_dataset_sync_duration_seconds"),
            dataset_nodes_inserted_total: counter!("modelops_dataset_nodes_inserted_total"),
            dataset_nodes_deleted_total: counter!("modelops_dataset_nodes_deleted_total"),
            responding_devices: gauge!("modelops_responding_devices"),
            loaded_models: gauge!("modelops_loaded_models"),
        }
    }

    pub fn record_dispatch(&self, modeling_type: &str) {
        self.modelings_dispatched_total.increment(1);
        counter!("modelops_modelings_dispatched_by_type_total", "modeling_type" => modeling_type.to_string())
            .increment(1);
    }

    pub fn record_dispatch_failure(&self, reason: &str) {
        self.dispatch_failures_total.increment(1);
        debug!(reason = reason, "Dispatch failure recorded");
    }

    pub fn record_finalize_request(&self) {
        self.finalize_requests_total.increment(1);
    }

    pub fn record_cancellation(&self) {
        self.cancellations_total.increment(1);
    }

    pub fn record_scheduler_tick(&self, duration_seconds: f64) {
        self.scheduler_tick_duration.record(duration_seconds);
    }

    /// 记录一轮数据集同步
    pub fn record_dataset_sync(&self, duration_seconds: f64, inserted: u64, deleted: u64) {
        self.dataset_sync_duration.record(duration_seconds);
        self.dataset_nodes_inserted_total.increment(inserted);
        self.dataset_nodes_deleted_total.increment(deleted);
    }

    pub fn update_responding_devices(&self, count: usize) {
        self.responding_devices.set(count as f64);
    }

    pub fn update_loaded_models(&self, count: usize) {
        self.loaded_models.set(count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
