//! Structured logging utilities
//!
//! Canonical lifecycle events of the control plane, emitted with stable
//! `event` names and dotted field names so log pipelines can index them.

use modelops_core::ModelOpsError;
use tracing::{error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a modeling dispatched to a worker
    pub fn log_modeling_dispatched(
        modeling_id: i64,
        modeling_type: &str,
        device_url: &str,
        gpu_ids: &[i64],
    ) {
        info!(
            event = "modeling_dispatched",
            modeling.id = modeling_id,
            modeling.kind = modeling_type,
            device.url = device_url,
            gpu.ids = ?gpu_ids,
            "Modeling dispatched to worker"
        );
    }

    /// Log a modeling skipped for this tick
    pub fn log_modeling_skipped(modeling_id: i64, phase: &str, error: &ModelOpsError) {
        warn!(
            event = "modeling_skipped",
            modeling.id = modeling_id,
            phase = phase,
            error.code = error.code(),
            error.remote = error.is_remote(),
            error.message = %error,
            "Modeling skipped for this tick"
        );
    }

    pub fn log_finalize_requested(modeling_id: i64, device_url: &str, response: &str) {
        info!(
            event = "finalize_requested",
            modeling.id = modeling_id,
            device.url = device_url,
            response = response,
            "Finalize requested from worker"
        );
    }

    /// Log a cancellation; the local state change happens regardless of the remote result
    pub fn log_modeling_cancelled(modeling_id: i64, gpu_ids: &[i64], remote_acknowledged: bool) {
        info!(
            event = "modeling_cancelled",
            modeling.id = modeling_id,
            gpu.ids = ?gpu_ids,
            remote_acknowledged = remote_acknowledged,
            "Modeling cancelled"
        );
    }

    pub fn log_modeling_deleted(modeling_id: i64, task_id: i64, task_deleted: bool) {
        info!(
            event = "modeling_deleted",
            modeling.id = modeling_id,
            task.id = task_id,
            task_deleted = task_deleted,
            "Modeling deleted"
        );
    }

    /// Log the summary of one dataset sync cycle for a root
    pub fn log_dataset_sync(
        root_id: i64,
        nodes: usize,
        inserted: usize,
        deleted: usize,
        restored: usize,
        duration_ms: u64,
    ) {
        info!(
            event = "dataset_sync",
            root.id = root_id,
            nodes = nodes,
            inserted = inserted,
            deleted = deleted,
            restored = restored,
            duration_ms = duration_ms,
            "Dataset tree synchronized"
        );
    }

    pub fn log_device_probe(device_id: i64, device_url: &str, gpu_count: usize) {
        info!(
            event = "device_probe",
            device.id = device_id,
            device.url = device_url,
            gpu.count = gpu_count,
            "Device probed"
        );
    }

    pub fn log_device_unreachable(device_id: i64, device_url: &str, error: &ModelOpsError) {
        warn!(
            event = "device_unreachable",
            device.id = device_id,
            device.url = device_url,
            error.message = %error,
            "Device health probe failed"
        );
    }

    pub fn log_model_loaded(test_id: i64, gpu_id: i64, model_name: &str, model_num: i64) {
        info!(
            event = "model_loaded",
            test.id = test_id,
            gpu.id = gpu_id,
            model.name = model_name,
            model.num = model_num,
            "Model loaded for inference"
        );
    }

    pub fn log_model_unloaded(test_id: i64, gpu_id: i64, model_name: &str) {
        info!(
            event = "model_unloaded",
            test.id = test_id,
            gpu.id = gpu_id,
            model.name = model_name,
            "Model unloaded"
        );
    }

    /// Log an error that ended a background operation
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
