//! Mock implementations of the worker client and dataset collaborators
//!
//! Every call is recorded so tests can assert on what was sent to which
//! worker, and any operation can be made to fail on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modelops_core::{
    models::{
        DispatchEndpoint, LoadModelRequest, LoadModelResponse, SystemInfo,
        TabularInferenceRequest, UnloadModelRequest, VisionInferenceRequest, WorkerModel,
    },
    traits::{DatasetAnalyzer, DatasetValidator, WorkerClient},
    ModelOpsError, ModelOpsResult,
};
use serde_json::json;
use tokio::sync::{watch, Semaphore};

/// Worker operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerOp {
    Dispatch,
    Finish,
    Cancel,
    Remove,
    Load,
    Unload,
    InferVision,
    InferTabular,
    Probe,
}

/// A recorded call to the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCall {
    Dispatch {
        base_url: String,
        endpoint: DispatchEndpoint,
        modeling_id: i64,
    },
    Finish {
        base_url: String,
        modeling_id: i64,
    },
    Cancel {
        base_url: String,
        modeling_id: i64,
    },
    Remove {
        base_url: String,
        target_path: String,
    },
    Load {
        base_url: String,
        request: LoadModelRequest,
    },
    Unload {
        base_url: String,
        request: UnloadModelRequest,
    },
    InferVision {
        base_url: String,
        model_name: String,
        model_num: i64,
        heatmap: bool,
    },
    InferTabular {
        base_url: String,
        model_name: String,
        model_num: i64,
    },
    Probe {
        base_url: String,
    },
}

impl WorkerCall {
    pub fn modeling_id(&self) -> Option<i64> {
        match self {
            WorkerCall::Dispatch { modeling_id, .. }
            | WorkerCall::Finish { modeling_id, .. }
            | WorkerCall::Cancel { modeling_id, .. } => Some(*modeling_id),
            _ => None,
        }
    }
}

/// Holds calls of one worker operation open until [`WorkerGate::open`]
///
/// Dropping the gate releases every waiting call.
pub struct WorkerGate {
    open_tx: watch::Sender<bool>,
    entered: Arc<Semaphore>,
}

impl WorkerGate {
    /// Wait until one more call has reached the gate
    pub async fn entered(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    pub fn open(&self) {
        let _ = self.open_tx.send(true);
    }
}

type GateState = (watch::Receiver<bool>, Arc<Semaphore>);

/// Recording mock of [`WorkerClient`]
#[derive(Clone)]
pub struct MockWorkerClient {
    calls: Arc<Mutex<Vec<WorkerCall>>>,
    failing: Arc<Mutex<HashSet<WorkerOp>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    system_info: Arc<Mutex<HashMap<String, SystemInfo>>>,
    unload_body: Arc<Mutex<String>>,
    vision_response: Arc<Mutex<serde_json::Value>>,
    next_model_num: Arc<AtomicI64>,
    gates: Arc<Mutex<HashMap<WorkerOp, GateState>>>,
}

impl MockWorkerClient {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            unreachable: Arc::new(Mutex::new(HashSet::new())),
            system_info: Arc::new(Mutex::new(HashMap::new())),
            unload_body: Arc::new(Mutex::new("Successfully unloaded model".to_string())),
            vision_response: Arc::new(Mutex::new(json!({"label": ["cat"], "prob": [0.9]}))),
            next_model_num: Arc::new(AtomicI64::new(0)),
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make every call of `op` fail with a request error
    pub fn fail_on(&self, op: WorkerOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: WorkerOp) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// Make every call to `base_url` fail as if the worker were down
    pub fn set_unreachable(&self, base_url: &str) {
        self.unreachable.lock().unwrap().insert(base_url.to_string());
    }

    pub fn set_system_info(&self, base_url: &str, info: SystemInfo) {
        self.system_info
            .lock()
            .unwrap()
            .insert(base_url.to_string(), info);
    }

    pub fn set_unload_body(&self, body: &str) {
        *self.unload_body.lock().unwrap() = body.to_string();
    }

    pub fn set_vision_response(&self, response: serde_json::Value) {
        *self.vision_response.lock().unwrap() = response;
    }

    /// Hold every later call of `op` (dispatch, finish, cancel, load) at a gate
    pub fn hold(&self, op: WorkerOp) -> WorkerGate {
        let (open_tx, open_rx) = watch::channel(false);
        let entered = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .insert(op, (open_rx, entered.clone()));
        WorkerGate { open_tx, entered }
    }

    pub fn calls(&self) -> Vec<WorkerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Ids of every modeling the scheduler talked to, in call order
    pub fn touched_modelings(&self) -> Vec<i64> {
        self.calls().iter().filter_map(WorkerCall::modeling_id).collect()
    }

    async fn pass_gate(&self, op: WorkerOp) {
        let gate = self.gates.lock().unwrap().get(&op).cloned();
        if let Some((mut open_rx, entered)) = gate {
            entered.add_permits(1);
            let _ = open_rx.wait_for(|open| *open).await;
        }
    }

    fn record(&self, op: WorkerOp, base_url: &str, call: WorkerCall) -> ModelOpsResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.unreachable.lock().unwrap().contains(base_url) {
            return Err(ModelOpsError::WorkerRequest {
                endpoint: base_url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        if self.failing.lock().unwrap().contains(&op) {
            return Err(ModelOpsError::WorkerRequest {
                endpoint: base_url.to_string(),
                message: format!("injected {op:?} failure"),
            });
        }
        Ok(())
    }
}

impl Default for MockWorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn dispatch(
        &self,
        base_url: &str,
        endpoint: DispatchEndpoint,
        modeling_id: i64,
    ) -> ModelOpsResult<String> {
        self.pass_gate(WorkerOp::Dispatch).await;
        self.record(
            WorkerOp::Dispatch,
            base_url,
            WorkerCall::Dispatch {
                base_url: base_url.to_string(),
                endpoint,
                modeling_id,
            },
        )?;
        Ok("accepted".to_string())
    }

    async fn finish(&self, base_url: &str, modeling_id: i64) -> ModelOpsResult<String> {
        self.pass_gate(WorkerOp::Finish).await;
        self.record(
            WorkerOp::Finish,
            base_url,
            WorkerCall::Finish {
                base_url: base_url.to_string(),
                modeling_id,
            },
        )?;
        Ok("finished".to_string())
    }

    async fn cancel(&self, base_url: &str, modeling_id: i64) -> ModelOpsResult<()> {
        self.pass_gate(WorkerOp::Cancel).await;
        self.record(
            WorkerOp::Cancel,
            base_url,
            WorkerCall::Cancel {
                base_url: base_url.to_string(),
                modeling_id,
            },
        )
    }

    async fn remove_artifacts(&self, base_url: &str, target_path: &str) -> ModelOpsResult<()> {
        self.record(
            WorkerOp::Remove,
            base_url,
            WorkerCall::Remove {
                base_url: base_url.to_string(),
                target_path: target_path.to_string(),
            },
        )
    }

    async fn load_model(
        &self,
        base_url: &str,
        request: &LoadModelRequest,
    ) -> ModelOpsResult<LoadModelResponse> {
        self.pass_gate(WorkerOp::Load).await;
        self.record(
            WorkerOp::Load,
            base_url,
            WorkerCall::Load {
                base_url: base_url.to_string(),
                request: request.clone(),
            },
        )?;
        let model_num = self.next_model_num.fetch_add(1, Ordering::SeqCst);
        Ok(LoadModelResponse {
            name: request.model_name.clone(),
            models: vec![WorkerModel {
                model_num,
                model_file: request.model_path.clone(),
                engine: request.model_type.clone(),
            }],
        })
    }

    async fn unload_model(
        &self,
        base_url: &str,
        request: &UnloadModelRequest,
    ) -> ModelOpsResult<String> {
        self.record(
            WorkerOp::Unload,
            base_url,
            WorkerCall::Unload {
                base_url: base_url.to_string(),
                request: request.clone(),
            },
        )?;
        Ok(self.unload_body.lock().unwrap().clone())
    }

    async fn infer_vision(
        &self,
        base_url: &str,
        request: &VisionInferenceRequest,
    ) -> ModelOpsResult<serde_json::Value> {
        self.record(
            WorkerOp::InferVision,
            base_url,
            WorkerCall::InferVision {
                base_url: base_url.to_string(),
                model_name: request.model_name.clone(),
                model_num: request.model_num,
                heatmap: request.heatmap,
            },
        )?;
        Ok(self.vision_response.lock().unwrap().clone())
    }

    async fn infer_tabular(
        &self,
        base_url: &str,
        request: &TabularInferenceRequest,
    ) -> ModelOpsResult<serde_json::Value> {
        self.record(
            WorkerOp::InferTabular,
            base_url,
            WorkerCall::InferTabular {
                base_url: base_url.to_string(),
                model_name: request.model_name.clone(),
                model_num: request.model_num,
            },
        )?;
        Ok(json!({"prediction": [1], "x_input": request.x_input}))
    }

    async fn probe_system(&self, base_url: &str) -> ModelOpsResult<SystemInfo> {
        self.record(
            WorkerOp::Probe,
            base_url,
            WorkerCall::Probe {
                base_url: base_url.to_string(),
            },
        )?;
        Ok(self
            .system_info
            .lock()
            .unwrap()
            .get(base_url)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records validator/analyzer invocations in a shared, ordered log
#[derive(Clone, Default)]
pub struct RecordingCollaborators {
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatasetValidator for RecordingCollaborators {
    async fn validate(&self, root_id: i64) -> ModelOpsResult<()> {
        self.log.lock().unwrap().push(format!("validate:{root_id}"));
        Ok(())
    }
}

#[async_trait]
impl DatasetAnalyzer for RecordingCollaborators {
    async fn analyze(&self, root_id: i64) -> ModelOpsResult<()> {
        self.log.lock().unwrap().push(format!("analyze:{root_id}"));
        Ok(())
    }
}
