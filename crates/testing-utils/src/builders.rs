//! Test data builders with sensible defaults

use modelops_core::models::{
    EngineParams, ModelingParams, NewDevice, NewTask, ReportedGpu, TransportType,
};

/// Builder for [`ModelingParams`], vision classification by default
pub struct ModelingParamsBuilder {
    params: ModelingParams,
}

impl ModelingParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: ModelingParams {
                data_path: "/data/ds1".to_string(),
                save_path: "/models/task-1".to_string(),
                device_ids: vec![],
                gpu_auto: true,
                engine: EngineParams::VisionClassification {
                    epochs: 1,
                    batch_size: 8,
                    image_size: 224,
                    pretrained: false,
                },
            },
        }
    }

    pub fn tabular() -> Self {
        let mut builder = Self::new();
        builder.params.data_path = "/data/table/train.csv".to_string();
        builder.params.engine = EngineParams::TabularClassification {
            target_column: "label".to_string(),
            feature_columns: vec![],
            trials: 5,
        };
        builder
    }

    pub fn with_data_path(mut self, path: &str) -> Self {
        self.params.data_path = path.to_string();
        self
    }

    pub fn with_save_path(mut self, path: &str) -> Self {
        self.params.save_path = path.to_string();
        self
    }

    /// Fixed GPU assignment, disables automatic selection
    pub fn with_device_ids(mut self, ids: Vec<i64>) -> Self {
        self.params.device_ids = ids;
        self.params.gpu_auto = false;
        self
    }

    pub fn with_gpu_auto(mut self, gpu_auto: bool) -> Self {
        self.params.gpu_auto = gpu_auto;
        self
    }

    pub fn build(self) -> ModelingParams {
        self.params
    }
}

impl Default for ModelingParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`NewTask`]
pub struct NewTaskBuilder {
    task: NewTask,
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            task: NewTask {
                project_id: 1,
                dataset_id: 1,
                target_metric: "accuracy".to_string(),
                params: ModelingParamsBuilder::new().build(),
            },
        }
    }

    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.task.project_id = project_id;
        self
    }

    pub fn with_dataset_id(mut self, dataset_id: i64) -> Self {
        self.task.dataset_id = dataset_id;
        self
    }

    pub fn with_params(mut self, params: ModelingParams) -> Self {
        self.task.params = params;
        self
    }

    pub fn build(self) -> NewTask {
        self.task
    }
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn new_device(name: &str, ip: &str, port: i32) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        ip: ip.to_string(),
        port,
        transport: TransportType::Http,
    }
}

pub fn reported_gpu(uuid: &str, index: i32) -> ReportedGpu {
    ReportedGpu {
        uuid: uuid.to_string(),
        index,
        name: "NVIDIA A100".to_string(),
    }
}
