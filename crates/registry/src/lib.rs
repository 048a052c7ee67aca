//! # ModelOps Registry
//!
//! 推理服务侧的模型登记：记录哪个训练产物加载在哪块GPU上，
//! 据此把推理请求路由到对应Worker，并提供按Task汇总最优模型的目录查询。
//!
//! 登记表只存在于进程内存中，重启后清空，不与Worker实际加载的模型对账。

pub mod catalog;
pub mod inference;
pub mod registry;

pub use catalog::{ModelCatalog, ModelingModels, TaskModels};
pub use inference::normalize_vision_result;
pub use registry::{DeviceInventory, LoadedModel, ModelRegistry};
