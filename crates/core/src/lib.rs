//! 训练控制面的核心领域类型
//!
//! 包含数据模型、统一错误类型、配置以及各组件之间的trait边界。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::*;
pub use traits::*;
