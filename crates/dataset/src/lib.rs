//! 数据集树同步
//!
//! 周期性地把每个启用的数据集根目录下的目录结构同步到 `datasets` 表，
//! 并在每轮同步后依次调用校验器与统计分析器。

pub mod analyzer;
pub mod layout;
pub mod sync;
pub mod tree;
pub mod validator;

pub use analyzer::SummaryAnalyzer;
pub use sync::{DatasetTreeSync, SyncReport};
pub use tree::{DatasetForest, ForestNode};
pub use validator::LayoutValidator;
