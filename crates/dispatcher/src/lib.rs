//! 建模调度
//!
//! - [`scheduler::Scheduler`]：周期性收尾 `finish` 建模并下发 `idle` 建模
//! - [`controller::ModelingController`]：启动、追加、取消、删除建模
//! - [`health_probe::HealthProbe`]：探测设备并刷新GPU清单
//!
//! 三者共享一把 [`AllocationLock`]，GPU的占用与释放在锁内串行执行，
//! Worker调用都在锁外。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

pub mod controller;
pub mod gpu_matcher;
pub mod health_probe;
pub mod scheduler;

pub use controller::ModelingController;
pub use gpu_matcher::{GpuAssignment, GpuMatcher};
pub use health_probe::{HealthProbe, ProbeReport};
pub use scheduler::{Scheduler, TickReport};

/// GPU分配锁，锁内保存已占用但尚未提交为 `request` 的GPU
///
/// 锁只包住数据库读写，调用Worker前释放。
pub type AllocationLock = Arc<Mutex<PendingClaims>>;

pub fn allocation_lock() -> AllocationLock {
    Arc::new(Mutex::new(PendingClaims::default()))
}

/// 下发请求仍在途中的建模及其占用的GPU
///
/// 这些建模在数据库中仍是 `idle`，收尾和探测要把它们的GPU当作已占用。
#[derive(Debug, Default)]
pub struct PendingClaims {
    by_modeling: HashMap<i64, Vec<i64>>,
}

impl PendingClaims {
    pub fn insert(&mut self, modeling_id: i64, gpu_ids: Vec<i64>) {
        self.by_modeling.insert(modeling_id, gpu_ids);
    }

    pub fn remove(&mut self, modeling_id: i64) -> Option<Vec<i64>> {
        self.by_modeling.remove(&modeling_id)
    }

    pub fn contains_modeling(&self, modeling_id: i64) -> bool {
        self.by_modeling.contains_key(&modeling_id)
    }

    pub fn gpu_ids(&self) -> BTreeSet<i64> {
        self.by_modeling.values().flatten().copied().collect()
    }
}
