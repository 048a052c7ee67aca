pub mod sqlite_dataset_repository;
pub mod sqlite_modeling_detail_repository;
pub mod sqlite_modeling_repository;
pub mod sqlite_resource_pool;
pub mod sqlite_task_repository;

pub use sqlite_dataset_repository::SqliteDatasetRepository;
pub use sqlite_modeling_detail_repository::{SqliteModelingDetailRepository, BEST_MODELS_DETAIL};
pub use sqlite_modeling_repository::SqliteModelingRepository;
pub use sqlite_resource_pool::SqliteResourcePool;
pub use sqlite_task_repository::SqliteTaskRepository;

#[cfg(test)]
pub(crate) async fn setup_test_db() -> sqlx::SqlitePool {
    let manager = super::DatabaseManager::in_memory().await.unwrap();
    manager.migrate().await.unwrap();
    manager.pool().clone()
}
