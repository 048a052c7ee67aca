use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use modelops_core::{
    config::DatabaseConfig,
    traits::{
        DatasetRepository, ModelingDetailRepository, ModelingRepository, ResourcePool,
        TaskRepository,
    },
    ModelOpsError, ModelOpsResult,
};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::sqlite::{
    SqliteDatasetRepository, SqliteModelingDetailRepository, SqliteModelingRepository,
    SqliteResourcePool, SqliteTaskRepository,
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite连接池与各仓储的工厂
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> ModelOpsResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
            .connect_with(options)
            .await
            .map_err(ModelOpsError::Database)?;

        info!("数据库连接成功: {}", config.url);
        Ok(Self { pool })
    }

    /// 单连接内存数据库，每个连接池独享一份数据
    pub async fn in_memory() -> ModelOpsResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(ModelOpsError::Database)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> ModelOpsResult<()> {
        MIGRATOR.run(&self.pool).await?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> ModelOpsResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn dataset_repository(&self) -> Arc<dyn DatasetRepository> {
        Arc::new(SqliteDatasetRepository::new(self.pool.clone()))
    }

    pub fn resource_pool(&self) -> Arc<dyn ResourcePool> {
        Arc::new(SqliteResourcePool::new(self.pool.clone()))
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        Arc::new(SqliteTaskRepository::new(self.pool.clone()))
    }

    pub fn modeling_repository(&self) -> Arc<dyn ModelingRepository> {
        Arc::new(SqliteModelingRepository::new(self.pool.clone()))
    }

    pub fn modeling_detail_repository(&self) -> Arc<dyn ModelingDetailRepository> {
        Arc::new(SqliteModelingDetailRepository::new(self.pool.clone()))
    }
}
