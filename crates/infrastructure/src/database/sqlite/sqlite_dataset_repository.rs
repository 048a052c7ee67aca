use async_trait::async_trait;
use chrono::Utc;
use modelops_core::{
    models::{Dataset, DatasetRoot, DatasetValidation, NewDataset},
    traits::DatasetRepository,
    ModelOpsError, ModelOpsResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const DATASET_COLUMNS: &str = "id, root_id, name, path, parent_id, is_leaf, is_deleted, is_valid, \
     is_trainable, is_testable, data_type, data_format, engine_types, statistics, statistics_dir, \
     created_at, updated_at";

pub struct SqliteDatasetRepository {
    pool: SqlitePool,
}

impl SqliteDatasetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_root(row: &sqlx::sqlite::SqliteRow) -> ModelOpsResult<DatasetRoot> {
        Ok(DatasetRoot {
            id: row.try_get("id")?,
            path: row.try_get("path")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_dataset(row: &sqlx::sqlite::SqliteRow) -> ModelOpsResult<Dataset> {
        let engine_types: String = row.try_get("engine_types")?;
        let engine_types: Vec<String> = serde_json::from_str(&engine_types)
            .map_err(|e| ModelOpsError::Serialization(format!("解析引擎标签失败: {e}")))?;
        let statistics = row
            .try_get::<Option<String>, _>("statistics")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| ModelOpsError::Serialization(format!("解析统计信息失败: {e}")))?;

        Ok(Dataset {
            id: row.try_get("id")?,
            root_id: row.try_get("root_id")?,
            name: row.try_get("name")?,
            path: row.try_get("path")?,
            parent_id: row.try_get("parent_id")?,
            is_leaf: row.try_get("is_leaf")?,
            is_deleted: row.try_get("is_deleted")?,
            is_valid: row.try_get("is_valid")?,
            is_trainable: row.try_get("is_trainable")?,
            is_testable: row.try_get("is_testable")?,
            data_type: row.try_get("data_type")?,
            data_format: row.try_get("data_format")?,
            engine_types,
            statistics,
            statistics_dir: row.try_get("statistics_dir")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DatasetRepository for SqliteDatasetRepository {
    async fn create_root(&self, path: &str) -> ModelOpsResult<DatasetRoot> {
        let row = sqlx::query(
            "INSERT INTO dataset_roots (path, is_active, created_at) VALUES ($1, 1, $2) \
             RETURNING id, path, is_active, created_at",
        )
        .bind(path)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        let root = Self::row_to_root(&row)?;
        debug!("创建数据集根目录成功: {} ({})", root.path, root.id);
        Ok(root)
    }

    async fn set_root_active(&self, root_id: i64, is_active: bool) -> ModelOpsResult<()> {
        let result = sqlx::query("UPDATE dataset_roots SET is_active = $1 WHERE id = $2")
            .bind(is_active)
            .bind(root_id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::DatasetRootNotFound { id: root_id });
        }
        debug!("更新数据集根目录 {} 激活状态: {}", root_id, is_active);
        Ok(())
    }

    async fn list_active_roots(&self) -> ModelOpsResult<Vec<DatasetRoot>> {
        let rows = sqlx::query(
            "SELECT id, path, is_active, created_at FROM dataset_roots WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        rows.iter().map(Self::row_to_root).collect()
    }

    async fn get_root(&self, root_id: i64) -> ModelOpsResult<Option<DatasetRoot>> {
        let row = sqlx::query("SELECT id, path, is_active, created_at FROM dataset_roots WHERE id = $1")
            .bind(root_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_root).transpose()
    }

    async fn get_by_id(&self, id: i64) -> ModelOpsResult<Option<Dataset>> {
        let row = sqlx::query(&format!("SELECT {DATASET_COLUMNS} FROM datasets WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_dataset).transpose()
    }

    async fn list_by_root(&self, root_id: i64) -> ModelOpsResult<Vec<Dataset>> {
        let rows = sqlx::query(&format!(
            "SELECT {DATASET_COLUMNS} FROM datasets WHERE root_id = $1 ORDER BY id"
        ))
        .bind(root_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        rows.iter().map(Self::row_to_dataset).collect()
    }

    async fn find_by_path(&self, root_id: i64, path: &str) -> ModelOpsResult<Option<Dataset>> {
        let row = sqlx::query(&format!(
            "SELECT {DATASET_COLUMNS} FROM datasets WHERE root_id = $1 AND path = $2"
        ))
        .bind(root_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_dataset).transpose()
    }

    async fn insert(&self, dataset: &NewDataset) -> ModelOpsResult<Dataset> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO datasets (root_id, name, path, parent_id, is_leaf, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {DATASET_COLUMNS}
            "#
        ))
        .bind(dataset.root_id)
        .bind(&dataset.name)
        .bind(&dataset.path)
        .bind(dataset.parent_id)
        .bind(dataset.is_leaf)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        let created = Self::row_to_dataset(&row)?;
        debug!("新增数据集节点: {} ({})", created.path, created.id);
        Ok(created)
    }

    async fn set_deleted(&self, id: i64, is_deleted: bool) -> ModelOpsResult<()> {
        let result =
            sqlx::query("UPDATE datasets SET is_deleted = $1, updated_at = $2 WHERE id = $3")
                .bind(is_deleted)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::DatasetNotFound { id });
        }
        debug!("数据集 {} 删除标记: {}", id, is_deleted);
        Ok(())
    }

    async fn set_leaf(&self, id: i64, is_leaf: bool) -> ModelOpsResult<()> {
        let result = sqlx::query("UPDATE datasets SET is_leaf = $1, updated_at = $2 WHERE id = $3")
            .bind(is_leaf)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::DatasetNotFound { id });
        }
        debug!("数据集 {} 叶子标记: {}", id, is_leaf);
        Ok(())
    }

    async fn update_validation(
        &self,
        id: i64,
        validation: &DatasetValidation,
    ) -> ModelOpsResult<()> {
        let engine_types = serde_json::to_string(&validation.engine_types)?;
        let result = sqlx::query(
            r#"
            UPDATE datasets
            SET is_valid = $1, is_trainable = $2, is_testable = $3,
                data_type = $4, data_format = $5, engine_types = $6, updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(validation.is_valid)
        .bind(validation.is_trainable)
        .bind(validation.is_testable)
        .bind(&validation.data_type)
        .bind(&validation.data_format)
        .bind(engine_types)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::DatasetNotFound { id });
        }
        debug!("更新数据集 {} 校验结果", id);
        Ok(())
    }

    async fn update_statistics(
        &self,
        id: i64,
        statistics: &serde_json::Value,
        statistics_dir: Option<&str>,
    ) -> ModelOpsResult<()> {
        let result = sqlx::query(
            "UPDATE datasets SET statistics = $1, statistics_dir = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(statistics.to_string())
        .bind(statistics_dir)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::DatasetNotFound { id });
        }
        debug!("更新数据集 {} 统计信息", id);
        Ok(())
    }
}
