use async_trait::async_trait;
use chrono::Utc;
use modelops_core::{
    models::{Modeling, ModelingParams, ModelingStep, NewModeling},
    traits::ModelingRepository,
    ModelOpsError, ModelOpsResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

pub(crate) const MODELING_COLUMNS: &str =
    "id, task_id, parent_id, modeling_type, step, progress, params, created_at, updated_at";

pub struct SqliteModelingRepository {
    pool: SqlitePool,
}

impl SqliteModelingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn row_to_modeling(row: &sqlx::sqlite::SqliteRow) -> ModelOpsResult<Modeling> {
        let id: i64 = row.try_get("id")?;
        let raw_params: String = row.try_get("params")?;
        let params = ModelingParams::from_json(&raw_params).map_err(|e| {
            ModelOpsError::Serialization(format!("解析建模 {id} 参数文档失败: {e}"))
        })?;

        Ok(Modeling {
            id,
            task_id: row.try_get("task_id")?,
            parent_id: row.try_get("parent_id")?,
            modeling_type: row.try_get("modeling_type")?,
            step: row.try_get("step")?,
            progress: row.try_get("progress")?,
            params,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// 参数文档无法解析的行记录日志后跳过，不影响其余行
    fn collect_modelings(rows: &[sqlx::sqlite::SqliteRow]) -> ModelOpsResult<Vec<Modeling>> {
        let mut modelings = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::row_to_modeling(row) {
                Ok(modeling) => modelings.push(modeling),
                Err(ModelOpsError::Serialization(message)) => {
                    warn!("跳过参数文档异常的建模记录: {}", message);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(modelings)
    }
}

#[async_trait]
impl ModelingRepository for SqliteModelingRepository {
    async fn create(&self, modeling: &NewModeling) -> ModelOpsResult<Modeling> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO modelings (task_id, parent_id, modeling_type, step, progress, params, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $6)
            RETURNING {MODELING_COLUMNS}
            "#
        ))
        .bind(modeling.task_id)
        .bind(modeling.parent_id)
        .bind(modeling.modeling_type)
        .bind(ModelingStep::Idle)
        .bind(modeling.params.to_json()?)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        let created = Self::row_to_modeling(&row)?;
        debug!(
            "创建建模成功: {} (task {}, {})",
            created.id, created.task_id, created.modeling_type
        );
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> ModelOpsResult<Option<Modeling>> {
        let row = sqlx::query(&format!("SELECT {MODELING_COLUMNS} FROM modelings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_modeling).transpose()
    }

    async fn list_by_step(&self, step: ModelingStep) -> ModelOpsResult<Vec<Modeling>> {
        let rows = sqlx::query(&format!(
            "SELECT {MODELING_COLUMNS} FROM modelings WHERE step = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(step)
        .fetch_all(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        Self::collect_modelings(&rows)
    }

    async fn list_by_task(&self, task_id: i64) -> ModelOpsResult<Vec<Modeling>> {
        let rows = sqlx::query(&format!(
            "SELECT {MODELING_COLUMNS} FROM modelings WHERE task_id = $1 ORDER BY id ASC"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        Self::collect_modelings(&rows)
    }

    async fn count_by_task(&self, task_id: i64) -> ModelOpsResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM modelings WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        Ok(row.try_get("count")?)
    }

    async fn update_step(&self, id: i64, step: ModelingStep) -> ModelOpsResult<()> {
        let result = sqlx::query("UPDATE modelings SET step = $1, updated_at = $2 WHERE id = $3")
            .bind(step)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::ModelingNotFound { id });
        }
        debug!("建模 {} 步骤更新为 {}", id, step);
        Ok(())
    }

    async fn update_params(&self, id: i64, params: &ModelingParams) -> ModelOpsResult<()> {
        let result = sqlx::query("UPDATE modelings SET params = $1, updated_at = $2 WHERE id = $3")
            .bind(params.to_json()?)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::ModelingNotFound { id });
        }
        debug!("建模 {} 参数文档已更新", id);
        Ok(())
    }

    async fn update_progress(&self, id: i64, progress: f64) -> ModelOpsResult<()> {
        let progress = progress.clamp(0.0, 100.0);
        let result =
            sqlx::query("UPDATE modelings SET progress = $1, updated_at = $2 WHERE id = $3")
                .bind(progress)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::ModelingNotFound { id });
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> ModelOpsResult<()> {
        let result = sqlx::query("DELETE FROM modelings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::ModelingNotFound { id });
        }
        debug!("删除建模成功: {}", id);
        Ok(())
    }
}
