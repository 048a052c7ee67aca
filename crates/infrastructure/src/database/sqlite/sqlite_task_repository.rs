use async_trait::async_trait;
use chrono::Utc;
use modelops_core::{
    models::{Modeling, ModelingParams, ModelingStep, ModelingType, NewTask, Task},
    traits::TaskRepository,
    ModelOpsError, ModelOpsResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::sqlite_modeling_repository::{SqliteModelingRepository, MODELING_COLUMNS};

const TASK_COLUMNS: &str =
    "id, project_id, dataset_id, engine_type, target_metric, params, created_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> ModelOpsResult<Task> {
        let id: i64 = row.try_get("id")?;
        let raw_params: String = row.try_get("params")?;
        let params = ModelingParams::from_json(&raw_params).map_err(|e| {
            ModelOpsError::Serialization(format!("解析任务 {id} 参数文档失败: {e}"))
        })?;

        Ok(Task {
            id,
            project_id: row.try_get("project_id")?,
            dataset_id: row.try_get("dataset_id")?,
            engine_type: row.try_get("engine_type")?,
            target_metric: row.try_get("target_metric")?,
            params,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create_with_modeling(
        &self,
        task: &NewTask,
        modeling_type: ModelingType,
    ) -> ModelOpsResult<(Task, Modeling)> {
        let params_json = task.params.to_json()?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(ModelOpsError::Database)?;

        let task_row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (project_id, dataset_id, engine_type, target_metric, params, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.project_id)
        .bind(task.dataset_id)
        .bind(task.engine_type())
        .bind(&task.target_metric)
        .bind(&params_json)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(ModelOpsError::Database)?;
        let created_task = Self::row_to_task(&task_row)?;

        let modeling_row = sqlx::query(&format!(
            r#"
            INSERT INTO modelings (task_id, parent_id, modeling_type, step, progress, params, created_at, updated_at)
            VALUES ($1, 0, $2, $3, 0, $4, $5, $5)
            RETURNING {MODELING_COLUMNS}
            "#
        ))
        .bind(created_task.id)
        .bind(modeling_type)
        .bind(ModelingStep::Idle)
        .bind(&params_json)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(ModelOpsError::Database)?;
        let created_modeling = SqliteModelingRepository::row_to_modeling(&modeling_row)?;

        tx.commit().await.map_err(ModelOpsError::Database)?;

        info!(
            "创建任务成功: {} (engine {}, 初始建模 {})",
            created_task.id, created_task.engine_type, created_modeling.id
        );
        Ok((created_task, created_modeling))
    }

    async fn get_by_id(&self, id: i64) -> ModelOpsResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn delete(&self, id: i64) -> ModelOpsResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::TaskNotFound { id });
        }
        debug!("删除任务成功: {}", id);
        Ok(())
    }
}
