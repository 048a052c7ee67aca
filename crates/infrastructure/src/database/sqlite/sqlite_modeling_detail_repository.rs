use async_trait::async_trait;
use chrono::Utc;
use modelops_core::{
    models::BestModels, traits::ModelingDetailRepository, ModelOpsError, ModelOpsResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// 最优模型字典的detail_type
pub const BEST_MODELS_DETAIL: &str = "best_models";

pub struct SqliteModelingDetailRepository {
    pool: SqlitePool,
}

impl SqliteModelingDetailRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelingDetailRepository for SqliteModelingDetailRepository {
    async fn save_detail(
        &self,
        modeling_id: i64,
        detail_type: &str,
        data: &serde_json::Value,
    ) -> ModelOpsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO modeling_details (modeling_id, detail_type, data, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(modeling_id, detail_type) DO UPDATE SET
                data = excluded.data,
                created_at = excluded.created_at
            "#,
        )
        .bind(modeling_id)
        .bind(detail_type)
        .bind(data.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        debug!("保存建模 {} 详情: {}", modeling_id, detail_type);
        Ok(())
    }

    async fn get_detail(
        &self,
        modeling_id: i64,
        detail_type: &str,
    ) -> ModelOpsResult<Option<serde_json::Value>> {
        let row = sqlx::query(
            "SELECT data FROM modeling_details WHERE modeling_id = $1 AND detail_type = $2",
        )
        .bind(modeling_id)
        .bind(detail_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("data")?;
                let value = serde_json::from_str(&raw).map_err(|e| {
                    ModelOpsError::Serialization(format!(
                        "解析建模 {modeling_id} 详情 {detail_type} 失败: {e}"
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn select_best_models(&self, modeling_id: i64) -> ModelOpsResult<Option<BestModels>> {
        match self.get_detail(modeling_id, BEST_MODELS_DETAIL).await? {
            Some(value) => {
                let best = serde_json::from_value(value).map_err(|e| {
                    ModelOpsError::Serialization(format!(
                        "建模 {modeling_id} 最优模型字典格式错误: {e}"
                    ))
                })?;
                Ok(Some(best))
            }
            None => Ok(None),
        }
    }
}
