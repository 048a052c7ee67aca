use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use modelops_core::{
    models::{Device, DeviceWithGpus, Gpu, GpuState, NewDevice, ReportedGpu},
    traits::ResourcePool,
    ModelOpsError, ModelOpsResult,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

const DEVICE_COLUMNS: &str = "d.id, d.name, d.ip, d.port, d.is_use, d.transport, d.created_at";
const GPU_COLUMNS: &str = "id, device_id, uuid, gpu_index, name, is_use, state, updated_at";

/// 基于SQLite的设备/GPU资源池
pub struct SqliteResourcePool {
    pool: SqlitePool,
}

impl SqliteResourcePool {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> ModelOpsResult<Device> {
        Ok(Device {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            ip: row.try_get("ip")?,
            port: row.try_get("port")?,
            is_use: row.try_get("is_use")?,
            transport: row.try_get("transport")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_gpu(row: &sqlx::sqlite::SqliteRow) -> ModelOpsResult<Gpu> {
        Ok(Gpu {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            uuid: row.try_get("uuid")?,
            gpu_index: row.try_get("gpu_index")?,
            name: row.try_get("name")?,
            is_use: row.try_get("is_use")?,
            state: row.try_get("state")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn dedup_ids(gpu_ids: &[i64]) -> Vec<i64> {
        let mut ids = gpu_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    async fn select_devices_by_gpu(
        &self,
        gpu_ids: &[i64],
        idle_only: bool,
    ) -> ModelOpsResult<Vec<Device>> {
        if gpu_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT DISTINCT {DEVICE_COLUMNS} FROM devices d JOIN gpus g ON g.device_id = d.id WHERE g.id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in gpu_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        if idle_only {
            builder.push(" AND g.is_use = 1 AND g.state = ");
            builder.push_bind(GpuState::Idle);
        }
        builder.push(" ORDER BY d.id");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        rows.iter().map(Self::row_to_device).collect()
    }
}

#[async_trait]
impl ResourcePool for SqliteResourcePool {
    async fn register_device(&self, device: &NewDevice) -> ModelOpsResult<Device> {
        let row = sqlx::query(
            r#"
            INSERT INTO devices (name, ip, port, is_use, transport, created_at)
            VALUES ($1, $2, $3, 1, $4, $5)
            RETURNING id, name, ip, port, is_use, transport, created_at
            "#,
        )
        .bind(&device.name)
        .bind(&device.ip)
        .bind(device.port)
        .bind(device.transport)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        let registered = Self::row_to_device(&row)?;
        info!(
            "注册设备成功: {} ({}) {}",
            registered.name,
            registered.id,
            registered.base_url()
        );
        Ok(registered)
    }

    async fn set_device_use(&self, device_id: i64, is_use: bool) -> ModelOpsResult<()> {
        let result = sqlx::query("UPDATE devices SET is_use = $1 WHERE id = $2")
            .bind(is_use)
            .bind(device_id)
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ModelOpsError::DeviceNotFound { id: device_id });
        }
        debug!("设备 {} is_use={}", device_id, is_use);
        Ok(())
    }

    async fn get_device(&self, device_id: i64) -> ModelOpsResult<Option<Device>> {
        let row = sqlx::query(&format!("SELECT {DEVICE_COLUMNS} FROM devices d WHERE d.id = $1"))
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_device).transpose()
    }

    async fn get_gpu(&self, gpu_id: i64) -> ModelOpsResult<Option<Gpu>> {
        let row = sqlx::query(&format!("SELECT {GPU_COLUMNS} FROM gpus WHERE id = $1"))
            .bind(gpu_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        row.as_ref().map(Self::row_to_gpu).transpose()
    }

    async fn select_idle_by_gpu(&self, gpu_ids: &[i64]) -> ModelOpsResult<Vec<Device>> {
        self.select_devices_by_gpu(gpu_ids, true).await
    }

    async fn select_by_gpu(&self, gpu_ids: &[i64]) -> ModelOpsResult<Vec<Device>> {
        self.select_devices_by_gpu(gpu_ids, false).await
    }

    async fn select_active_devices(&self) -> ModelOpsResult<Vec<Device>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices d WHERE d.is_use = 1 ORDER BY d.id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        rows.iter().map(Self::row_to_device).collect()
    }

    async fn select_idle_gpus(&self) -> ModelOpsResult<Vec<Gpu>> {
        let rows = sqlx::query(&format!(
            "SELECT {GPU_COLUMNS} FROM gpus WHERE is_use = 1 AND state = $1 ORDER BY id"
        ))
        .bind(GpuState::Idle)
        .fetch_all(&self.pool)
        .await
        .map_err(ModelOpsError::Database)?;

        rows.iter().map(Self::row_to_gpu).collect()
    }

    async fn refresh(&self, device_id: i64, reported: &[ReportedGpu]) -> ModelOpsResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(ModelOpsError::Database)?;

        for gpu in reported {
            sqlx::query(
                r#"
                INSERT INTO gpus (device_id, uuid, gpu_index, name, is_use, state, updated_at)
                VALUES ($1, $2, $3, $4, 1, $5, $6)
                ON CONFLICT(uuid) DO UPDATE SET
                    device_id = excluded.device_id,
                    gpu_index = excluded.gpu_index,
                    name = excluded.name,
                    is_use = 1,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(device_id)
            .bind(&gpu.uuid)
            .bind(gpu.index)
            .bind(&gpu.name)
            .bind(GpuState::Idle)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(ModelOpsError::Database)?;
        }

        tx.commit().await.map_err(ModelOpsError::Database)?;
        debug!("设备 {} 刷新GPU {} 块", device_id, reported.len());
        Ok(())
    }

    async fn set_all_disuse(&self) -> ModelOpsResult<()> {
        sqlx::query("UPDATE gpus SET is_use = 0, state = $1, updated_at = $2")
            .bind(GpuState::Idle)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;
        Ok(())
    }

    async fn set_many_state(&self, gpu_ids: &[i64], state: GpuState) -> ModelOpsResult<()> {
        if gpu_ids.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE gpus SET state = ");
        builder.push_bind(state);
        builder.push(", updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in gpu_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        debug!("GPU {:?} 状态更新为 {}", gpu_ids, state);
        Ok(())
    }

    async fn try_claim(&self, gpu_ids: &[i64], state: GpuState) -> ModelOpsResult<bool> {
        let ids = Self::dedup_ids(gpu_ids);
        if ids.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await.map_err(ModelOpsError::Database)?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE gpus SET state = ");
        builder.push_bind(state);
        builder.push(", updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE is_use = 1 AND state = ");
        builder.push_bind(GpuState::Idle);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(ModelOpsError::Database)?;

        if result.rows_affected() != ids.len() as u64 {
            tx.rollback().await.map_err(ModelOpsError::Database)?;
            debug!("GPU {:?} 占用失败，已有GPU不再空闲", ids);
            return Ok(false);
        }

        tx.commit().await.map_err(ModelOpsError::Database)?;
        debug!("GPU {:?} 已占用为 {}", ids, state);
        Ok(true)
    }

    async fn transition_state(
        &self,
        gpu_ids: &[i64],
        from: GpuState,
        to: GpuState,
    ) -> ModelOpsResult<u64> {
        if gpu_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE gpus SET state = ");
        builder.push_bind(to);
        builder.push(", updated_at = ");
        builder.push_bind(Utc::now());
        builder.push(" WHERE state = ");
        builder.push_bind(from);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in gpu_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        debug!(
            "GPU {:?} 由 {} 切换为 {}，实际 {} 块",
            gpu_ids,
            from,
            to,
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    async fn snapshot(&self) -> ModelOpsResult<Vec<DeviceWithGpus>> {
        let device_rows = sqlx::query(&format!("SELECT {DEVICE_COLUMNS} FROM devices d ORDER BY d.id"))
            .fetch_all(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;
        let gpu_rows = sqlx::query(&format!("SELECT {GPU_COLUMNS} FROM gpus ORDER BY device_id, gpu_index"))
            .fetch_all(&self.pool)
            .await
            .map_err(ModelOpsError::Database)?;

        let mut gpus_by_device: BTreeMap<i64, Vec<Gpu>> = BTreeMap::new();
        for row in &gpu_rows {
            let gpu = Self::row_to_gpu(row)?;
            gpus_by_device.entry(gpu.device_id).or_default().push(gpu);
        }

        device_rows
            .iter()
            .map(|row| {
                let device = Self::row_to_device(row)?;
                let gpus = gpus_by_device.remove(&device.id).unwrap_or_default();
                Ok(DeviceWithGpus { device, gpus })
            })
            .collect()
    }
}
