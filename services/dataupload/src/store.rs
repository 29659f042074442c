use crate::config::DatabaseConfig;
use crate::models::{DataRecord, FileUpload, RecordData};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Durable storage for uploads and their parsed records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert upload metadata; the store assigns the ID and timestamp
    async fn create_upload(&self, file: &str) -> Result<FileUpload>;

    /// Insert one record owned by `upload_id`
    async fn create_record(
        &self,
        upload_id: i64,
        data: &RecordData,
        record_type: Option<&str>,
    ) -> Result<DataRecord>;

    /// Records in insertion order, optionally restricted to one type tag
    async fn list_records(&self, record_type: Option<&str>) -> Result<Vec<DataRecord>>;

    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

/// PostgreSQL-backed record store
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self))]
    async fn create_upload(&self, file: &str) -> Result<FileUpload> {
        let upload = sqlx::query_as::<_, FileUpload>(
            r#"
            INSERT INTO file_uploads (file, uploaded_at)
            VALUES ($1, NOW())
            RETURNING id, file, uploaded_at
            "#,
        )
        .bind(file)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert file upload")?;

        debug!(upload_id = upload.id, "File upload indexed");

        Ok(upload)
    }

    #[instrument(skip(self, data))]
    async fn create_record(
        &self,
        upload_id: i64,
        data: &RecordData,
        record_type: Option<&str>,
    ) -> Result<DataRecord> {
        let record = sqlx::query_as::<_, DataRecord>(
            r#"
            INSERT INTO data_records (file_upload_id, data, type)
            VALUES ($1, $2, $3)
            RETURNING id, file_upload_id, data, type
            "#,
        )
        .bind(upload_id)
        .bind(sqlx::types::Json(data))
        .bind(record_type)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert data record")?;

        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_records(&self, record_type: Option<&str>) -> Result<Vec<DataRecord>> {
        let records = sqlx::query_as::<_, DataRecord>(
            r#"
            SELECT id, file_upload_id, data, type
            FROM data_records
            WHERE ($1::text IS NULL OR type = $1)
            ORDER BY id ASC
            "#,
        )
        .bind(record_type)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query data records")?;

        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}
