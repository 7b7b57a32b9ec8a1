// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use crate::store::SqliteStore;
use async_trait::async_trait;
use portability_core::domain::{JobAuthorization, JobState, PortabilityJob};
use portability_core::error::{AppError, Result};
use portability_core::port::JobStore;

#[async_trait]
impl JobStore for SqliteStore {
    async fn create(&self, job: &PortabilityJob) -> Result<()> {
        let auth = &job.authorization;
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, export_service, import_service, transfer_data_type, state,
                session_secret_key,
                encrypted_initial_export_auth_data, encrypted_initial_import_auth_data,
                encrypted_export_auth_data, encrypted_import_auth_data,
                bytes_transferred, failure_reason, cancel_requested,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.export_service)
        .bind(&job.import_service)
        .bind(job.transfer_data_type.to_string())
        .bind(auth.state.to_string())
        .bind(&auth.session_secret_key)
        .bind(&auth.encrypted_initial_export_auth_data)
        .bind(&auth.encrypted_initial_import_auth_data)
        .bind(&auth.encrypted_export_auth_data)
        .bind(&auth.encrypted_import_auth_data)
        .bind(job.bytes_transferred)
        .bind(&job.failure_reason)
        .bind(job.cancel_requested)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Job {} already exists", job.id)),
            other => other,
        })?;

        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<PortabilityJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn update(&self, job: &PortabilityJob, expected_prior: JobState) -> Result<()> {
        let auth = &job.authorization;
        // Compare-and-swap on state; cancel_requested is owned by request_cancel
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?,
                encrypted_initial_export_auth_data = ?, encrypted_initial_import_auth_data = ?,
                encrypted_export_auth_data = ?, encrypted_import_auth_data = ?,
                bytes_transferred = ?, failure_reason = ?, updated_at = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(auth.state.to_string())
        .bind(&auth.encrypted_initial_export_auth_data)
        .bind(&auth.encrypted_initial_import_auth_data)
        .bind(&auth.encrypted_export_auth_data)
        .bind(&auth.encrypted_import_auth_data)
        .bind(job.bytes_transferred)
        .bind(&job.failure_reason)
        .bind(job.updated_at)
        .bind(&job.id)
        .bind(expected_prior.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
                .bind(&job.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            return match current {
                None => Err(AppError::NotFound(format!("Job {} not found", job.id))),
                Some(current) => Err(AppError::Conflict(format!(
                    "Job {} is {}, expected {}",
                    job.id, current, expected_prior
                ))),
            };
        }
        Ok(())
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<PortabilityJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE state = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn request_cancel(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET cancel_requested = 1, updated_at = ?
            WHERE id = ? AND state NOT IN (?, ?)
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(id)
        .bind(JobState::Complete.to_string())
        .bind(JobState::Error.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.find(id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Job {} not found", id))),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    export_service: String,
    import_service: String,
    transfer_data_type: String,
    state: String,
    session_secret_key: String,
    encrypted_initial_export_auth_data: Option<String>,
    encrypted_initial_import_auth_data: Option<String>,
    encrypted_export_auth_data: Option<String>,
    encrypted_import_auth_data: Option<String>,
    bytes_transferred: i64,
    failure_reason: Option<String>,
    cancel_requested: bool,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> Result<PortabilityJob> {
        let corrupt = |field: &str, value: &str| {
            AppError::Database(format!("Job {} has invalid {}: {}", self.id, field, value))
        };
        let state = self
            .state
            .parse::<JobState>()
            .map_err(|_| corrupt("state", &self.state))?;
        let transfer_data_type = self
            .transfer_data_type
            .parse()
            .map_err(|_| corrupt("transfer_data_type", &self.transfer_data_type))?;

        Ok(PortabilityJob {
            id: self.id,
            export_service: self.export_service,
            import_service: self.import_service,
            transfer_data_type,
            authorization: JobAuthorization {
                state,
                session_secret_key: self.session_secret_key,
                encrypted_initial_export_auth_data: self.encrypted_initial_export_auth_data,
                encrypted_initial_import_auth_data: self.encrypted_initial_import_auth_data,
                encrypted_export_auth_data: self.encrypted_export_auth_data,
                encrypted_import_auth_data: self.encrypted_import_auth_data,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
            bytes_transferred: self.bytes_transferred,
            failure_reason: self.failure_reason,
            cancel_requested: self.cancel_requested,
        })
    }
}
