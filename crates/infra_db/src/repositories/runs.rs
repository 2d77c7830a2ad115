//! Run repository implementation
//!
//! PostgreSQL adapter for the run store port. The patch update uses
//! COALESCE so incremental counter refreshes and terminal finalization
//! share one statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{DomainPort, PortError, RunId};
use domain_batch::{Run, RunPatch, RunStatus, RunStore, RunType};

use crate::error::map_sqlx;

/// Repository for run telemetry rows
#[derive(Debug, Clone)]
pub struct RunRepository {
    pool: PgPool,
}

impl RunRepository {
    /// Creates a new RunRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for RunRepository {}

#[async_trait]
impl RunStore for RunRepository {
    async fn create(&self, run: &Run) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO runs (
                id, run_type, status, started_at, finished_at, metadata,
                total_records, completed_count, failed_count, skipped_count,
                error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::from(run.id))
        .bind(run.run_type.as_str())
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run.metadata)
        .bind(run.total_records as i32)
        .bind(run.completed_count as i32)
        .bind(run.failed_count as i32)
        .bind(run.skipped_count as i32)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update(&self, id: RunId, patch: RunPatch) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = COALESCE($1, status),
                total_records = COALESCE($2, total_records),
                completed_count = COALESCE($3, completed_count),
                failed_count = COALESCE($4, failed_count),
                skipped_count = COALESCE($5, skipped_count),
                finished_at = COALESCE($6, finished_at),
                error_message = COALESCE($7, error_message)
            WHERE id = $8
            "#,
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.total_records.map(|n| n as i32))
        .bind(patch.completed_count.map(|n| n as i32))
        .bind(patch.failed_count.map(|n| n as i32))
        .bind(patch.skipped_count.map(|n| n as i32))
        .bind(patch.finished_at)
        .bind(patch.error_message)
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("Run", id));
        }
        Ok(())
    }

    async fn get(&self, id: RunId) -> Result<Run, PortError> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"
            SELECT id, run_type, status, started_at, finished_at, metadata,
                   total_records, completed_count, failed_count, skipped_count,
                   error_message
            FROM runs
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.ok_or_else(|| PortError::not_found("Run", id))?.try_into()
    }
}

/// Flat row shape for the runs table
#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    run_type: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    total_records: i32,
    completed_count: i32,
    failed_count: i32,
    skipped_count: i32,
    error_message: Option<String>,
}

fn parse_run_type(text: &str) -> Result<RunType, PortError> {
    match text {
        "queue_extraction" => Ok(RunType::QueueExtraction),
        "enhancement" => Ok(RunType::Enhancement),
        "submission" => Ok(RunType::Submission),
        other => Err(PortError::internal(format!(
            "unknown run_type '{other}' in runs table"
        ))),
    }
}

fn parse_run_status(text: &str) -> Result<RunStatus, PortError> {
    match text {
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        other => Err(PortError::internal(format!(
            "unknown run status '{other}' in runs table"
        ))),
    }
}

impl TryFrom<RunRow> for Run {
    type Error = PortError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(Run {
            id: RunId::from(row.id),
            run_type: parse_run_type(&row.run_type)?,
            status: parse_run_status(&row.status)?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            metadata: row.metadata,
            total_records: row.total_records.max(0) as u32,
            completed_count: row.completed_count.max(0) as u32,
            failed_count: row.failed_count.max(0) as u32,
            skipped_count: row.skipped_count.max(0) as u32,
            error_message: row.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_type_text_round_trip() {
        for run_type in [
            RunType::QueueExtraction,
            RunType::Enhancement,
            RunType::Submission,
        ] {
            assert_eq!(parse_run_type(run_type.as_str()).unwrap(), run_type);
        }
    }

    #[test]
    fn test_unknown_run_fields_are_rejected() {
        assert!(parse_run_type("settlement").is_err());
        assert!(parse_run_status("paused").is_err());
    }
}
