//! Visit repository implementation
//!
//! PostgreSQL adapter for the visit store port. Status enums are stored as
//! their snake_case text form; medicine lists and sources metadata live in
//! JSONB columns and are (de)serialized at this boundary.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use core_kernel::{DomainPort, Nric, PortError, VisitId};
use domain_visit::{
    ChargeType, DetailsBlock, DetailsStatus, DetailsUpdate, SubmissionBlock, SubmissionRecord,
    SubmissionStatus, Visit, VisitQuery, VisitStore,
};

use crate::error::map_sqlx;

const VISIT_COLUMNS: &str = "id, patient_name, visit_date, pay_type, nric, clinic_record_number, \
     diagnosis_text, diagnosis_code, charge_type, mc_days, mc_start_date, medicines, \
     treatment_summary, details_status, details_attempts, details_last_attempt_at, \
     details_error, details_sources, submission_status, submitted_at, submission_portal, \
     submission_metadata, submission_error, created_at, updated_at";

/// Repository for visit rows
#[derive(Debug, Clone)]
pub struct VisitRepository {
    pool: PgPool,
}

impl VisitRepository {
    /// Creates a new VisitRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a freshly extracted queue record
    pub async fn insert(&self, visit: &Visit) -> Result<(), PortError> {
        let medicines = serde_json::to_value(&visit.medicines)
            .map_err(|e| PortError::internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO visits (
                id, patient_name, visit_date, pay_type, nric, clinic_record_number,
                medicines, details_sources, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(visit.id))
        .bind(&visit.patient_name)
        .bind(visit.visit_date)
        .bind(&visit.pay_type)
        .bind(visit.nric.as_ref().map(Nric::as_str))
        .bind(&visit.clinic_record_number)
        .bind(medicines)
        .bind(&visit.details.sources)
        .bind(visit.created_at)
        .bind(visit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

impl DomainPort for VisitRepository {}

#[async_trait]
impl VisitStore for VisitRepository {
    async fn get(&self, id: VisitId) -> Result<Visit, PortError> {
        let row: Option<VisitRow> = sqlx::query_as(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.ok_or_else(|| PortError::not_found("Visit", id))?.try_into()
    }

    async fn find(&self, query: &VisitQuery) -> Result<Vec<Visit>, PortError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {VISIT_COLUMNS} FROM visits WHERE 1=1"));

        if !query.ids.is_empty() {
            builder.push(" AND id IN (");
            let mut ids = builder.separated(", ");
            for id in &query.ids {
                ids.push_bind(Uuid::from(*id));
            }
            builder.push(")");
        }
        if !query.pay_type_patterns.is_empty() {
            builder.push(" AND (");
            for (i, pattern) in query.pay_type_patterns.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder.push("pay_type ILIKE ");
                builder.push_bind(format!("%{pattern}%"));
            }
            builder.push(")");
        }
        if let Some(from) = query.date_from {
            builder.push(" AND visit_date >= ");
            builder.push_bind(from);
        }
        if let Some(to) = query.date_to {
            builder.push(" AND visit_date <= ");
            builder.push_bind(to);
        }
        if let Some(status) = query.details_status {
            builder.push(" AND details_status = ");
            builder.push_bind(details_status_str(status));
        }
        builder.push(" ORDER BY visit_date DESC, created_at DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(i64::from(limit));
        }

        let rows: Vec<VisitRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter().map(Visit::try_from).collect()
    }

    async fn set_nric(&self, id: VisitId, nric: &Nric) -> Result<(), PortError> {
        let result = sqlx::query(
            "UPDATE visits SET nric = $1, updated_at = now() WHERE id = $2",
        )
        .bind(nric.as_str())
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("Visit", id));
        }
        Ok(())
    }

    async fn begin_details_attempt(&self, id: VisitId) -> Result<(), PortError> {
        // Any status may re-enter in_progress (retries, forced reprocessing,
        // crash recovery); the skip decision belongs to the batch policy.
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET details_status = 'in_progress',
                details_last_attempt_at = now(),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("Visit", id));
        }
        Ok(())
    }

    async fn complete_details(&self, id: VisitId, update: DetailsUpdate) -> Result<(), PortError> {
        let medicines = serde_json::to_value(&update.medicines)
            .map_err(|e| PortError::internal(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET diagnosis_text = $1,
                diagnosis_code = $2,
                charge_type = $3,
                mc_days = $4,
                mc_start_date = $5,
                medicines = $6,
                treatment_summary = $7,
                details_sources = $8,
                details_status = 'completed',
                details_error = NULL,
                details_last_attempt_at = now(),
                updated_at = now()
            WHERE id = $9 AND details_status = 'in_progress'
            "#,
        )
        .bind(&update.diagnosis_text)
        .bind(&update.diagnosis_code)
        .bind(update.charge_type.map(|c| c.as_str()))
        .bind(i32::try_from(update.mc_days).unwrap_or(i32::MAX))
        .bind(update.mc_start_date)
        .bind(medicines)
        .bind(&update.treatment_summary)
        .bind(&update.sources)
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id, "Completed").await);
        }
        Ok(())
    }

    async fn fail_details(&self, id: VisitId, error: &str) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET details_status = 'failed',
                details_attempts = details_attempts + 1,
                details_error = $1,
                details_last_attempt_at = now(),
                updated_at = now()
            WHERE id = $2 AND details_status = 'in_progress'
            "#,
        )
        .bind(error)
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(self.transition_failure(id, "Failed").await);
        }
        Ok(())
    }

    async fn record_submission(&self, id: VisitId, record: SubmissionRecord) -> Result<(), PortError> {
        let status = if record.submitted { "submitted" } else { "draft" };
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET submission_status = $1,
                submitted_at = $2,
                submission_portal = $3,
                submission_metadata = $4,
                submission_error = NULL,
                updated_at = now()
            WHERE id = $5
            "#,
        )
        .bind(status)
        .bind(record.at)
        .bind(&record.portal)
        .bind(&record.metadata)
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("Visit", id));
        }
        Ok(())
    }

    async fn record_submission_error(
        &self,
        id: VisitId,
        portal: Option<&str>,
        error: &str,
    ) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET submission_status = 'error',
                submission_portal = COALESCE($1, submission_portal),
                submission_error = $2,
                updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(portal)
        .bind(error)
        .bind(Uuid::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("Visit", id));
        }
        Ok(())
    }
}

impl VisitRepository {
    /// Distinguishes "row missing" from "row in the wrong state" after a
    /// guarded update matched nothing
    async fn transition_failure(&self, id: VisitId, target: &str) -> PortError {
        let current: Result<Option<String>, _> =
            sqlx::query("SELECT details_status FROM visits WHERE id = $1")
                .bind(Uuid::from(id))
                .fetch_optional(&self.pool)
                .await
                .map(|row| row.map(|r| r.get::<String, _>(0)));

        match current {
            Ok(Some(status)) => PortError::validation(format!(
                "invalid detail status transition for visit {id}: {status} -> {target}"
            )),
            Ok(None) => PortError::not_found("Visit", id),
            Err(error) => map_sqlx(error),
        }
    }
}

/// Flat row shape for the visits table
#[derive(Debug, sqlx::FromRow)]
struct VisitRow {
    id: Uuid,
    patient_name: String,
    visit_date: NaiveDate,
    pay_type: String,
    nric: Option<String>,
    clinic_record_number: Option<String>,
    diagnosis_text: Option<String>,
    diagnosis_code: Option<String>,
    charge_type: Option<String>,
    mc_days: Option<i32>,
    mc_start_date: Option<NaiveDate>,
    medicines: serde_json::Value,
    treatment_summary: Option<String>,
    details_status: String,
    details_attempts: i32,
    details_last_attempt_at: Option<DateTime<Utc>>,
    details_error: Option<String>,
    details_sources: serde_json::Value,
    submission_status: String,
    submitted_at: Option<DateTime<Utc>>,
    submission_portal: Option<String>,
    submission_metadata: Option<serde_json::Value>,
    submission_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn details_status_str(status: DetailsStatus) -> &'static str {
    match status {
        DetailsStatus::Unset => "unset",
        DetailsStatus::InProgress => "in_progress",
        DetailsStatus::Completed => "completed",
        DetailsStatus::Failed => "failed",
    }
}

fn parse_details_status(text: &str) -> Result<DetailsStatus, PortError> {
    match text {
        "unset" => Ok(DetailsStatus::Unset),
        "in_progress" => Ok(DetailsStatus::InProgress),
        "completed" => Ok(DetailsStatus::Completed),
        "failed" => Ok(DetailsStatus::Failed),
        other => Err(PortError::internal(format!(
            "unknown details_status '{other}' in visits table"
        ))),
    }
}

fn parse_submission_status(text: &str) -> Result<SubmissionStatus, PortError> {
    match text {
        "unset" => Ok(SubmissionStatus::Unset),
        "draft" => Ok(SubmissionStatus::Draft),
        "submitted" => Ok(SubmissionStatus::Submitted),
        "error" => Ok(SubmissionStatus::Error),
        other => Err(PortError::internal(format!(
            "unknown submission_status '{other}' in visits table"
        ))),
    }
}

fn parse_charge_type(text: &str) -> Result<ChargeType, PortError> {
    match text {
        "first" => Ok(ChargeType::First),
        "follow" => Ok(ChargeType::Follow),
        other => Err(PortError::internal(format!(
            "unknown charge_type '{other}' in visits table"
        ))),
    }
}

impl TryFrom<VisitRow> for Visit {
    type Error = PortError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let nric = row
            .nric
            .as_deref()
            .map(Nric::parse)
            .transpose()
            .map_err(|e| PortError::internal(format!("bad nric in visits table: {e}")))?;
        let charge_type = row
            .charge_type
            .as_deref()
            .map(parse_charge_type)
            .transpose()?;
        let medicines = serde_json::from_value(row.medicines)
            .map_err(|e| PortError::internal(format!("bad medicines json: {e}")))?;

        Ok(Visit {
            id: VisitId::from(row.id),
            patient_name: row.patient_name,
            visit_date: row.visit_date,
            pay_type: row.pay_type,
            nric,
            clinic_record_number: row.clinic_record_number,
            diagnosis_text: row.diagnosis_text,
            diagnosis_code: row.diagnosis_code,
            charge_type,
            mc_days: row.mc_days.map(|d| d.max(0) as u32),
            mc_start_date: row.mc_start_date,
            medicines,
            treatment_summary: row.treatment_summary,
            details: DetailsBlock {
                status: parse_details_status(&row.details_status)?,
                attempts: row.details_attempts.max(0) as u32,
                last_attempt_at: row.details_last_attempt_at,
                error: row.details_error,
                sources: row.details_sources,
            },
            submission: SubmissionBlock {
                submitted_at: row.submitted_at,
                status: parse_submission_status(&row.submission_status)?,
                portal: row.submission_portal,
                metadata: row.submission_metadata,
                error: row.submission_error,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
