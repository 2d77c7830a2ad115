//! In-memory port implementations
//!
//! Store adapters backed by hash maps, enforcing the same state-machine
//! rules as the PostgreSQL repositories so integration tests exercise real
//! transition failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use core_kernel::{DomainPort, Nric, PortError, RunId, VisitId};
use domain_batch::{Run, RunPatch, RunStore};
use domain_visit::{DetailsUpdate, SubmissionRecord, SubmissionStatus, Visit, VisitQuery, VisitStore};

/// In-memory visit store
#[derive(Default)]
pub struct MemoryVisitStore {
    visits: Mutex<HashMap<VisitId, Visit>>,
}

impl MemoryVisitStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds a visit row
    pub async fn insert(&self, visit: Visit) {
        self.visits.lock().await.insert(visit.id, visit);
    }

    /// Reads a visit back without going through the port
    pub async fn snapshot(&self, id: VisitId) -> Option<Visit> {
        self.visits.lock().await.get(&id).cloned()
    }

    async fn mutate<F>(&self, id: VisitId, f: F) -> Result<(), PortError>
    where
        F: FnOnce(&mut Visit) -> Result<(), PortError>,
    {
        let mut visits = self.visits.lock().await;
        let visit = visits
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("Visit", id))?;
        f(visit)
    }
}

impl DomainPort for MemoryVisitStore {}

#[async_trait]
impl VisitStore for MemoryVisitStore {
    async fn get(&self, id: VisitId) -> Result<Visit, PortError> {
        self.visits
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Visit", id))
    }

    async fn find(&self, query: &VisitQuery) -> Result<Vec<Visit>, PortError> {
        let visits = self.visits.lock().await;
        let mut matched: Vec<Visit> = visits
            .values()
            .filter(|v| query.ids.is_empty() || query.ids.contains(&v.id))
            .filter(|v| {
                query.pay_type_patterns.is_empty()
                    || query.pay_type_patterns.iter().any(|p| {
                        v.pay_type.to_lowercase().contains(&p.to_lowercase())
                    })
            })
            .filter(|v| query.date_from.is_none_or(|d| v.visit_date >= d))
            .filter(|v| query.date_to.is_none_or(|d| v.visit_date <= d))
            .filter(|v| query.details_status.is_none_or(|s| v.details.status == s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.visit_date
                .cmp(&a.visit_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn set_nric(&self, id: VisitId, nric: &Nric) -> Result<(), PortError> {
        self.mutate(id, |visit| {
            visit.set_nric(nric.clone());
            Ok(())
        })
        .await
    }

    async fn begin_details_attempt(&self, id: VisitId) -> Result<(), PortError> {
        self.mutate(id, |visit| {
            visit
                .begin_details_attempt()
                .map_err(|e| PortError::validation(e.to_string()))
        })
        .await
    }

    async fn complete_details(&self, id: VisitId, update: DetailsUpdate) -> Result<(), PortError> {
        self.mutate(id, |visit| {
            visit
                .complete_details(update)
                .map_err(|e| PortError::validation(e.to_string()))
        })
        .await
    }

    async fn fail_details(&self, id: VisitId, error: &str) -> Result<(), PortError> {
        self.mutate(id, |visit| {
            visit
                .fail_details(error)
                .map_err(|e| PortError::validation(e.to_string()))
        })
        .await
    }

    async fn record_submission(&self, id: VisitId, record: SubmissionRecord) -> Result<(), PortError> {
        self.mutate(id, |visit| {
            visit.submission.status = if record.submitted {
                SubmissionStatus::Submitted
            } else {
                SubmissionStatus::Draft
            };
            visit.submission.portal = Some(record.portal);
            visit.submission.metadata = Some(record.metadata);
            visit.submission.submitted_at = Some(record.at);
            visit.submission.error = None;
            Ok(())
        })
        .await
    }

    async fn record_submission_error(
        &self,
        id: VisitId,
        portal: Option<&str>,
        error: &str,
    ) -> Result<(), PortError> {
        self.mutate(id, |visit| {
            visit.submission.status = SubmissionStatus::Error;
            if let Some(portal) = portal {
                visit.submission.portal = Some(portal.to_string());
            }
            visit.submission.error = Some(error.to_string());
            Ok(())
        })
        .await
    }
}

/// In-memory run store
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<RunId, Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reads a run back without going through the port
    pub async fn snapshot(&self, id: RunId) -> Option<Run> {
        self.runs.lock().await.get(&id).cloned()
    }

    /// All runs, most recent first
    pub async fn all(&self) -> Vec<Run> {
        let runs = self.runs.lock().await;
        let mut all: Vec<Run> = runs.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }
}

impl DomainPort for MemoryRunStore {}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: &Run) -> Result<(), PortError> {
        self.runs.lock().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn update(&self, id: RunId, patch: RunPatch) -> Result<(), PortError> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("Run", id))?;
        if let Some(status) = patch.status {
            run.status = status;
        }
        if let Some(total) = patch.total_records {
            run.total_records = total;
        }
        if let Some(completed) = patch.completed_count {
            run.completed_count = completed;
        }
        if let Some(failed) = patch.failed_count {
            run.failed_count = failed;
        }
        if let Some(skipped) = patch.skipped_count {
            run.skipped_count = skipped;
        }
        if let Some(finished_at) = patch.finished_at {
            run.finished_at = Some(finished_at);
        }
        if let Some(message) = patch.error_message {
            run.error_message = Some(message);
        }
        Ok(())
    }

    async fn get(&self, id: RunId) -> Result<Run, PortError> {
        self.runs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Run", id))
    }
}
