//! The shared job queue.
//!
//! [`JobStore`] is the single shared mutable resource in the pipeline. All
//! mutation goes through `enqueue` / `claim_next` / `complete` /
//! `retry_or_fail`; each holds the store lock for the whole read-modify-write
//! so two workers can never claim the same job.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;

use super::job::{Job, JobPayload, JobStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Payload failed structural validation. Never retried: re-running a
    /// structurally invalid payload cannot fix it.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("job not found: {0}")]
    NotFound(String),

    /// A lifecycle operation was applied to a job in the wrong status,
    /// e.g. completing a job that is not RUNNING.
    #[error("job {id} is {status}, expected {expected}")]
    InvalidStatus {
        id: String,
        status: JobStatus,
        expected: JobStatus,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// In-memory job store with durable JSON snapshots.
pub struct JobStore {
    jobs: Mutex<HashMap<String, Job>>,
    default_max_retries: u32,
}

impl JobStore {
    pub fn new(default_max_retries: u32) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            default_max_retries,
        }
    }

    /// Insert a PENDING job. Fails with [`StoreError::Schema`] if the
    /// payload does not satisfy its stage's structural requirements.
    pub fn enqueue(&self, payload: JobPayload, priority: i32) -> Result<String, StoreError> {
        payload.validate().map_err(StoreError::Schema)?;
        let job = Job::new(payload, priority, self.default_max_retries);
        let id = job.id.clone();
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(id.clone(), job);
        Ok(id)
    }

    /// Atomically claim the PENDING job with the highest priority, ties
    /// broken by oldest `created_at`, then by id for determinism. The job
    /// transitions to RUNNING with `started_at` stamped before the lock is
    /// released, so concurrent claimers always see disjoint jobs.
    pub fn claim_next(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let next_id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|j| j.id.clone())?;

        let job = jobs.get_mut(&next_id)?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        Some(job.clone())
    }

    /// Transition RUNNING→DONE and stamp `finished_at`.
    pub fn complete(&self, id: &str) -> Result<(), StoreError> {
        self.with_running(id, |job| {
            job.status = JobStatus::Done;
            job.finished_at = Some(Utc::now());
        })
    }

    /// Transition a RUNNING job back to PENDING if retries remain, recording
    /// the error; otherwise mark it FAILED. `attempts` counts consumed
    /// retries and never exceeds `max_retries`.
    pub fn retry_or_fail(&self, id: &str, error: &str) -> Result<JobStatus, StoreError> {
        self.retry_inner(id, error, None)
    }

    /// Same bookkeeping as [`retry_or_fail`](Self::retry_or_fail) but
    /// replaces the payload — the citation-guard path, which re-drives the
    /// same stage with a strengthened instruction.
    pub fn retry_with_payload(
        &self,
        id: &str,
        error: &str,
        payload: JobPayload,
    ) -> Result<JobStatus, StoreError> {
        self.retry_inner(id, error, Some(payload))
    }

    fn retry_inner(
        &self,
        id: &str,
        error: &str,
        payload: Option<JobPayload>,
    ) -> Result<JobStatus, StoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if job.status != JobStatus::Running {
            return Err(StoreError::InvalidStatus {
                id: id.to_string(),
                status: job.status,
                expected: JobStatus::Running,
            });
        }

        job.last_error = Some(error.to_string());
        if job.attempts < job.max_retries {
            job.attempts += 1;
            if let Some(p) = payload {
                job.payload = p;
            }
            job.status = JobStatus::Pending;
            job.started_at = None;
        } else {
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
        }
        Ok(job.status)
    }

    /// Mark a RUNNING job FAILED immediately, bypassing the retry budget.
    /// Used for schema-class failures that retrying cannot fix.
    pub fn fail(&self, id: &str, error: &str) -> Result<(), StoreError> {
        self.with_running(id, |job| {
            job.last_error = Some(error.to_string());
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
        })
    }

    fn with_running<F>(&self, id: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if job.status != JobStatus::Running {
            return Err(StoreError::InvalidStatus {
                id: id.to_string(),
                status: job.status,
                expected: JobStatus::Running,
            });
        }
        mutate(job);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).cloned()
    }

    /// Read-only view for status observers, ordered by creation time.
    pub fn snapshot(&self) -> Vec<Job> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn pending_count(&self) -> usize {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.values()
            .filter(|j| j.status == JobStatus::Pending)
            .count()
    }

    /// Persist all jobs as a JSON snapshot.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let all = self.snapshot();
        let json = serde_json::to_string_pretty(&all)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reload a snapshot. Jobs left RUNNING by an interrupted worker are
    /// re-queued as PENDING so a fresh invocation resumes them.
    pub fn load_from(path: &Path, default_max_retries: u32) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        let mut all: Vec<Job> = serde_json::from_str(&contents)?;
        for job in &mut all {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.started_at = None;
            }
        }
        let store = Self::new(default_max_retries);
        {
            let mut jobs = store.jobs.lock().unwrap_or_else(|e| e.into_inner());
            for job in all {
                jobs.insert(job.id.clone(), job);
            }
        }
        Ok(store)
    }
}
