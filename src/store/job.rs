//! Job records for the pipeline queue.
//!
//! A [`Job`] carries a strongly-typed [`JobPayload`] — one variant per
//! pipeline stage — so the scheduler dispatches with an exhaustive match
//! instead of inspecting a loosely-typed document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Reading, SelectionResult, SynthesisOutput};

/// The seven pipeline stages, in chaining order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Collect,
    Enrich,
    Select,
    Extract,
    Synthesize,
    Render,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Collect => "COLLECT",
            Stage::Enrich => "ENRICH",
            Stage::Select => "SELECT",
            Stage::Extract => "EXTRACT",
            Stage::Synthesize => "SYNTHESIZE",
            Stage::Render => "RENDER",
            Stage::Publish => "PUBLISH",
        };
        write!(f, "{s}")
    }
}

/// Stage-specific payload. Successor payloads carry ids and small summaries,
/// never full candidate bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPayload {
    Collect {
        topic: String,
        providers: Vec<String>,
        per_provider_limit: usize,
    },
    Enrich {
        topic: String,
        candidate_ids: Vec<String>,
    },
    Select {
        topic: String,
        candidate_ids: Vec<String>,
    },
    Extract {
        topic: String,
        selection: SelectionResult,
    },
    Synthesize {
        topic: String,
        selection: SelectionResult,
        readings: Vec<Reading>,
        /// Appended to the prompt on citation-guard retries.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_instruction: Option<String>,
    },
    Render {
        topic: String,
        synthesis: SynthesisOutput,
        selection: SelectionResult,
    },
    Publish {
        rendered_id: String,
    },
}

impl JobPayload {
    /// The stage this payload belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            JobPayload::Collect { .. } => Stage::Collect,
            JobPayload::Enrich { .. } => Stage::Enrich,
            JobPayload::Select { .. } => Stage::Select,
            JobPayload::Extract { .. } => Stage::Extract,
            JobPayload::Synthesize { .. } => Stage::Synthesize,
            JobPayload::Render { .. } => Stage::Render,
            JobPayload::Publish { .. } => Stage::Publish,
        }
    }

    /// Structural validation applied at enqueue time. A payload that fails
    /// here can never succeed, so schema violations are not retried.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            JobPayload::Collect {
                topic,
                providers,
                per_provider_limit,
            } => {
                if topic.trim().is_empty() {
                    return Err("COLLECT payload has an empty topic".into());
                }
                if providers.is_empty() {
                    return Err("COLLECT payload has no providers".into());
                }
                if *per_provider_limit == 0 {
                    return Err("COLLECT payload has per_provider_limit = 0".into());
                }
            }
            JobPayload::Enrich { topic, candidate_ids }
            | JobPayload::Select { topic, candidate_ids } => {
                if topic.trim().is_empty() {
                    return Err(format!("{} payload has an empty topic", self.stage()));
                }
                if candidate_ids.is_empty() {
                    return Err(format!("{} payload has no candidate ids", self.stage()));
                }
            }
            JobPayload::Extract { topic, selection } => {
                if topic.trim().is_empty() {
                    return Err("EXTRACT payload has an empty topic".into());
                }
                if selection.is_empty() {
                    return Err("EXTRACT payload has an empty selection".into());
                }
            }
            JobPayload::Synthesize {
                topic,
                selection,
                readings,
                ..
            } => {
                if topic.trim().is_empty() {
                    return Err("SYNTHESIZE payload has an empty topic".into());
                }
                if selection.is_empty() {
                    return Err("SYNTHESIZE payload has an empty selection".into());
                }
                if readings.is_empty() {
                    return Err("SYNTHESIZE payload has no readings".into());
                }
            }
            JobPayload::Render { topic, synthesis, .. } => {
                if topic.trim().is_empty() {
                    return Err("RENDER payload has an empty topic".into());
                }
                if synthesis.narrative.trim().is_empty() {
                    return Err("RENDER payload has an empty narrative".into());
                }
            }
            JobPayload::Publish { rendered_id } => {
                if rendered_id.trim().is_empty() {
                    return Err("PUBLISH payload has an empty rendered id".into());
                }
            }
        }
        Ok(())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// A single task in the pipeline queue.
///
/// Status transitions only PENDING→RUNNING→{DONE|FAILED|PENDING}; `attempts`
/// never exceeds `max_retries`. The store enforces both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Higher claims sooner; ties broken by oldest `created_at`.
    pub priority: i32,
    pub attempts: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(payload: JobPayload, priority: i32, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            status: JobStatus::Pending,
            priority,
            attempts: 0,
            max_retries,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.payload.stage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiversityStats;

    fn collect_payload() -> JobPayload {
        JobPayload::Collect {
            topic: "transformer interpretability".into(),
            providers: vec!["arxiv".into(), "crossref".into()],
            per_provider_limit: 10,
        }
    }

    #[test]
    fn new_job_defaults() {
        let job = Job::new(collect_payload(), 0, 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.stage(), Stage::Collect);
        assert!(job.last_error.is_none());
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn payload_stage_mapping_is_exhaustive() {
        assert_eq!(collect_payload().stage(), Stage::Collect);
        let p = JobPayload::Publish {
            rendered_id: "r-1".into(),
        };
        assert_eq!(p.stage(), Stage::Publish);
    }

    #[test]
    fn collect_payload_validation() {
        assert!(collect_payload().validate().is_ok());

        let empty_topic = JobPayload::Collect {
            topic: "  ".into(),
            providers: vec!["arxiv".into()],
            per_provider_limit: 10,
        };
        assert!(empty_topic.validate().is_err());

        let no_providers = JobPayload::Collect {
            topic: "t".into(),
            providers: vec![],
            per_provider_limit: 10,
        };
        assert!(no_providers.validate().is_err());
    }

    #[test]
    fn extract_payload_rejects_empty_selection() {
        let p = JobPayload::Extract {
            topic: "t".into(),
            selection: SelectionResult {
                candidate_ids: vec![],
                stats: DiversityStats::default(),
            },
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let json = serde_json::to_string(&collect_payload()).unwrap();
        assert!(json.contains("\"type\":\"COLLECT\""));
        let parsed: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.stage(), Stage::Collect);
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = Job::new(collect_payload(), 5, 2);
        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.priority, 5);
        assert_eq!(parsed.max_retries, 2);
        assert_eq!(parsed.status, JobStatus::Pending);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Collect.to_string(), "COLLECT");
        assert_eq!(Stage::Synthesize.to_string(), "SYNTHESIZE");
        assert_eq!(Stage::Publish.to_string(), "PUBLISH");
    }
}
