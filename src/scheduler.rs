//! The scheduler: claims jobs, dispatches stage handlers, chains successors.
//!
//! One invocation of [`Scheduler::run_until_idle`] drains the queue and
//! returns — nothing busy-polls; a fresh invocation resumes later. Several
//! schedulers may share one store: the store's atomic claim is the only
//! synchronization between them. Every handler error is caught here and
//! mapped to the retry policy; none crosses the loop.

use std::time::Duration;

use tokio::time::sleep;

use crate::stages::{StageContext, StageError};
use crate::store::{JobPayload, JobStatus, StoreError};
use crate::ui::{self, RunProgress};

/// Outcome counts for one scheduler invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u32,
    pub retried: u32,
    pub failed: u32,
}

pub struct Scheduler {
    ctx: StageContext,
    progress: Option<RunProgress>,
}

impl Scheduler {
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx,
            progress: None,
        }
    }

    pub fn with_progress(ctx: StageContext, progress: RunProgress) -> Self {
        Self {
            ctx,
            progress: Some(progress),
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Enqueue the root COLLECT job for a topic. This is the external
    /// trigger interface; observers poll the store snapshot for progress.
    pub fn enqueue_root(
        &self,
        topic: &str,
        providers: Vec<String>,
        per_provider_limit: usize,
    ) -> Result<String, StoreError> {
        self.ctx.store.enqueue(
            JobPayload::Collect {
                topic: topic.to_string(),
                providers,
                per_provider_limit,
            },
            0,
        )
    }

    /// Claim and execute jobs until the queue has no PENDING work left.
    pub async fn run_until_idle(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        while let Some(job) = self.ctx.store.claim_next() {
            if let Some(p) = &self.progress {
                p.stage(job.stage());
            }

            match self.ctx.handle(&job.payload).await {
                Ok(successor) => {
                    self.mark(self.ctx.store.complete(&job.id));
                    summary.completed += 1;
                    if let Some(payload) = successor {
                        // A handler producing an unenqueueable successor is
                        // an internal invariant breach, surfaced loudly.
                        if let Err(e) = self.ctx.store.enqueue(payload, job.priority) {
                            ui::warn(&format!("successor rejected: {e}"));
                            summary.failed += 1;
                        }
                    }
                }
                Err(StageError::Citation { source, augmented }) => {
                    let status = self.ctx.store.retry_with_payload(
                        &job.id,
                        &source.to_string(),
                        *augmented,
                    );
                    self.note_retry(&job.id, status, &source.to_string(), &mut summary)
                        .await;
                }
                Err(StageError::Fatal(msg)) => {
                    self.mark(self.ctx.store.fail(&job.id, &msg));
                    summary.failed += 1;
                }
                Err(StageError::Transient(msg)) => {
                    let status = self.ctx.store.retry_or_fail(&job.id, &msg);
                    self.note_retry(&job.id, status, &msg, &mut summary).await;
                }
            }
        }

        if let Some(p) = &self.progress {
            p.complete(&summary);
        }
        summary
    }

    async fn note_retry(
        &self,
        job_id: &str,
        status: Result<JobStatus, StoreError>,
        reason: &str,
        summary: &mut RunSummary,
    ) {
        match status {
            Ok(JobStatus::Pending) => {
                summary.retried += 1;
                if let Some(job) = self.ctx.store.get(job_id) {
                    if let Some(p) = &self.progress {
                        p.retry(job.stage(), job.attempts, job.max_retries, reason);
                    }
                    let delay = self.ctx.config.retry_delay_ms(job.attempts);
                    if delay > 0 {
                        sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
            Ok(_) => summary.failed += 1,
            Err(e) => {
                ui::warn(&format!("store rejected retry for {job_id}: {e}"));
                summary.failed += 1;
            }
        }
    }

    fn mark(&self, result: Result<(), StoreError>) {
        if let Err(e) = result {
            ui::warn(&format!("store operation failed: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::completion::types::{CompletionResponse, ContentBlock, Usage};
    use crate::completion::{
        CompletionBackend, CompletionError, CompletionRequest, OfflineBackend,
    };
    use crate::config::MonographConfig;
    use crate::model::{Candidate, Confidence, DiversityStats, Reading, SelectionResult};
    use crate::providers::{registry_from, ProviderRegistry, SearchProvider, StaticProvider};
    use crate::store::{JobStore, Stage};

    fn quiet_config(max_retries: u32) -> MonographConfig {
        MonographConfig {
            max_retries,
            base_delay_ms: 0,
            ..MonographConfig::default()
        }
    }

    fn scheduler_with(
        providers: ProviderRegistry,
        completion: Arc<dyn CompletionBackend>,
        max_retries: u32,
    ) -> Scheduler {
        Scheduler::new(StageContext {
            store: Arc::new(JobStore::new(max_retries)),
            artifacts: Arc::new(ArtifactStore::new()),
            providers,
            completion,
            config: quiet_config(max_retries),
        })
    }

    #[tokio::test]
    async fn full_pipeline_runs_offline_to_publication() {
        let providers = registry_from(vec![
            Arc::new(StaticProvider::demo("arxiv", 6)) as Arc<dyn SearchProvider>,
            Arc::new(StaticProvider::demo("crossref", 6)),
            Arc::new(StaticProvider::demo("ssrn", 6)),
        ]);
        let scheduler = scheduler_with(providers, Arc::new(OfflineBackend), 3);

        scheduler
            .enqueue_root(
                "sparse attention mechanisms",
                vec!["arxiv".into(), "crossref".into(), "ssrn".into()],
                6,
            )
            .unwrap();
        let summary = scheduler.run_until_idle().await;

        // One job per stage, all successful.
        assert_eq!(summary.completed, 7);
        assert_eq!(summary.failed, 0);

        let jobs = scheduler.context().store.snapshot();
        assert_eq!(jobs.len(), 7);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Done));

        let stages: Vec<Stage> = jobs.iter().map(|j| j.stage()).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Collect,
                Stage::Enrich,
                Stage::Select,
                Stage::Extract,
                Stage::Synthesize,
                Stage::Render,
                Stage::Publish
            ]
        );

        // The rendered document ended up published.
        let rendered_id = jobs
            .iter()
            .find_map(|j| match &j.payload {
                JobPayload::Publish { rendered_id } => Some(rendered_id.clone()),
                _ => None,
            })
            .expect("publish job present");
        let doc = scheduler.context().artifacts.rendered(&rendered_id).unwrap();
        assert!(doc.published);
        assert!(doc.markdown.contains("## References"));
    }

    struct AlwaysFailing;

    #[async_trait]
    impl CompletionBackend for AlwaysFailing {
        async fn complete(
            &self,
            _req: &CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            Err(CompletionError::Api {
                status: 500,
                message: "backend down".into(),
            })
        }
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_ends_in_failed() {
        // Scenario D: max_retries = 2, three consecutive failures.
        let scheduler = scheduler_with(ProviderRegistry::new(), Arc::new(AlwaysFailing), 2);
        let ids = scheduler
            .context()
            .artifacts
            .insert_candidates(vec![Candidate::raw("arxiv", 2023, 1, "x".repeat(400))]);
        let job_id = scheduler
            .context()
            .store
            .enqueue(
                JobPayload::Enrich {
                    topic: "t".into(),
                    candidate_ids: ids,
                },
                0,
            )
            .unwrap();

        let summary = scheduler.run_until_idle().await;

        assert_eq!(summary.completed, 0);
        assert_eq!(summary.retried, 2);
        assert_eq!(summary.failed, 1);

        let job = scheduler.context().store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert!(job.last_error.is_some());
    }

    /// Refuses to cite until the augmented instruction shows up in the
    /// prompt, then cites properly.
    struct RelentsWhenPushed;

    #[async_trait]
    impl CompletionBackend for RelentsWhenPushed {
        async fn complete(
            &self,
            req: &CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            let text = if req.prompt().contains("Additional requirement") {
                r#"{"title": "Brief", "narrative": "The effect is robust [REF-1]."}"#
            } else {
                r#"{"title": "Brief", "narrative": "The effect is robust."}"#
            };
            Ok(CompletionResponse {
                id: "mock".into(),
                content: vec![ContentBlock {
                    content_type: "text".into(),
                    text: text.into(),
                }],
                model: "mock".into(),
                stop_reason: Some("end_turn".into()),
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn citation_failure_re_drives_the_same_stage_with_stronger_prompt() {
        let scheduler = scheduler_with(ProviderRegistry::new(), Arc::new(RelentsWhenPushed), 3);
        let ids = scheduler
            .context()
            .artifacts
            .insert_candidates(vec![Candidate::raw("arxiv", 2023, 1, "x".repeat(400))]);
        let selection = SelectionResult {
            candidate_ids: ids.clone(),
            stats: DiversityStats::default(),
        };
        let readings = vec![Reading {
            candidate_id: ids[0].clone(),
            claims: vec!["claim".into()],
            methods: "m".into(),
            results: "r".into(),
            limitations: "l".into(),
            confidence: Confidence::High,
        }];
        let job_id = scheduler
            .context()
            .store
            .enqueue(
                JobPayload::Synthesize {
                    topic: "t".into(),
                    selection,
                    readings,
                    extra_instruction: None,
                },
                0,
            )
            .unwrap();

        let summary = scheduler.run_until_idle().await;

        // One citation retry, then synthesize, render and publish complete.
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);

        let job = scheduler.context().store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.attempts, 1);
        match &job.payload {
            JobPayload::Synthesize {
                extra_instruction, ..
            } => assert!(extra_instruction.is_some()),
            other => panic!("payload changed stage: {:?}", other.stage()),
        }
    }

    #[tokio::test]
    async fn fatal_error_fails_without_consuming_retries() {
        let scheduler = scheduler_with(ProviderRegistry::new(), Arc::new(OfflineBackend), 3);
        let job_id = scheduler
            .context()
            .store
            .enqueue(
                JobPayload::Enrich {
                    topic: "t".into(),
                    candidate_ids: vec!["ghost".into()],
                },
                0,
            )
            .unwrap();

        let summary = scheduler.run_until_idle().await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retried, 0);
        let job = scheduler.context().store.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn empty_queue_returns_immediately() {
        let scheduler = scheduler_with(ProviderRegistry::new(), Arc::new(OfflineBackend), 3);
        let summary = scheduler.run_until_idle().await;
        assert_eq!(summary, RunSummary::default());
    }
}
