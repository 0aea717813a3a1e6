//! One handler per pipeline stage.
//!
//! Every handler consumes the shared stores plus exactly one external
//! collaborator and returns the payload of its successor job — `None` only
//! for the terminal publish stage. Handlers never touch job lifecycle
//! state; the scheduler owns claim/complete/retry.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::citations::{self, CitationError};
use crate::completion::{CompletionBackend, CompletionError, CompletionRequest};
use crate::config::MonographConfig;
use crate::extract::{self, ExtractError};
use crate::model::{Candidate, Reading, SelectionResult, SynthesisOutput};
use crate::providers::ProviderRegistry;
use crate::selector;
use crate::store::{JobPayload, JobStore};
use crate::ui;

/// How a stage failure should be handled by the scheduler.
#[derive(Debug, Error)]
pub enum StageError {
    /// The citation guard rejected the synthesis. Carries the payload to
    /// re-drive the same stage with a strengthened instruction.
    #[error("citation validation failed: {source}")]
    Citation {
        source: CitationError,
        augmented: Box<JobPayload>,
    },

    /// Structurally unfixable failure; retrying cannot help.
    #[error("{0}")]
    Fatal(String),

    /// Transient collaborator failure; consumes the retry budget.
    #[error("{0}")]
    Transient(String),
}

impl From<ArtifactError> for StageError {
    fn from(err: ArtifactError) -> Self {
        // A payload referencing a missing artifact is malformed;
        // no number of retries will materialize the record.
        StageError::Fatal(err.to_string())
    }
}

impl From<CompletionError> for StageError {
    fn from(err: CompletionError) -> Self {
        StageError::Transient(err.to_string())
    }
}

impl From<ExtractError> for StageError {
    fn from(err: ExtractError) -> Self {
        StageError::Transient(err.to_string())
    }
}

/// Everything a stage handler needs: the two stores, the provider registry,
/// the completion backend and the tuning parameters.
pub struct StageContext {
    pub store: Arc<JobStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub providers: ProviderRegistry,
    pub completion: Arc<dyn CompletionBackend>,
    pub config: MonographConfig,
}

/// Raw LLM response shape for enrichment.
#[derive(Debug, Deserialize)]
struct LlmScores {
    scores: Vec<LlmScore>,
}

#[derive(Debug, Deserialize)]
struct LlmScore {
    candidate_id: String,
    quality_score: u32,
    novelty_score: u32,
}

/// Raw LLM response shape for synthesis.
#[derive(Debug, Deserialize)]
struct LlmSynthesis {
    title: String,
    narrative: String,
}

impl StageContext {
    /// Dispatch a payload to its handler. Exhaustive over stages.
    pub async fn handle(&self, payload: &JobPayload) -> Result<Option<JobPayload>, StageError> {
        match payload {
            JobPayload::Collect {
                topic,
                providers,
                per_provider_limit,
            } => self.collect(topic, providers, *per_provider_limit).await,
            JobPayload::Enrich {
                topic,
                candidate_ids,
            } => self.enrich(topic, candidate_ids).await,
            JobPayload::Select {
                topic,
                candidate_ids,
            } => self.select(topic, candidate_ids),
            JobPayload::Extract { topic, selection } => self.extract(topic, selection).await,
            JobPayload::Synthesize {
                topic,
                selection,
                readings,
                extra_instruction,
            } => {
                self.synthesize(topic, selection, readings, extra_instruction.as_deref())
                    .await
            }
            JobPayload::Render {
                topic,
                synthesis,
                selection,
            } => self.render(topic, synthesis, selection),
            JobPayload::Publish { rendered_id } => self.publish(rendered_id),
        }
    }

    /// COLLECT: query each requested provider, isolating per-provider
    /// failures. Fails only when no provider produced anything.
    async fn collect(
        &self,
        topic: &str,
        provider_keys: &[String],
        per_provider_limit: usize,
    ) -> Result<Option<JobPayload>, StageError> {
        let mut collected: Vec<Candidate> = Vec::new();
        let mut resolved_any = false;

        for key in provider_keys {
            let Some(provider) = self.providers.get(key) else {
                ui::warn(&format!("provider {key} is not registered, skipping"));
                continue;
            };
            resolved_any = true;
            match provider.search(topic, per_provider_limit).await {
                Ok(items) => collected.extend(items),
                Err(err) => ui::warn(&format!("provider {key} failed, skipping: {err}")),
            }
        }

        if !resolved_any {
            return Err(StageError::Fatal(
                "no requested provider is registered".into(),
            ));
        }
        if collected.is_empty() {
            return Err(StageError::Transient(
                "every provider failed or returned nothing".into(),
            ));
        }

        let candidate_ids = self.artifacts.insert_candidates(collected);
        Ok(Some(JobPayload::Enrich {
            topic: topic.to_string(),
            candidate_ids,
        }))
    }

    /// ENRICH: one completion call normalizing scores for the whole
    /// candidate set, then persist the scores.
    async fn enrich(
        &self,
        topic: &str,
        candidate_ids: &[String],
    ) -> Result<Option<JobPayload>, StageError> {
        let candidates = self.artifacts.candidates_by_ids(candidate_ids)?;

        let listing: String = candidates
            .iter()
            .map(|c| {
                format!(
                    "- id: {} | provider: {} | year: {} | citations: {}\n",
                    c.id, c.provider, c.year, c.citation_count
                )
            })
            .collect();
        let prompt = format!(
            "Normalize the metadata for these research candidates. \
             Respond with ONLY valid JSON, no other text.\n\
             \n\
             Format:\n\
             {{\"scores\": [{{\"candidate_id\": \"<id>\", \"quality_score\": <0-100>, \
             \"novelty_score\": <0-100>}}]}}\n\
             \n\
             Rules:\n\
             - score every candidate listed below exactly once\n\
             - quality reflects venue, citations and methodological rigor\n\
             - novelty reflects how recent and original the contribution is\n\
             \n\
             Topic: {topic}\n\
             Candidates:\n{listing}"
        );

        let req = CompletionRequest::user(&self.config.model, 2048, prompt);
        let response = self.completion.complete(&req).await?;
        let parsed: LlmScores = serde_json::from_str(&response.text())
            .map_err(|e| StageError::Transient(format!("unparseable enrichment response: {e}")))?;

        for score in parsed.scores {
            // Ids the model invented are dropped; uncovered candidates keep
            // their zeroed scores and simply rank low at selection.
            if candidate_ids.contains(&score.candidate_id)
                && self
                    .artifacts
                    .apply_scores(&score.candidate_id, score.quality_score, score.novelty_score)
                    .is_err()
            {
                ui::warn(&format!(
                    "enrichment scored unknown candidate {}",
                    score.candidate_id
                ));
            }
        }

        Ok(Some(JobPayload::Select {
            topic: topic.to_string(),
            candidate_ids: candidate_ids.to_vec(),
        }))
    }

    /// SELECT: pure, no external call. Deficits are logged, never fatal.
    fn select(
        &self,
        topic: &str,
        candidate_ids: &[String],
    ) -> Result<Option<JobPayload>, StageError> {
        let candidates = self.artifacts.candidates_by_ids(candidate_ids)?;
        let selection = selector::select(&candidates, &self.config.selector);

        for deficit in &selection.stats.deficits {
            ui::warn(&format!("diversity deficit: {deficit}"));
        }
        if selection.is_empty() {
            return Err(StageError::Fatal("selection came back empty".into()));
        }

        Ok(Some(JobPayload::Extract {
            topic: topic.to_string(),
            selection,
        }))
    }

    /// EXTRACT: bounded-concurrency batch extraction over the selection.
    async fn extract(
        &self,
        topic: &str,
        selection: &SelectionResult,
    ) -> Result<Option<JobPayload>, StageError> {
        let candidates = self.artifacts.candidates_by_ids(&selection.candidate_ids)?;
        let readings =
            extract::extract_readings(self.completion.as_ref(), topic, &candidates, &self.config.batcher)
                .await?;

        Ok(Some(JobPayload::Synthesize {
            topic: topic.to_string(),
            selection: selection.clone(),
            readings,
            extra_instruction: None,
        }))
    }

    /// SYNTHESIZE: one completion call, then the citation guard. A guard
    /// rejection re-drives this same stage with a strengthened instruction
    /// instead of restarting the pipeline.
    async fn synthesize(
        &self,
        topic: &str,
        selection: &SelectionResult,
        readings: &[Reading],
        extra_instruction: Option<&str>,
    ) -> Result<Option<JobPayload>, StageError> {
        let mut sources = String::new();
        for (i, candidate_id) in selection.candidate_ids.iter().enumerate() {
            let n = i + 1;
            let Some(reading) = readings.iter().find(|r| &r.candidate_id == candidate_id) else {
                continue;
            };
            sources.push_str(&format!(
                "[REF-{n}] claims: {} | methods: {} | results: {} | confidence: {}\n",
                reading.claims.join("; "),
                reading.methods,
                reading.results,
                reading.confidence
            ));
        }

        let extra = extra_instruction
            .map(|s| format!("\nAdditional requirement: {s}\n"))
            .unwrap_or_default();
        let prompt = format!(
            "Write a research brief. Respond with ONLY valid JSON, no other text.\n\
             \n\
             Format:\n\
             {{\"title\": \"<title>\", \"narrative\": \"<multi-paragraph brief>\"}}\n\
             \n\
             Rules:\n\
             - cite sources inline with their [REF-n] marker exactly as numbered below\n\
             - only cite markers [REF-1] through [REF-{count}]\n\
             - every major statement must be backed by at least one marker\n\
             {extra}\
             \n\
             Topic: {topic}\n\
             Sources:\n{sources}",
            count = selection.len()
        );

        let req = CompletionRequest::user(&self.config.model, 4096, prompt);
        let response = self.completion.complete(&req).await?;
        let parsed: LlmSynthesis = serde_json::from_str(&response.text())
            .map_err(|e| StageError::Transient(format!("unparseable synthesis response: {e}")))?;

        let output = SynthesisOutput {
            title: parsed.title,
            narrative: parsed.narrative,
        };

        match citations::verify(&output, selection.len(), &self.config.citations) {
            Ok(report) => {
                ui::info(&format!(
                    "citations verified: {} markers, {} distinct",
                    report.total_markers, report.distinct_markers
                ));
                Ok(Some(JobPayload::Render {
                    topic: topic.to_string(),
                    synthesis: output,
                    selection: selection.clone(),
                }))
            }
            Err(source) => {
                let requirement = format!(
                    "the previous draft was rejected ({source}); cite only markers \
                     [REF-1] through [REF-{}] and cite enough distinct sources for \
                     the narrative's length",
                    selection.len()
                );
                let augmented = JobPayload::Synthesize {
                    topic: topic.to_string(),
                    selection: selection.clone(),
                    readings: readings.to_vec(),
                    extra_instruction: Some(requirement),
                };
                Err(StageError::Citation {
                    source,
                    augmented: Box::new(augmented),
                })
            }
        }
    }

    /// RENDER: pure formatting of the verified synthesis plus a numbered
    /// reference list.
    fn render(
        &self,
        topic: &str,
        synthesis: &SynthesisOutput,
        selection: &SelectionResult,
    ) -> Result<Option<JobPayload>, StageError> {
        let candidates = self.artifacts.candidates_by_ids(&selection.candidate_ids)?;

        let mut markdown = format!("# {}\n\n{}\n\n## References\n\n", synthesis.title, synthesis.narrative);
        for (i, c) in candidates.iter().enumerate() {
            markdown.push_str(&format!(
                "{}. {} ({}) — quality {}, novelty {}, {} citations\n",
                i + 1,
                c.provider,
                c.year,
                c.quality_score,
                c.novelty_score,
                c.citation_count
            ));
        }

        let rendered_id = self
            .artifacts
            .insert_rendered(topic, &synthesis.title, markdown);
        Ok(Some(JobPayload::Publish { rendered_id }))
    }

    /// PUBLISH: terminal stage, no successor.
    fn publish(&self, rendered_id: &str) -> Result<Option<JobPayload>, StageError> {
        self.artifacts.publish(rendered_id)?;
        Ok(None)
    }
}
