//! Parallel extraction of structured readings from selected candidates.
//!
//! Candidates are processed in sequential batches; within a batch every
//! candidate gets its own concurrent completion call bounded by a per-item
//! timeout. A slow or failing item costs at most one timeout for its batch
//! and is recorded as a low-confidence placeholder — it never stalls the
//! rest. Only a batch run with zero usable readings is an error.

use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::timeout;

use crate::completion::{CompletionBackend, CompletionRequest};
use crate::model::{Candidate, Confidence, Reading};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction produced zero usable readings from {attempted} candidates")]
    NoUsableReadings { attempted: usize },
}

/// Concurrency and timeout policy for the batcher.
#[derive(Debug, Clone, Deserialize)]
pub struct BatcherConfig {
    /// Candidates extracted concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bound on each extraction call.
    #[serde(default = "default_per_item_timeout_ms")]
    pub per_item_timeout_ms: u64,
    /// Candidates with shorter content are skipped before any call.
    #[serde(default = "default_min_content_len")]
    pub min_content_len: usize,
    /// Model used for extraction calls.
    #[serde(default = "default_extract_model")]
    pub model: String,
}

fn default_batch_size() -> usize {
    10
}

fn default_per_item_timeout_ms() -> u64 {
    5_000
}

fn default_min_content_len() -> usize {
    300
}

fn default_extract_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            per_item_timeout_ms: default_per_item_timeout_ms(),
            min_content_len: default_min_content_len(),
            model: default_extract_model(),
        }
    }
}

impl BatcherConfig {
    pub fn per_item_timeout(&self) -> Duration {
        Duration::from_millis(self.per_item_timeout_ms)
    }
}

/// Raw LLM response shape for one extraction.
#[derive(Debug, Deserialize)]
struct LlmReading {
    claims: Vec<String>,
    #[serde(default)]
    methods: String,
    #[serde(default)]
    results: String,
    #[serde(default)]
    limitations: String,
    #[serde(default)]
    confidence: Option<String>,
}

fn parse_confidence(s: Option<&str>) -> Confidence {
    match s.map(str::to_lowercase).as_deref() {
        Some("high") => Confidence::High,
        Some("low") => Confidence::Low,
        _ => Confidence::Medium,
    }
}

fn extraction_prompt(topic: &str, candidate: &Candidate) -> String {
    format!(
        "Extract structured findings from this source. \
         Respond with ONLY valid JSON, no other text.\n\
         \n\
         Format:\n\
         {{\"claims\": [\"<finding>\"], \"methods\": \"<how>\", \"results\": \"<what>\", \
         \"limitations\": \"<caveats>\", \"confidence\": \"<high|medium|low>\"}}\n\
         \n\
         Rules:\n\
         - claims must each be a single self-contained statement of evidence\n\
         - confidence reflects how directly the source supports its claims\n\
         \n\
         Topic: {topic}\n\
         Source text:\n{}",
        candidate.content
    )
}

/// Extract one candidate, mapping every failure mode to a low-confidence
/// placeholder so the batch always completes.
async fn extract_one(
    backend: &dyn CompletionBackend,
    topic: &str,
    candidate: &Candidate,
    cfg: &BatcherConfig,
) -> Reading {
    let req = CompletionRequest::user(&cfg.model, 1024, extraction_prompt(topic, candidate));

    let response = match timeout(cfg.per_item_timeout(), backend.complete(&req)).await {
        Ok(Ok(resp)) => resp,
        // Call error or timeout: skip this item, keep the batch going.
        Ok(Err(_)) | Err(_) => return Reading::unreadable(&candidate.id),
    };

    let Ok(parsed) = serde_json::from_str::<LlmReading>(&response.text()) else {
        return Reading::unreadable(&candidate.id);
    };
    if parsed.claims.is_empty() {
        return Reading::unreadable(&candidate.id);
    }

    Reading {
        candidate_id: candidate.id.clone(),
        claims: parsed.claims,
        methods: parsed.methods,
        results: parsed.results,
        limitations: parsed.limitations,
        confidence: parse_confidence(parsed.confidence.as_deref()),
    }
}

/// Run the batcher over `candidates` in order, returning one reading per
/// candidate (placeholders included). Fails only when not a single usable
/// reading was produced.
pub async fn extract_readings(
    backend: &dyn CompletionBackend,
    topic: &str,
    candidates: &[Candidate],
    cfg: &BatcherConfig,
) -> Result<Vec<Reading>, ExtractError> {
    let mut readings = Vec::with_capacity(candidates.len());

    for batch in candidates.chunks(cfg.batch_size.max(1)) {
        let calls = batch.iter().map(|candidate| async move {
            if candidate.content.len() < cfg.min_content_len {
                // Unusable input; do not spend a call on it.
                return Reading::unreadable(&candidate.id);
            }
            extract_one(backend, topic, candidate, cfg).await
        });
        readings.extend(join_all(calls).await);
    }

    if readings.iter().any(Reading::is_usable) {
        Ok(readings)
    } else {
        Err(ExtractError::NoUsableReadings {
            attempted: candidates.len(),
        })
    }
}
