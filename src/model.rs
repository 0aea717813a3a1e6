//! Shared data shapes flowing through the pipeline.
//!
//! [`Candidate`] records are created by the collect stage, scored by the
//! enrich stage and immutable afterward. [`Reading`], [`SelectionResult`]
//! and [`SynthesisOutput`] are each produced exactly once by their owning
//! stage and never mutated by a later one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single collected item (publication, report, dataset entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// Key of the provider that returned this item.
    pub provider: String,
    pub year: u32,
    /// 0–100, populated by the enrich stage.
    pub quality_score: u32,
    /// 0–100, populated by the enrich stage.
    pub novelty_score: u32,
    pub citation_count: u32,
    /// Text body used for extraction; never copied into job payloads.
    pub content: String,
}

impl Candidate {
    /// A raw candidate as the collect stage produces it: scores zeroed,
    /// waiting for enrichment.
    pub fn raw(provider: &str, year: u32, citation_count: u32, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.to_string(),
            year,
            quality_score: 0,
            novelty_score: 0,
            citation_count,
            content,
        }
    }
}

/// Extraction confidence for a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Structured extraction produced from one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub candidate_id: String,
    pub claims: Vec<String>,
    pub methods: String,
    pub results: String,
    pub limitations: String,
    pub confidence: Confidence,
}

impl Reading {
    /// Placeholder reading recorded when extraction of a candidate timed
    /// out, errored, or was skipped for unusable content.
    pub fn unreadable(candidate_id: &str) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            claims: Vec::new(),
            methods: String::new(),
            results: String::new(),
            limitations: String::new(),
            confidence: Confidence::Low,
        }
    }

    /// True when this reading carries actual extracted content.
    pub fn is_usable(&self) -> bool {
        !self.claims.is_empty()
    }
}

/// Diversity statistics computed by the selector alongside its picks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiversityStats {
    pub distinct_providers: usize,
    pub per_provider: BTreeMap<String, usize>,
    pub protected_count: usize,
    /// Human-readable descriptions of soft constraints the repair pass
    /// could not satisfy. Empty when all quotas were met.
    pub deficits: Vec<String>,
}

/// The diversity-constrained, ordered subset of candidates chosen for
/// synthesis. Produced once by the select stage; `[REF-n]` markers in the
/// narrative index into `candidate_ids` one-based, in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub candidate_ids: Vec<String>,
    pub stats: DiversityStats,
}

impl SelectionResult {
    pub fn len(&self) -> usize {
        self.candidate_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidate_ids.is_empty()
    }
}

/// Narrative produced by the synthesize stage. The narrative cites selected
/// candidates with `[REF-n]` markers validated by the citation guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub title: String,
    pub narrative: String,
}
