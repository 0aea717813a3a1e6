//! Artifact storage shared by the stage handlers.
//!
//! Job payloads carry ids and small summaries; the bodies live here.
//! Candidates are written by collect, scored by enrich and read-only
//! afterward. Rendered documents are written by render and flipped to
//! published by the terminal stage.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::Candidate;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("candidate not found: {0}")]
    MissingCandidate(String),

    #[error("rendered document not found: {0}")]
    MissingDocument(String),
}

/// Final rendered output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub id: String,
    pub topic: String,
    pub title: String,
    pub markdown: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// In-memory artifact store.
#[derive(Default)]
pub struct ArtifactStore {
    candidates: Mutex<HashMap<String, Candidate>>,
    rendered: Mutex<HashMap<String, RenderedDocument>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store freshly collected candidates, returning their ids in input
    /// order.
    pub fn insert_candidates(&self, items: Vec<Candidate>) -> Vec<String> {
        let mut candidates = self.candidates.lock().unwrap_or_else(|e| e.into_inner());
        items
            .into_iter()
            .map(|c| {
                let id = c.id.clone();
                candidates.insert(id.clone(), c);
                id
            })
            .collect()
    }

    /// Fetch candidates by id, preserving order. Fails on the first missing
    /// id — a payload referencing an unknown candidate is structurally bad.
    pub fn candidates_by_ids(&self, ids: &[String]) -> Result<Vec<Candidate>, ArtifactError> {
        let candidates = self.candidates.lock().unwrap_or_else(|e| e.into_inner());
        ids.iter()
            .map(|id| {
                candidates
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ArtifactError::MissingCandidate(id.clone()))
            })
            .collect()
    }

    /// Write enrichment scores onto a candidate. The only mutation allowed
    /// after collection.
    pub fn apply_scores(
        &self,
        id: &str,
        quality_score: u32,
        novelty_score: u32,
    ) -> Result<(), ArtifactError> {
        let mut candidates = self.candidates.lock().unwrap_or_else(|e| e.into_inner());
        let candidate = candidates
            .get_mut(id)
            .ok_or_else(|| ArtifactError::MissingCandidate(id.to_string()))?;
        candidate.quality_score = quality_score.min(100);
        candidate.novelty_score = novelty_score.min(100);
        Ok(())
    }

    /// Store a rendered document, unpublished, and return its id.
    pub fn insert_rendered(&self, topic: &str, title: &str, markdown: String) -> String {
        let doc = RenderedDocument {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            title: title.to_string(),
            markdown,
            published: false,
            created_at: Utc::now(),
        };
        let id = doc.id.clone();
        let mut rendered = self.rendered.lock().unwrap_or_else(|e| e.into_inner());
        rendered.insert(id.clone(), doc);
        id
    }

    /// Flip a rendered document to published.
    pub fn publish(&self, id: &str) -> Result<(), ArtifactError> {
        let mut rendered = self.rendered.lock().unwrap_or_else(|e| e.into_inner());
        let doc = rendered
            .get_mut(id)
            .ok_or_else(|| ArtifactError::MissingDocument(id.to_string()))?;
        doc.published = true;
        Ok(())
    }

    pub fn rendered(&self, id: &str) -> Option<RenderedDocument> {
        let rendered = self.rendered.lock().unwrap_or_else(|e| e.into_inner());
        rendered.get(id).cloned()
    }

    pub fn candidate_count(&self) -> usize {
        let candidates = self.candidates.lock().unwrap_or_else(|e| e.into_inner());
        candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_roundtrip_in_order() {
        let store = ArtifactStore::new();
        let a = Candidate::raw("arxiv", 2023, 3, "a".into());
        let b = Candidate::raw("crossref", 2022, 9, "b".into());
        let ids = store.insert_candidates(vec![a.clone(), b.clone()]);
        assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);

        // Reversed lookup preserves requested order.
        let fetched = store
            .candidates_by_ids(&[b.id.clone(), a.id.clone()])
            .unwrap();
        assert_eq!(fetched[0].id, b.id);
        assert_eq!(fetched[1].id, a.id);
    }

    #[test]
    fn missing_candidate_is_an_error() {
        let store = ArtifactStore::new();
        let err = store.candidates_by_ids(&["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, ArtifactError::MissingCandidate(_)));
    }

    #[test]
    fn apply_scores_clamps_to_100() {
        let store = ArtifactStore::new();
        let c = Candidate::raw("arxiv", 2023, 3, "x".into());
        let id = c.id.clone();
        store.insert_candidates(vec![c]);

        store.apply_scores(&id, 250, 80).unwrap();
        let fetched = store.candidates_by_ids(&[id]).unwrap();
        assert_eq!(fetched[0].quality_score, 100);
        assert_eq!(fetched[0].novelty_score, 80);
    }

    #[test]
    fn rendered_publish_flow() {
        let store = ArtifactStore::new();
        let id = store.insert_rendered("topic", "Title", "# Title\nbody".into());
        assert!(!store.rendered(&id).unwrap().published);

        store.publish(&id).unwrap();
        assert!(store.rendered(&id).unwrap().published);

        let err = store.publish("ghost").unwrap_err();
        assert!(matches!(err, ArtifactError::MissingDocument(_)));
    }
}
