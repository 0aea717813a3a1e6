//! Content-collection providers.
//!
//! Providers are resolved through an explicit map injected at orchestrator
//! construction — no process-wide registry — so substituting a provider in
//! tests is a one-line change. Each provider may fail independently; the
//! collect stage isolates per-provider failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Candidate;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {key} is not registered")]
    Unknown { key: String },

    #[error("provider {key} failed: {message}")]
    Search { key: String, message: String },
}

/// One external content-collection source.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Registry key for this provider (e.g. "arxiv").
    fn key(&self) -> &str;

    /// Search for raw candidates matching the query. At most `limit`
    /// results; scores are left for the enrich stage.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, ProviderError>;
}

/// Provider map resolved once at startup, keyed by provider key.
pub type ProviderRegistry = HashMap<String, Arc<dyn SearchProvider>>;

/// Build a registry from a list of providers.
pub fn registry_from(providers: Vec<Arc<dyn SearchProvider>>) -> ProviderRegistry {
    providers
        .into_iter()
        .map(|p| (p.key().to_string(), p))
        .collect()
}

/// Fixture-backed provider used by the demo and by tests. Returns clones of
/// its canned candidates, capped at the requested limit.
pub struct StaticProvider {
    key: String,
    items: Vec<Candidate>,
}

impl StaticProvider {
    pub fn new(key: &str, items: Vec<Candidate>) -> Self {
        Self {
            key: key.to_string(),
            items,
        }
    }

    /// A demo provider with `count` synthetic candidates spread over recent
    /// years, each with enough content to pass the extraction length gate.
    pub fn demo(key: &str, count: usize) -> Self {
        let items = (0..count)
            .map(|i| {
                let body = format!(
                    "Study {i} from {key} examines the topic in depth. {}",
                    "Methods, results and limitations are described at length. ".repeat(8)
                );
                Candidate::raw(key, 2019 + (i as u32 % 6), (i as u32 * 7) % 120, body)
            })
            .collect();
        Self::new(key, items)
    }
}

#[async_trait]
impl SearchProvider for StaticProvider {
    fn key(&self) -> &str {
        &self.key
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Candidate>, ProviderError> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_caps_at_limit() {
        let provider = StaticProvider::demo("arxiv", 10);
        let results = provider.search("anything", 4).await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|c| c.provider == "arxiv"));
    }

    #[tokio::test]
    async fn demo_candidates_have_usable_content() {
        let provider = StaticProvider::demo("crossref", 3);
        let results = provider.search("q", 3).await.unwrap();
        assert!(results.iter().all(|c| c.content.len() >= 300));
    }

    #[test]
    fn registry_is_keyed_by_provider_key() {
        let registry = registry_from(vec![
            Arc::new(StaticProvider::demo("arxiv", 1)) as Arc<dyn SearchProvider>,
            Arc::new(StaticProvider::demo("crossref", 1)),
        ]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains_key("arxiv"));
        assert!(registry.contains_key("crossref"));
    }
}
