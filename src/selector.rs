//! Diversity-constrained candidate selection.
//!
//! A pure greedy ranking over composite scores (quality, novelty, recency,
//! plus a bonus for providers and years underrepresented in the picks so
//! far), followed by a bounded repair pass for the soft quotas. Quotas the
//! repair pass cannot satisfy become recorded deficits, never failures.
//! All tie-breaks resolve by candidate id, so selection is deterministic.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::model::{Candidate, DiversityStats, SelectionResult};

/// Selection quotas and scoring weights. These are product-tuned parameters,
/// carried in configuration rather than hard-coded.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Target selection size `k`.
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    /// Hard cap on picks from one provider.
    #[serde(default = "default_max_per_provider")]
    pub max_per_provider: usize,
    /// Hard cap on picks from one publication year.
    #[serde(default = "default_max_per_year")]
    pub max_per_year: usize,
    /// Soft minimum of distinct providers in the result.
    #[serde(default = "default_min_distinct_providers")]
    pub min_distinct_providers: usize,
    /// Soft minimum of picks from the protected provider subgroup.
    #[serde(default = "default_min_protected")]
    pub min_protected: usize,
    /// Provider keys forming the protected subgroup.
    #[serde(default)]
    pub protected_providers: Vec<String>,
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    #[serde(default = "default_novelty_weight")]
    pub novelty_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    /// Bonus added for a provider/year not yet represented in the picks.
    #[serde(default = "default_diversity_bonus")]
    pub diversity_bonus: f64,
}

fn default_target_size() -> usize {
    12
}

fn default_max_per_provider() -> usize {
    4
}

fn default_max_per_year() -> usize {
    3
}

fn default_min_distinct_providers() -> usize {
    3
}

fn default_min_protected() -> usize {
    2
}

fn default_quality_weight() -> f64 {
    0.5
}

fn default_novelty_weight() -> f64 {
    0.3
}

fn default_recency_weight() -> f64 {
    0.2
}

fn default_diversity_bonus() -> f64 {
    0.05
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            max_per_provider: default_max_per_provider(),
            max_per_year: default_max_per_year(),
            min_distinct_providers: default_min_distinct_providers(),
            min_protected: default_min_protected(),
            protected_providers: Vec::new(),
            quality_weight: default_quality_weight(),
            novelty_weight: default_novelty_weight(),
            recency_weight: default_recency_weight(),
            diversity_bonus: default_diversity_bonus(),
        }
    }
}

impl SelectorConfig {
    fn is_protected(&self, provider: &str) -> bool {
        self.protected_providers.iter().any(|p| p == provider)
    }
}

/// Composite score without the dynamic diversity bonus. Used for greedy
/// ranking and for choosing swap victims in the repair pass.
fn base_score(c: &Candidate, cfg: &SelectorConfig, min_year: u32, max_year: u32) -> f64 {
    let quality = f64::from(c.quality_score) / 100.0;
    let novelty = f64::from(c.novelty_score) / 100.0;
    let recency = if max_year > min_year {
        f64::from(c.year - min_year) / f64::from(max_year - min_year)
    } else {
        1.0
    };
    cfg.quality_weight * quality + cfg.novelty_weight * novelty + cfg.recency_weight * recency
}

/// Select a bounded, diversified subset of the enriched candidates.
pub fn select(candidates: &[Candidate], cfg: &SelectorConfig) -> SelectionResult {
    let min_year = candidates.iter().map(|c| c.year).min().unwrap_or(0);
    let max_year = candidates.iter().map(|c| c.year).max().unwrap_or(0);

    let mut selected: Vec<&Candidate> = Vec::new();
    let mut selected_ids: HashSet<&str> = HashSet::new();
    let mut provider_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut year_counts: BTreeMap<u32, usize> = BTreeMap::new();

    // Greedy phase: repeatedly take the best-scoring candidate that does not
    // violate a hard cap. Scores include the diversity bonus, which depends
    // on the picks made so far, so the pool is re-ranked each round.
    while selected.len() < cfg.target_size {
        let pick = candidates
            .iter()
            .filter(|c| !selected_ids.contains(c.id.as_str()))
            .filter(|c| provider_counts.get(c.provider.as_str()).copied().unwrap_or(0) < cfg.max_per_provider)
            .filter(|c| year_counts.get(&c.year).copied().unwrap_or(0) < cfg.max_per_year)
            .map(|c| {
                let mut score = base_score(c, cfg, min_year, max_year);
                if !provider_counts.contains_key(c.provider.as_str()) {
                    score += cfg.diversity_bonus;
                }
                if !year_counts.contains_key(&c.year) {
                    score += cfg.diversity_bonus;
                }
                (c, score)
            })
            .max_by(|(a, sa), (b, sb)| {
                sa.partial_cmp(sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Lower id wins ties, so prefer it as the "greater" pick.
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|(c, _)| c);

        let Some(c) = pick else { break };
        selected_ids.insert(c.id.as_str());
        *provider_counts.entry(c.provider.as_str()).or_insert(0) += 1;
        *year_counts.entry(c.year).or_insert(0) += 1;
        selected.push(c);
    }

    let mut deficits = Vec::new();
    repair_distinct_providers(candidates, cfg, min_year, max_year, &mut selected, &mut deficits);
    repair_protected_quota(candidates, cfg, min_year, max_year, &mut selected, &mut deficits);

    let mut per_provider: BTreeMap<String, usize> = BTreeMap::new();
    for c in &selected {
        *per_provider.entry(c.provider.clone()).or_insert(0) += 1;
    }
    let protected_count = selected
        .iter()
        .filter(|c| cfg.is_protected(&c.provider))
        .count();

    SelectionResult {
        candidate_ids: selected.iter().map(|c| c.id.clone()).collect(),
        stats: DiversityStats {
            distinct_providers: per_provider.len(),
            per_provider,
            protected_count,
            deficits,
        },
    }
}

/// Swap in candidates from unrepresented providers until the distinct-
/// provider quota is met or no beneficial swap exists. The victim is always
/// the lowest-scoring pick from a provider with more than one pick, so a
/// swap never reduces the distinct count.
fn repair_distinct_providers<'a>(
    candidates: &'a [Candidate],
    cfg: &SelectorConfig,
    min_year: u32,
    max_year: u32,
    selected: &mut Vec<&'a Candidate>,
    deficits: &mut Vec<String>,
) {
    for _ in 0..cfg.target_size {
        let represented: HashSet<&str> = selected.iter().map(|c| c.provider.as_str()).collect();
        let available: HashSet<&str> = candidates.iter().map(|c| c.provider.as_str()).collect();
        let required = cfg.min_distinct_providers.min(available.len());
        if represented.len() >= required {
            return;
        }

        let selected_ids: HashSet<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        let incoming = candidates
            .iter()
            .filter(|c| !selected_ids.contains(c.id.as_str()))
            .filter(|c| !represented.contains(c.provider.as_str()))
            .max_by(|a, b| {
                base_score(a, cfg, min_year, max_year)
                    .partial_cmp(&base_score(b, cfg, min_year, max_year))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.id.cmp(&a.id))
            });

        let Some(incoming) = incoming else { break };
        if !swap_out_victim(cfg, min_year, max_year, selected, incoming, |_| true) {
            break;
        }
    }

    let represented: HashSet<&str> = selected.iter().map(|c| c.provider.as_str()).collect();
    let available: HashSet<&str> = candidates.iter().map(|c| c.provider.as_str()).collect();
    let required = cfg.min_distinct_providers.min(available.len());
    if represented.len() < required {
        deficits.push(format!(
            "distinct providers {} below quota {required}",
            represented.len()
        ));
    }
}

/// Swap in protected-subgroup candidates until the protected quota is met,
/// best-effort.
fn repair_protected_quota<'a>(
    candidates: &'a [Candidate],
    cfg: &SelectorConfig,
    min_year: u32,
    max_year: u32,
    selected: &mut Vec<&'a Candidate>,
    deficits: &mut Vec<String>,
) {
    if cfg.min_protected == 0 || cfg.protected_providers.is_empty() {
        return;
    }

    let available_protected = candidates
        .iter()
        .filter(|c| cfg.is_protected(&c.provider))
        .count();
    let required = cfg.min_protected.min(available_protected);

    for _ in 0..cfg.target_size {
        let have = selected
            .iter()
            .filter(|c| cfg.is_protected(&c.provider))
            .count();
        if have >= required {
            return;
        }

        let selected_ids: HashSet<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        let incoming = candidates
            .iter()
            .filter(|c| !selected_ids.contains(c.id.as_str()))
            .filter(|c| cfg.is_protected(&c.provider))
            .max_by(|a, b| {
                base_score(a, cfg, min_year, max_year)
                    .partial_cmp(&base_score(b, cfg, min_year, max_year))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.id.cmp(&a.id))
            });

        let Some(incoming) = incoming else { break };
        let swapped = swap_out_victim(cfg, min_year, max_year, selected, incoming, |c| {
            !cfg.is_protected(&c.provider)
        });
        if !swapped {
            break;
        }
    }

    let have = selected
        .iter()
        .filter(|c| cfg.is_protected(&c.provider))
        .count();
    if have < required {
        deficits.push(format!("protected subgroup {have} below quota {required}"));
    }
}

/// Remove the lowest-scoring eligible pick whose provider holds more than
/// one slot and replace it in place with `incoming`, provided the incoming
/// candidate's caps allow it. Returns false when no victim qualifies.
fn swap_out_victim<'a>(
    cfg: &SelectorConfig,
    min_year: u32,
    max_year: u32,
    selected: &mut Vec<&'a Candidate>,
    incoming: &'a Candidate,
    eligible: impl Fn(&Candidate) -> bool,
) -> bool {
    let mut provider_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for c in selected.iter() {
        *provider_counts.entry(c.provider.as_str()).or_insert(0) += 1;
    }

    let victim_idx = selected
        .iter()
        .enumerate()
        .filter(|(_, c)| eligible(c))
        .filter(|(_, c)| provider_counts.get(c.provider.as_str()).copied().unwrap_or(0) > 1)
        .min_by(|(_, a), (_, b)| {
            base_score(a, cfg, min_year, max_year)
                .partial_cmp(&base_score(b, cfg, min_year, max_year))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(i, _)| i);

    let Some(idx) = victim_idx else { return false };

    // Check the incoming candidate's caps against the post-removal counts.
    let mut year_counts: BTreeMap<u32, usize> = BTreeMap::new();
    for (i, c) in selected.iter().enumerate() {
        if i != idx {
            *year_counts.entry(c.year).or_insert(0) += 1;
        }
    }
    let incoming_provider_count = selected
        .iter()
        .enumerate()
        .filter(|(i, c)| *i != idx && c.provider == incoming.provider)
        .count();
    if incoming_provider_count >= cfg.max_per_provider
        || year_counts.get(&incoming.year).copied().unwrap_or(0) >= cfg.max_per_year
    {
        return false;
    }

    selected[idx] = incoming;
    true
}
