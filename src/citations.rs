//! Citation guard: validates `[REF-n]` markers in synthesis output.
//!
//! Pure validation, no external calls. A failing narrative sends the
//! synthesize job back through a stage-local retry with a strengthened
//! instruction; it never rolls the pipeline back.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::model::SynthesisOutput;

static REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[REF-(\d+)\]").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CitationError {
    /// A marker references a source outside `[1, selected_count]`.
    #[error("citation marker [REF-{marker}] is out of range (selection has {max} sources)")]
    OutOfRange { marker: usize, max: usize },

    /// Too few distinct sources cited for the narrative's length.
    #[error("narrative cites {distinct} distinct sources, at least {required} required")]
    TooSparse { distinct: usize, required: usize },
}

/// Density policy for citation markers.
#[derive(Debug, Clone, Deserialize)]
pub struct CitationPolicy {
    /// One distinct marker is required per this many narrative characters,
    /// clamped to `[1, selected_count]`.
    #[serde(default = "default_chars_per_marker")]
    pub chars_per_marker: usize,
}

fn default_chars_per_marker() -> usize {
    600
}

impl Default for CitationPolicy {
    fn default() -> Self {
        Self {
            chars_per_marker: default_chars_per_marker(),
        }
    }
}

/// Marker statistics produced by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationReport {
    pub total_markers: usize,
    pub distinct_markers: usize,
    pub required_distinct: usize,
}

/// Scan the narrative for `[REF-n]` markers and enforce range and density.
///
/// Any marker outside `[1, selected_count]` fails; so does a distinct-marker
/// count under the length-derived minimum. A narrative with zero markers on
/// a non-empty selection always fails.
pub fn verify(
    output: &SynthesisOutput,
    selected_count: usize,
    policy: &CitationPolicy,
) -> Result<CitationReport, CitationError> {
    let mut total = 0usize;
    let mut distinct: BTreeSet<usize> = BTreeSet::new();

    for cap in REF_RE.captures_iter(&output.narrative) {
        total += 1;
        // Absurdly long digit runs overflow usize; treat them as out of range.
        let n = cap[1].parse::<usize>().unwrap_or(usize::MAX);
        if n < 1 || n > selected_count {
            return Err(CitationError::OutOfRange {
                marker: n,
                max: selected_count,
            });
        }
        distinct.insert(n);
    }

    let required = if selected_count == 0 {
        0
    } else {
        (output.narrative.len() / policy.chars_per_marker.max(1))
            .clamp(1, selected_count)
    };

    if distinct.len() < required {
        return Err(CitationError::TooSparse {
            distinct: distinct.len(),
            required,
        });
    }

    Ok(CitationReport {
        total_markers: total,
        distinct_markers: distinct.len(),
        required_distinct: required,
    })
}
