//! monograph — a multi-stage research pipeline orchestrator.
//!
//! A persistent job queue drives a fixed chain of stages
//! (collect → enrich → select → extract → synthesize → render → publish),
//! each calling one unreliable external collaborator. The store's atomic
//! claim guarantees at-most-one active execution per job; stage handlers
//! enforce diversity quotas, bounded parallel extraction and citation
//! validity before the pipeline advances.

pub mod artifacts;
pub mod citations;
pub mod completion;
pub mod config;
pub mod extract;
pub mod model;
pub mod providers;
pub mod scheduler;
pub mod selector;
pub mod stages;
pub mod store;
pub mod ui;
