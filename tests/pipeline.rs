//! End-to-end pipeline tests over the public crate surface.

use std::collections::HashSet;
use std::sync::Arc;

use monograph::artifacts::ArtifactStore;
use monograph::completion::{CompletionBackend, OfflineBackend};
use monograph::config::MonographConfig;
use monograph::providers::{registry_from, SearchProvider, StaticProvider};
use monograph::scheduler::Scheduler;
use monograph::stages::StageContext;
use monograph::store::{JobPayload, JobStatus, JobStore, Stage};

fn quiet_config() -> MonographConfig {
    MonographConfig {
        base_delay_ms: 0,
        ..MonographConfig::default()
    }
}

fn context(store: Arc<JobStore>, artifacts: Arc<ArtifactStore>) -> StageContext {
    let providers = registry_from(vec![
        Arc::new(StaticProvider::demo("arxiv", 6)) as Arc<dyn SearchProvider>,
        Arc::new(StaticProvider::demo("crossref", 6)),
        Arc::new(StaticProvider::demo("ssrn", 6)),
    ]);
    StageContext {
        store,
        artifacts,
        providers,
        completion: Arc::new(OfflineBackend) as Arc<dyn CompletionBackend>,
        config: quiet_config(),
    }
}

#[tokio::test]
async fn two_workers_share_one_queue_without_double_execution() {
    let store = Arc::new(JobStore::new(3));
    let artifacts = Arc::new(ArtifactStore::new());

    let worker_a = Scheduler::new(context(Arc::clone(&store), Arc::clone(&artifacts)));
    let worker_b = Scheduler::new(context(Arc::clone(&store), Arc::clone(&artifacts)));

    // Three independent pipeline runs on one queue.
    for topic in ["topic one", "topic two", "topic three"] {
        worker_a
            .enqueue_root(topic, vec!["arxiv".into(), "crossref".into(), "ssrn".into()], 6)
            .unwrap();
    }

    let (summary_a, summary_b) =
        tokio::join!(worker_a.run_until_idle(), worker_b.run_until_idle());

    // 3 runs x 7 stages, each executed exactly once across both workers.
    assert_eq!(summary_a.completed + summary_b.completed, 21);
    assert_eq!(summary_a.failed + summary_b.failed, 0);

    let jobs = store.snapshot();
    assert_eq!(jobs.len(), 21);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Done));

    let ids: HashSet<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids.len(), 21);
}

#[tokio::test]
async fn pipeline_advances_stage_by_stage_in_order() {
    let store = Arc::new(JobStore::new(3));
    let artifacts = Arc::new(ArtifactStore::new());
    let scheduler = Scheduler::new(context(Arc::clone(&store), artifacts));

    scheduler
        .enqueue_root(
            "retrieval augmentation",
            vec!["arxiv".into(), "crossref".into(), "ssrn".into()],
            6,
        )
        .unwrap();
    scheduler.run_until_idle().await;

    let jobs = store.snapshot();
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

    // Each successor was created only after its predecessor finished.
    for pair in jobs.windows(2) {
        let finished = pair[0].finished_at.expect("predecessor finished");
        assert!(pair[1].created_at >= finished);
    }

    // Payloads carry ids and summaries, never candidate bodies.
    for job in &jobs {
        let payload_json = serde_json::to_string(&job.payload).unwrap();
        assert!(!payload_json.contains("Study 0 from arxiv"));
    }
}

#[tokio::test]
async fn snapshot_resumes_an_interrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    // First invocation: enqueue but do not run, then snapshot.
    let store = Arc::new(JobStore::new(3));
    let artifacts = Arc::new(ArtifactStore::new());
    {
        let scheduler = Scheduler::new(context(Arc::clone(&store), Arc::clone(&artifacts)));
        scheduler
            .enqueue_root(
                "federated evaluation",
                vec!["arxiv".into(), "crossref".into(), "ssrn".into()],
                6,
            )
            .unwrap();
        store.save_to(&path).unwrap();
    }

    // Second invocation: reload the queue and drain it.
    let resumed = Arc::new(JobStore::load_from(&path, 3).unwrap());
    assert_eq!(resumed.pending_count(), 1);

    let scheduler = Scheduler::new(context(Arc::clone(&resumed), Arc::new(ArtifactStore::new())));
    let summary = scheduler.run_until_idle().await;

    assert_eq!(summary.completed, 7);
    assert!(resumed.snapshot().iter().all(|j| j.status == JobStatus::Done));
}

#[tokio::test]
async fn published_document_references_every_selected_candidate() {
    let store = Arc::new(JobStore::new(3));
    let artifacts = Arc::new(ArtifactStore::new());
    let scheduler = Scheduler::new(context(Arc::clone(&store), Arc::clone(&artifacts)));

    scheduler
        .enqueue_root(
            "benchmark contamination",
            vec!["arxiv".into(), "crossref".into(), "ssrn".into()],
            6,
        )
        .unwrap();
    scheduler.run_until_idle().await;

    let jobs = store.snapshot();
    let selection = jobs
        .iter()
        .find_map(|j| match &j.payload {
            JobPayload::Render { selection, .. } => Some(selection.clone()),
            _ => None,
        })
        .expect("render job present");
    let rendered_id = jobs
        .iter()
        .find_map(|j| match &j.payload {
            JobPayload::Publish { rendered_id } => Some(rendered_id.clone()),
            _ => None,
        })
        .expect("publish job present");

    let doc = artifacts.rendered(&rendered_id).unwrap();
    assert!(doc.published);
    // One numbered reference line per selected candidate.
    for n in 1..=selection.len() {
        assert!(doc.markdown.contains(&format!("{n}. ")));
    }
    assert!(selection.stats.distinct_providers >= 3);
}
