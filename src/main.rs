mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use monograph::artifacts::ArtifactStore;
use monograph::completion::{CompletionBackend, CompletionClient, OfflineBackend};
use monograph::config::MonographConfig;
use monograph::providers::{registry_from, SearchProvider, StaticProvider};
use monograph::scheduler::Scheduler;
use monograph::stages::StageContext;
use monograph::store::JobStore;
use monograph::ui::{self, RunProgress};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = MonographConfig::load()?;
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    if cli.verbose {
        ui::info(&format!(
            "model {}, max retries {}, selector target {}",
            config.model, config.max_retries, config.selector.target_size
        ));
    }

    match cli.command {
        Command::Run {
            topic,
            providers,
            limit,
            jobs,
        } => {
            let provider_keys: Vec<String> = providers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            run_pipeline(config, &topic, provider_keys, limit, jobs.as_deref()).await?;
        }
        Command::Status { jobs } => {
            let store = JobStore::load_from(Path::new(&jobs), config.max_retries)?;
            ui::print_status(&store.snapshot());
        }
        Command::Demo => {
            let topic = "diversity-aware evidence synthesis";
            let providers = vec!["arxiv".into(), "crossref".into(), "ssrn".into()];
            run_pipeline(config, topic, providers, 6, None).await?;
        }
    }

    Ok(())
}

/// Wire up the registry, backend and stores, then drive one run to idle.
async fn run_pipeline(
    config: MonographConfig,
    topic: &str,
    provider_keys: Vec<String>,
    limit: usize,
    snapshot_path: Option<&str>,
) -> Result<()> {
    let registry = registry_from(
        provider_keys
            .iter()
            .map(|key| Arc::new(StaticProvider::demo(key, limit.max(4))) as Arc<dyn SearchProvider>)
            .collect(),
    );

    // Without an API key the offline backend drives the whole chain.
    let completion: Arc<dyn CompletionBackend> = if config.api_key.is_empty() {
        ui::info("no API key configured, using the offline backend");
        Arc::new(OfflineBackend)
    } else {
        Arc::new(CompletionClient::new(config.api_key.clone()))
    };

    let ctx = StageContext {
        store: Arc::new(JobStore::new(config.max_retries)),
        artifacts: Arc::new(ArtifactStore::new()),
        providers: registry,
        completion,
        config,
    };
    let scheduler = Scheduler::with_progress(ctx, RunProgress::start(topic));

    scheduler.enqueue_root(topic, provider_keys, limit)?;
    let summary = scheduler.run_until_idle().await;

    let jobs = scheduler.context().store.snapshot();
    if let Some(path) = snapshot_path {
        scheduler.context().store.save_to(Path::new(path))?;
    }
    ui::print_status(&jobs);

    // Print the published document, if the run got that far.
    if let Some(rendered_id) = jobs.iter().find_map(|j| match &j.payload {
        monograph::store::JobPayload::Publish { rendered_id } => Some(rendered_id.clone()),
        _ => None,
    }) && let Some(doc) = scheduler.context().artifacts.rendered(&rendered_id)
        && doc.published
    {
        println!("\n{}", doc.markdown);
    }

    if summary.failed > 0 {
        anyhow::bail!(
            "run finished with {} failed job(s); see status above",
            summary.failed
        );
    }
    Ok(())
}
