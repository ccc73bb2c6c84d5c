use crate::config::{Config, TimeWindow};
use crate::harvest::{reset_work_dir, ArtifactError, ArtifactSink, HarvestError, Harvester, ReduceError, Reducer};
use crate::notify::Notifier;
use crate::service::{LogService, RequestError};
use crate::staging::{open_store, StagingError, StagingStore};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal failures. Notification errors never appear here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("harvest error: {0}")]
    Harvest(#[from] HarvestError),

    #[error("reduce error: {0}")]
    Reduce(#[from] ReduceError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("output error: {0}")]
    Output(#[from] ArtifactError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub window: TimeWindow,
    pub tags: usize,
    pub pages: u64,
    pub events: usize,
    pub notified: bool,
}

/// Wipe the working directory and open a fresh staging store inside it.
pub async fn prepare_workspace(config: &Config) -> Result<Arc<dyn StagingStore>, PipelineError> {
    info!(path = %config.output.work_dir.display(), "Resetting working directory");
    reset_work_dir(&config.output.work_dir).await?;

    let store = open_store(config.staging.backend, &config.output)?;
    store.reset().await?;
    Ok(store)
}

/// Discover tags, then harvest and reduce each one before moving to the next.
///
/// The first request, staging or output failure stops the run. The notifier is
/// called exactly once at the end and its failure is only logged.
pub async fn run_pipeline(
    config: &Config,
    service: Arc<dyn LogService>,
    store: Arc<dyn StagingStore>,
    notifier: &dyn Notifier,
) -> Result<RunSummary, PipelineError> {
    let window = config.window;

    let sink = ArtifactSink::new(&config.output);
    sink.init_manifest().await?;

    let search = service.search(&window).await?;
    info!(
        rsid = %search.rsid.id,
        status = %search.rsid.status,
        elapsed_time = search.rsid.elapsed_time,
        "Search completed"
    );

    let tags = service.list_tags(&window).await?;
    info!(tags = tags.len(), "Tag listing completed");

    let harvester = Harvester::new(service.clone(), store.clone(), &config.harvest);
    let reducer = Reducer::new(store, sink);

    let mut summary = RunSummary {
        window,
        tags: 0,
        pages: 0,
        events: 0,
        notified: false,
    };
    let mut processed: HashSet<&str> = HashSet::new();

    info!("Starting tag event download");
    for (index, tag) in tags.iter().enumerate() {
        info!("{}/{} [{}]", index + 1, tags.len(), tag.term);

        if !processed.insert(tag.term.as_str()) {
            warn!(tag = %tag.term, "Tag listed more than once, skipping repeat");
            continue;
        }

        reducer.sink().check_tag(&tag.term)?;
        let harvested = harvester.harvest(&tag.term, &window).await?;
        let reduced = reducer.reduce(&tag.term).await?;
        debug!(
            tag = %tag.term,
            expected = tag.count,
            pages = harvested.pages,
            events = reduced.events,
            "Tag complete"
        );

        summary.tags += 1;
        summary.pages += u64::from(harvested.pages);
        summary.events += reduced.events;
    }

    match notifier.notify(&summary).await {
        Ok(()) => summary.notified = true,
        Err(e) => warn!(error = %e, "Completion notification failed"),
    }

    info!(
        tags = summary.tags,
        pages = summary.pages,
        events = summary.events,
        notified = summary.notified,
        "Run complete"
    );
    Ok(summary)
}
