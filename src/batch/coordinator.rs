//! Batch coordinator - runs the funnel over many targets
//!
//! Targets run as tokio tasks gated by a semaphore. Permits are taken in
//! submission order before each task is spawned, so targets start in the
//! order given; with a limit of one the batch is a plain sequential loop.
//! Each task is isolated: one target's failure never affects another's.
//! Once every task has finished, accepted records are merged in submission
//! order, so which duplicate wins does not depend on task timing.

use crate::batch::{BatchReport, TargetReport, TargetStatus};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::funnel::{Funnel, FunnelOutcome};
use crate::model::{FetchTarget, Platform, ProductRecord};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type SearchKey = (Platform, String, Option<String>);

/// Searches whose first page was exhausted
#[derive(Debug, Default)]
struct ExhaustedSearches {
    keys: Mutex<HashSet<SearchKey>>,
}

impl ExhaustedSearches {
    fn mark(&self, target: &FetchTarget) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.insert(target.search_key());
        }
    }

    fn contains(&self, target: &FetchTarget) -> bool {
        self.keys
            .lock()
            .map(|keys| keys.contains(&target.search_key()))
            .unwrap_or(false)
    }
}

/// Runs batches of fetch targets through a shared funnel
pub struct BatchCoordinator {
    funnel: Arc<Funnel>,
    limit: Arc<Semaphore>,
    stop_after_empty_first_page: bool,
    cancel: CancellationToken,
}

impl BatchCoordinator {
    /// Creates a coordinator running at most `max_concurrent` targets at once
    pub fn new(funnel: Arc<Funnel>, max_concurrent: usize) -> Self {
        Self {
            funnel,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
            stop_after_empty_first_page: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a coordinator with the default collaborators for a configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded configuration
    /// * `cache` - Cache store opened for this batch; closed when `run` finishes
    pub fn from_config(config: &Config, cache: Arc<dyn CacheStore>) -> crate::Result<Self> {
        let funnel = Funnel::from_config(config, cache)?;
        Ok(Self::new(
            Arc::new(funnel),
            config.funnel.max_concurrent_targets as usize,
        )
        .stop_after_empty_first_page(config.funnel.stop_after_empty_first_page))
    }

    /// Whether later pages of a search are skipped once its first page is exhausted
    pub fn stop_after_empty_first_page(mut self, stop: bool) -> Self {
        self.stop_after_empty_first_page = stop;
        self
    }

    /// Uses an existing cancellation token instead of a fresh one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this coordinator's batches when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn funnel(&self) -> &Arc<Funnel> {
        &self.funnel
    }

    /// Runs every target and aggregates the results
    ///
    /// Never fails as a whole: each target ends up in the report as
    /// succeeded, exhausted, skipped, or cancelled. The cache store is closed
    /// once all targets are done.
    pub async fn run(&self, targets: Vec<FetchTarget>) -> BatchReport {
        let total = targets.len();
        tracing::info!("Starting batch of {} targets", total);
        let start_time = std::time::Instant::now();

        let exhausted = Arc::new(ExhaustedSearches::default());
        let mut launched: Vec<(FetchTarget, Option<JoinHandle<TargetResult>>)> =
            Vec::with_capacity(total);
        for target in targets {
            let Some(permit) = self.acquire_permit().await else {
                launched.push((target, None));
                continue;
            };

            let task = TargetTask {
                funnel: Arc::clone(&self.funnel),
                cancel: self.cancel.clone(),
                exhausted: Arc::clone(&exhausted),
                stop_after_empty_first_page: self.stop_after_empty_first_page,
            };
            let handle = tokio::spawn(task.run(target.clone(), permit));
            launched.push((target, Some(handle)));
        }

        let mut report = BatchReport::default();
        for (target, handle) in launched {
            let (target_report, records) = match handle {
                None => (TargetReport::new(target, TargetStatus::Cancelled), Vec::new()),
                Some(handle) => match handle.await {
                    Ok(done) => done,
                    Err(e) => {
                        tracing::error!("{}: task failed: {}", target, e);
                        (
                            TargetReport::new(target, TargetStatus::Exhausted { tried: Vec::new() }),
                            Vec::new(),
                        )
                    }
                },
            };

            let offered = records.len();
            let added = report.results.extend(records);
            if added < offered {
                tracing::debug!(
                    "{}: {} duplicate records discarded",
                    target_report.target,
                    offered - added
                );
            }
            report.targets.push(target_report);
        }

        if let Err(e) = self.funnel.cache().close() {
            tracing::warn!("Failed to close cache: {}", e);
        }

        let counts = report.counts();
        tracing::info!(
            "Batch completed in {:?}: {} succeeded, {} exhausted, {} skipped, {} cancelled, {} unique records",
            start_time.elapsed(),
            counts.succeeded,
            counts.exhausted,
            counts.skipped,
            counts.cancelled,
            report.results.len()
        );

        report
    }

    /// Waits for a free slot; `None` once the batch is cancelled
    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.limit).acquire_owned() => permit.ok(),
        }
    }
}

type TargetResult = (TargetReport, Vec<ProductRecord>);

/// Everything one spawned target needs
struct TargetTask {
    funnel: Arc<Funnel>,
    cancel: CancellationToken,
    exhausted: Arc<ExhaustedSearches>,
    stop_after_empty_first_page: bool,
}

impl TargetTask {
    /// Runs one target while holding its slot
    ///
    /// The permit is released only after the exhausted-search bookkeeping, so
    /// the next target sees whether this page came back empty.
    async fn run(self, target: FetchTarget, _permit: OwnedSemaphorePermit) -> TargetResult {
        if self.stop_after_empty_first_page && target.page > 1 && self.exhausted.contains(&target)
        {
            tracing::info!("{}: skipped, first page of this search was exhausted", target);
            return (TargetReport::new(target, TargetStatus::Skipped), Vec::new());
        }

        match self.funnel.run_until_cancelled(&target, &self.cancel).await {
            FunnelOutcome::Succeeded {
                strategy,
                records,
                rejected,
                attempts,
            } => {
                let status = TargetStatus::Succeeded {
                    strategy,
                    accepted: records.len(),
                    rejected,
                };
                (
                    TargetReport {
                        target,
                        status,
                        attempts,
                    },
                    records,
                )
            }
            FunnelOutcome::Exhausted { tried, attempts } => {
                if target.page == 1 {
                    self.exhausted.mark(&target);
                }
                (
                    TargetReport {
                        target,
                        status: TargetStatus::Exhausted { tried },
                        attempts,
                    },
                    Vec::new(),
                )
            }
            FunnelOutcome::Cancelled { attempts } => (
                TargetReport {
                    target,
                    status: TargetStatus::Cancelled,
                    attempts,
                },
                Vec::new(),
            ),
        }
    }
}
