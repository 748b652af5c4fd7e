//! Long-running watch tasks, one per saved search.
//!
//! Each task polls the search endpoint on a fixed interval, drops listings
//! already in the shared [`SeenSet`], fetches details for the rest and hands
//! notifications to the [`Dispatcher`]. Remote failures are logged and retried
//! on the next cycle; they never end a task. Tasks stop only through their
//! cancellation token.

pub mod limiter;
pub mod seen;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::ListingSource;
use crate::config::WatchConfig;
use crate::error::{CompileError, RemoteError};
use crate::models::{Destination, Notification, SavedSearch};
use crate::notify::Dispatcher;
use crate::query::compile;

pub use limiter::RequestLimiter;
pub use seen::SeenSet;

/// How often expired dedup entries are swept
const JANITOR_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Outcome of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub search_failed: bool,
    pub fetched: usize,
    pub new: usize,
    pub details_missing: usize,
    pub notified: usize,
    pub dispatch_failed: usize,
}

struct WatchHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

struct EngineCore {
    source: Arc<dyn ListingSource>,
    dispatcher: Arc<dyn Dispatcher>,
    seen: Arc<SeenSet>,
    limiter: RequestLimiter,
    config: WatchConfig,
}

impl EngineCore {
    /// Run a marketplace call under the shared limiter and the per-call deadline
    async fn call<T, F>(&self, fut: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let _permit = self.limiter.acquire().await?;
        match timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.config.call_timeout)),
        }
    }

    async fn run_cycle(&self, query: &str, destination: Destination) -> CycleReport {
        let mut report = CycleReport::default();

        let listings = match self.call(self.source.search(query)).await {
            Ok(listings) => listings,
            Err(e) => {
                warn!(destination, error = %e, "Search failed, retrying next cycle");
                report.search_failed = true;
                return report;
            }
        };
        report.fetched = listings.len();

        // Mark before notifying so a failed delivery is never repeated.
        let fresh: Vec<_> = listings
            .into_iter()
            .filter(|l| self.seen.insert_if_new(&l.id))
            .collect();
        report.new = fresh.len();

        for listing in fresh {
            let detail = match self.call(self.source.detail(&listing.id)).await {
                Ok(detail) => Some(detail),
                Err(e) => {
                    debug!(listing = %listing.id, error = %e, "Detail fetch failed");
                    report.details_missing += 1;
                    None
                }
            };

            let notification = Notification {
                listing_url: self.source.listing_url(&listing.id),
                listing,
                detail,
            };

            match timeout(
                self.config.call_timeout,
                self.dispatcher.send(destination, &notification),
            )
            .await
            {
                Ok(Ok(())) => report.notified += 1,
                Ok(Err(e)) => {
                    warn!(destination, listing = %notification.listing.id, error = %e, "Notification not delivered");
                    report.dispatch_failed += 1;
                }
                Err(_) => {
                    warn!(destination, listing = %notification.listing.id, "Notification delivery timed out");
                    report.dispatch_failed += 1;
                }
            }
        }

        report
    }
}

async fn watch_loop(
    core: Arc<EngineCore>,
    search_id: String,
    query: String,
    destination: Destination,
    token: CancellationToken,
) {
    info!(search_id = %search_id, destination, "Watch task started");

    while !token.is_cancelled() {
        let report = core.run_cycle(&query, destination).await;
        debug!(search_id = %search_id, ?report, "Watch cycle finished");

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(core.config.poll_interval) => {}
        }
    }

    info!(search_id = %search_id, "Watch task stopped");
}

/// Owner of all watch tasks
pub struct WatchEngine {
    core: Arc<EngineCore>,
    tasks: DashMap<String, WatchHandle>,
    shutdown: CancellationToken,
}

impl WatchEngine {
    pub fn new(
        source: Arc<dyn ListingSource>,
        dispatcher: Arc<dyn Dispatcher>,
        config: WatchConfig,
    ) -> Self {
        let limiter = RequestLimiter::new(config.max_concurrent_requests, config.min_request_spacing);
        Self {
            core: Arc::new(EngineCore {
                source,
                dispatcher,
                seen: Arc::new(SeenSet::new()),
                limiter,
                config,
            }),
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.core.seen
    }

    /// Start watching `search`. A task already running for the same id is replaced.
    pub fn spawn(&self, search: &SavedSearch) -> Result<(), CompileError> {
        let query = compile(&search.filter)?;
        let token = self.shutdown.child_token();

        let join = tokio::spawn(watch_loop(
            self.core.clone(),
            search.id.clone(),
            query,
            search.destination,
            token.clone(),
        ));

        if let Some(previous) = self.tasks.insert(search.id.clone(), WatchHandle { token, join }) {
            debug!(search_id = %search.id, "Replacing existing watch task");
            previous.token.cancel();
        }
        Ok(())
    }

    /// Signal the task for `search_id` to stop. Returns its join handle so
    /// callers can wait for the loop to exit.
    pub fn cancel(&self, search_id: &str) -> Option<JoinHandle<()>> {
        self.tasks.remove(search_id).map(|(_, handle)| {
            handle.token.cancel();
            info!(search_id, "Watch task cancelled");
            handle.join
        })
    }

    pub fn cancel_many<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        ids.into_iter()
            .filter(|id| self.cancel(id).is_some())
            .count()
    }

    pub fn is_watching(&self, search_id: &str) -> bool {
        self.tasks
            .get(search_id)
            .map(|h| !h.join.is_finished())
            .unwrap_or(false)
    }

    /// Number of live tasks
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|h| !h.join.is_finished()).count()
    }

    /// Periodically forget dedup entries older than the retention window
    pub fn spawn_janitor(&self) -> JoinHandle<()> {
        let core = self.core.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(JANITOR_INTERVAL) => {}
                }
                let cutoff = Utc::now() - core.config.seen_retention;
                let dropped = core.seen.evict_older_than(cutoff);
                if dropped > 0 {
                    info!(dropped, remaining = core.seen.len(), "Evicted expired seen listings");
                }
            }
        })
    }

    /// Run one polling cycle outside of any task
    pub async fn run_cycle(&self, query: &str, destination: Destination) -> CycleReport {
        self.core.run_cycle(query, destination).await
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let ids: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.tasks.remove(&id) {
                if let Err(e) = handle.join.await {
                    warn!(search_id = %id, error = %e, "Watch task ended abnormally");
                }
            }
        }
        info!("Watch engine stopped");
    }
}
