//! Concurrent lookups with serialized persistence.
//!
//! Lookups for a batch run as independent tasks on a bounded pool. Each result
//! is written by the orchestrating task as soon as its lookup completes, so the
//! store only ever sees one writer.

use crate::core::config::FetchConfig;
use crate::core::manager::SourceManager;
use crate::core::quote::{Entity, EntityKind, Quote};
use crate::store::{Database, InsertOutcome, Store};
use anyhow::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Per-entity outcome reported to [`FetchProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Inserted,
    Skipped,
    Failed,
}

/// Observer for a running batch.
pub trait FetchProgress: Send + Sync {
    fn started(&self, _kind: EntityKind, _total: usize) {}
    fn completed(&self, entity: &Entity, status: FetchStatus);
    fn finished(&self, _kind: EntityKind) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub kind: EntityKind,
    pub inserted: usize,
    /// Already stored for that date.
    pub skipped: usize,
    pub failed: Vec<Entity>,
    /// Set when the batch could not load its entities and never ran.
    pub error: Option<String>,
}

impl BatchReport {
    pub fn new(kind: EntityKind) -> Self {
        BatchReport {
            kind,
            inserted: 0,
            skipped: 0,
            failed: Vec::new(),
            error: None,
        }
    }

    pub fn aborted(kind: EntityKind, error: &anyhow::Error) -> Self {
        BatchReport {
            error: Some(format!("{error:#}")),
            ..BatchReport::new(kind)
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }

    pub fn success_count(&self) -> usize {
        self.inserted + self.skipped
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total(&self) -> usize {
        self.success_count() + self.failure_count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchAllReport {
    /// Where the pre-fetch backup went, if it succeeded.
    pub backup: Option<PathBuf>,
    pub stocks: BatchReport,
    pub funds: BatchReport,
    pub rates: BatchReport,
}

impl FetchAllReport {
    pub fn batches(&self) -> [&BatchReport; 3] {
        [&self.stocks, &self.funds, &self.rates]
    }

    /// Batches that could not run at all.
    pub fn aborted(&self) -> Vec<EntityKind> {
        self.batches()
            .iter()
            .filter(|b| b.is_aborted())
            .map(|b| b.kind)
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.batches().iter().map(|b| b.success_count()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.batches().iter().map(|b| b.failure_count()).sum()
    }
}

/// Runs `lookup` for every entity on at most `workers` concurrent tasks and
/// hands each quote to `persist` in completion order.
///
/// A lookup that yields nothing, panics or whose write fails counts as a
/// failure for that entity only.
pub async fn fetch_batch<L, Fut, P>(
    kind: EntityKind,
    entities: Vec<Entity>,
    workers: usize,
    lookup: L,
    mut persist: P,
    progress: Option<&dyn FetchProgress>,
) -> BatchReport
where
    L: Fn(Entity) -> Fut,
    Fut: Future<Output = Option<Quote>> + Send + 'static,
    P: FnMut(&Entity, &Quote) -> Result<InsertOutcome>,
{
    let mut report = BatchReport::new(kind);
    if let Some(p) = progress {
        p.started(kind, entities.len());
    }

    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    for (index, entity) in entities.iter().enumerate() {
        let permits = Arc::clone(&permits);
        let task = lookup(entity.clone());
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (index, AssertUnwindSafe(task).catch_unwind().await)
        });
    }

    let mut pending: Vec<Option<Entity>> = entities.into_iter().map(Some).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                // Cancelled tasks leave their entity pending; it is counted below.
                error!("Fetch task aborted: {}", e);
                continue;
            }
        };
        let Some(entity) = pending[index].take() else {
            continue;
        };

        let status = match outcome {
            Ok(Some(quote)) => match persist(&entity, &quote) {
                Ok(InsertOutcome::Inserted) => {
                    debug!("Stored {} = {} on {}", entity.label(), quote.value, quote.as_of);
                    report.inserted += 1;
                    FetchStatus::Inserted
                }
                Ok(InsertOutcome::Skipped) => {
                    debug!("{} already stored for {}", entity.label(), quote.as_of);
                    report.skipped += 1;
                    FetchStatus::Skipped
                }
                Err(e) => {
                    error!("Failed to store {}: {:#}", entity.label(), e);
                    FetchStatus::Failed
                }
            },
            Ok(None) => {
                warn!("No data for {}", entity.label());
                FetchStatus::Failed
            }
            Err(_) => {
                error!("Lookup for {} panicked", entity.label());
                FetchStatus::Failed
            }
        };

        if let Some(p) = progress {
            p.completed(&entity, status);
        }
        if status == FetchStatus::Failed {
            report.failed.push(entity);
        }
    }

    report.failed.extend(pending.into_iter().flatten());
    if let Some(p) = progress {
        p.finished(kind);
    }
    info!(
        "{} batch done: {} inserted, {} skipped, {} failed",
        kind,
        report.inserted,
        report.skipped,
        report.failure_count()
    );
    report
}

pub struct Fetcher {
    manager: Arc<SourceManager>,
    database: Database,
    backup_dir: PathBuf,
    config: FetchConfig,
    progress: Option<Arc<dyn FetchProgress>>,
}

impl Fetcher {
    pub fn new(manager: Arc<SourceManager>, database: Database, backup_dir: PathBuf, config: FetchConfig) -> Self {
        Fetcher {
            manager,
            database,
            backup_dir,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn FetchProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Loads the batch and persists its results over one connection; failing
    /// to open it is the only error that aborts a batch.
    async fn run<F>(&self, kind: EntityKind, workers: usize, load: F) -> Result<BatchReport>
    where
        F: FnOnce(&Store) -> Result<Vec<Entity>>,
    {
        let store = self.database.connect()?;
        let entities = load(&store)?;
        info!("Fetching {} {} entities with {} workers", entities.len(), kind, workers);

        let manager = Arc::clone(&self.manager);
        let lookup = move |entity: Entity| {
            let manager = Arc::clone(&manager);
            async move {
                match entity.kind {
                    EntityKind::Stock => {
                        let market = entity
                            .market
                            .unwrap_or_else(|| SourceManager::infer_market(&entity.code));
                        manager.stock_price(&entity.code, market).await
                    }
                    EntityKind::Fund => manager.fund_nav(&entity.code, entity.market).await,
                    EntityKind::Currency => manager.exchange_rate(&entity.code).await,
                }
            }
        };

        Ok(fetch_batch(
            kind,
            entities,
            workers,
            lookup,
            |entity, quote| store.insert_quote(entity, quote),
            self.progress.as_deref(),
        )
        .await)
    }

    #[instrument(skip(self))]
    pub async fn fetch_stock_prices(&self) -> Result<BatchReport> {
        self.run(EntityKind::Stock, self.config.max_workers, Store::all_stocks)
            .await
    }

    /// US stocks only, on a smaller pool to stay under vendor rate limits.
    #[instrument(skip(self))]
    pub async fn fetch_us_stock_prices(&self) -> Result<BatchReport> {
        let workers = self.config.us_max_workers.min(self.config.max_workers);
        self.run(EntityKind::Stock, workers, Store::us_stocks).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_fund_navs(&self) -> Result<BatchReport> {
        self.run(EntityKind::Fund, self.config.max_workers, Store::all_funds)
            .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_exchange_rates(&self) -> Result<BatchReport> {
        self.run(
            EntityKind::Currency,
            self.config.max_workers,
            Store::all_currencies,
        )
        .await
    }

    /// Backs up the store, then runs the stock, fund and rate batches in turn.
    ///
    /// A batch that cannot start is recorded as aborted and the next one still
    /// runs.
    pub async fn fetch_all(&self) -> FetchAllReport {
        let backup = match self
            .database
            .connect()
            .and_then(|store| store.backup(&self.backup_dir))
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Backup before fetch failed, continuing: {:#}", e);
                None
            }
        };

        let stocks = settle(EntityKind::Stock, self.fetch_stock_prices().await);
        let funds = settle(EntityKind::Fund, self.fetch_fund_navs().await);
        let rates = settle(EntityKind::Currency, self.fetch_exchange_rates().await);
        FetchAllReport {
            backup,
            stocks,
            funds,
            rates,
        }
    }
}

fn settle(kind: EntityKind, result: Result<BatchReport>) -> BatchReport {
    result.unwrap_or_else(|e| {
        error!("{} batch could not start: {:#}", kind, e);
        BatchReport::aborted(kind, &e)
    })
}
