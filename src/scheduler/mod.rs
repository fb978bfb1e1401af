//! Refresh scheduler.
//!
//! Pulls stale and never-fetched tiles from the store into a priority
//! queue, fetches them one at a time under a fixed delay, and commits
//! whatever changed. Runs until the store has nothing stale left, a
//! processing cap is hit, or the cancellation token fires.

mod queue;
mod source;

pub use queue::PriorityQueue;
pub use source::{HttpTileSource, TileSource, USER_AGENT};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::coord::TileCoord;
use crate::error::Result;
use crate::models::{FetchOutcome, RefreshSettings, StatsUpdate, TileContent, WorkItem};
use crate::repository::DbContext;

/// Why a scheduler run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// The queue drained and the store had nothing stale left.
    #[default]
    Exhausted,
    /// The per-run processing cap was reached.
    LimitReached,
    /// Cancelled between items.
    Stopped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Exhausted => "exhausted",
            StopReason::LimitReached => "limit reached",
            StopReason::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Counters for one scheduler run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Items attempted, successful or not.
    pub processed: u64,
    /// Tiles whose stored bytes were written or replaced.
    pub updated: u64,
    /// Tiles re-fetched with an identical hash.
    pub unchanged: u64,
    pub errors: u64,
    /// Items still queued when the run ended.
    pub remaining: usize,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Draining,
}

/// Counters not yet written to the stats row.
///
/// `stored` counts tiles that got their first content row, so the running
/// `processed_tiles` stat matches the content-row count it is reconciled to.
#[derive(Default)]
struct PendingStats {
    stored: u64,
    updated: u64,
}

/// Single-worker refresh loop over the tile store.
pub struct RefreshScheduler {
    db: DbContext,
    source: Arc<dyn TileSource>,
    cancel: CancellationToken,
    limit: Option<u64>,
}

impl RefreshScheduler {
    pub fn new(db: DbContext, source: Arc<dyn TileSource>, cancel: CancellationToken) -> Self {
        Self {
            db,
            source,
            cancel,
            limit: None,
        }
    }

    /// Override `maxTilesToProcess` for this scheduler.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub async fn run(&self) -> Result<RefreshReport> {
        let mut queue = PriorityQueue::new();
        let mut failed: HashSet<TileCoord> = HashSet::new();
        let mut report = RefreshReport::default();
        let mut pending = PendingStats::default();
        let mut settings = self.db.settings().current().await?;
        let mut source_drained = false;
        let mut phase = Phase::Loading;
        let run_started = Utc::now();

        tracing::info!("Refresh started");

        let stop_reason = loop {
            match phase {
                Phase::Loading => {
                    settings = self.db.settings().current().await?;
                    let added = self
                        .load(&mut queue, &failed, &settings, run_started)
                        .await?;
                    source_drained = added == 0;
                    if queue.is_empty() {
                        break StopReason::Exhausted;
                    }
                    phase = Phase::Draining;
                }
                Phase::Draining => {
                    if self.cancel.is_cancelled() {
                        break StopReason::Stopped;
                    }
                    let cap = self.limit.unwrap_or(settings.max_tiles_to_process);
                    if cap > 0 && report.processed >= cap {
                        break StopReason::LimitReached;
                    }
                    let Some(item) = queue.dequeue() else {
                        phase = Phase::Loading;
                        continue;
                    };

                    tokio::select! {
                        _ = tokio::time::sleep(settings.request_delay()) => {}
                        _ = self.cancel.cancelled() => {
                            queue.push(item);
                            break StopReason::Stopped;
                        }
                    }

                    let outcome = self
                        .process(item, &settings, &mut report, &mut failed)
                        .await;
                    report.processed += 1;
                    if outcome == Some(FetchOutcome::Created) {
                        pending.stored += 1;
                    }
                    if outcome.is_some_and(|o| o.is_update()) {
                        pending.updated += 1;
                    }

                    let period = u64::from(settings.min_queue_size.max(1));
                    if report.processed % period == 0 {
                        self.flush_stats(&mut pending).await;
                        tracing::info!(
                            "Progress: {} processed, {} updated, {} errors, {} queued",
                            report.processed,
                            report.updated,
                            report.errors,
                            queue.len()
                        );
                    }

                    if queue.is_empty()
                        || (queue.len() < settings.min_queue_size as usize && !source_drained)
                    {
                        phase = Phase::Loading;
                    }
                }
            }
        };

        self.flush_stats(&mut pending).await;
        self.reconcile().await?;

        report.remaining = queue.len();
        report.stop_reason = stop_reason;
        tracing::info!(
            "Refresh {}: {} processed, {} updated, {} unchanged, {} errors, {} remaining",
            report.stop_reason,
            report.processed,
            report.updated,
            report.unchanged,
            report.errors,
            report.remaining
        );
        Ok(report)
    }

    /// Pull up to `batch_size` stale tiles that are neither queued nor failed.
    ///
    /// The cutoff never passes `run_started`, so a tile fetched during this
    /// run is not stale again until the next one.
    async fn load(
        &self,
        queue: &mut PriorityQueue,
        failed: &HashSet<TileCoord>,
        settings: &RefreshSettings,
        run_started: DateTime<Utc>,
    ) -> Result<usize> {
        let now = Utc::now();
        let cutoff = settings.stale_cutoff(now).min(run_started);
        let seen: HashSet<TileCoord> = queue.coords().chain(failed.iter().copied()).collect();
        let batch = settings.batch_size as usize;
        let limit = (batch + seen.len()) as i64;

        let candidates = self
            .db
            .tiles()
            .stale(&settings.zoom_scope(), cutoff, limit, now)
            .await?;

        let mut added = 0;
        for item in candidates
            .into_iter()
            .filter(|item| !seen.contains(&item.coord))
            .take(batch)
        {
            queue.push(item);
            added += 1;
        }
        tracing::debug!("Loaded {} stale tiles ({} queued)", added, queue.len());
        Ok(added)
    }

    /// Fetch and commit one tile. `None` when the fetch or the commit failed.
    async fn process(
        &self,
        item: WorkItem,
        settings: &RefreshSettings,
        report: &mut RefreshReport,
        failed: &mut HashSet<TileCoord>,
    ) -> Option<FetchOutcome> {
        let coord = item.coord;
        let data = match self.source.fetch(coord).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed to fetch tile {}: {}", coord, e);
                report.errors += 1;
                failed.insert(coord);
                return None;
            }
        };

        let hash = TileContent::compute_hash(&data);
        match self
            .db
            .content()
            .record_fetch(coord, &data, &hash, settings.history_mode, Utc::now())
            .await
        {
            Ok(outcome) if outcome.is_update() => {
                tracing::debug!(
                    "Tile {} updated ({} -> {})",
                    coord,
                    item.hash.as_deref().unwrap_or("none"),
                    hash
                );
                report.updated += 1;
                Some(outcome)
            }
            Ok(outcome) => {
                report.unchanged += 1;
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("Failed to store tile {}: {}", coord, e);
                report.errors += 1;
                failed.insert(coord);
                None
            }
        }
    }

    async fn flush_stats(&self, pending: &mut PendingStats) {
        if pending.stored == 0 && pending.updated == 0 {
            return;
        }
        let update = StatsUpdate::increment()
            .processed_tiles(pending.stored)
            .updated_tiles(pending.updated)
            .last_update(Utc::now());
        match self.db.stats().apply(&update).await {
            Ok(_) => *pending = PendingStats::default(),
            Err(e) => tracing::warn!("Failed to persist progress stats: {}", e),
        }
    }

    /// Write authoritative tile and content counts to the stats row.
    async fn reconcile(&self) -> Result<()> {
        let total = self.db.tiles().count().await?;
        let processed = self.db.content().count().await?;
        self.db
            .stats()
            .apply(
                &StatsUpdate::replace()
                    .total_tiles(total)
                    .processed_tiles(processed)
                    .last_update(Utc::now()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::SettingsUpdate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Serves fixed bytes per tile and fails for tiles with odd `x`.
    struct OddFailingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TileSource for OddFailingSource {
        async fn fetch(&self, coord: TileCoord) -> std::result::Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if coord.x % 2 == 1 {
                return Err(FetchError::Other("boom".into()));
            }
            Ok(format!("tile {}", coord).into_bytes())
        }
    }

    /// Always succeeds. On its first call it stores `first_call_update`, and
    /// it records the persisted `processed_tiles` stat on every call.
    struct ObservingSource {
        db: DbContext,
        first_call_update: Option<SettingsUpdate>,
        calls: std::sync::Mutex<Vec<TileCoord>>,
        seen_processed: std::sync::Mutex<Vec<u64>>,
    }

    impl ObservingSource {
        fn new(db: DbContext, first_call_update: Option<SettingsUpdate>) -> Self {
            Self {
                db,
                first_call_update,
                calls: Default::default(),
                seen_processed: Default::default(),
            }
        }

        fn calls_at(&self, z: u8) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| c.z == z).count()
        }
    }

    #[async_trait]
    impl TileSource for ObservingSource {
        async fn fetch(&self, coord: TileCoord) -> std::result::Result<Vec<u8>, FetchError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(coord);
                calls.len() == 1
            };
            if first {
                if let Some(ref update) = self.first_call_update {
                    self.db.settings().upsert(&update.to_entries()).await.unwrap();
                }
            }
            let processed = self.db.stats().get().await.unwrap().processed_tiles;
            self.seen_processed.lock().unwrap().push(processed);
            Ok(format!("tile {}", coord).into_bytes())
        }
    }

    async fn setup(tiles: u32) -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_path(&dir.path().join("sched.db"));
        ctx.init_schema().await.unwrap();
        let batch: Vec<_> = (0..tiles).map(|x| (TileCoord::new(x, 0, 14), None)).collect();
        ctx.tiles().insert_batch(&batch).await.unwrap();
        let update = SettingsUpdate {
            request_delay: Some(0),
            batch_size: Some(3),
            min_queue_size: Some(2),
            ..Default::default()
        };
        ctx.settings().upsert(&update.to_entries()).await.unwrap();
        (ctx, dir)
    }

    #[tokio::test]
    async fn test_failed_tiles_are_not_retried_within_a_run() {
        let (ctx, _dir) = setup(6).await;
        let source = Arc::new(OddFailingSource {
            calls: AtomicUsize::new(0),
        });
        let scheduler = RefreshScheduler::new(ctx.clone(), source.clone(), CancellationToken::new());

        let report = scheduler.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(report.processed, 6);
        assert_eq!(report.updated, 3);
        assert_eq!(report.errors, 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 6);

        let stats = ctx.stats().get().await.unwrap();
        assert_eq!(stats.total_tiles, 6);
        assert_eq!(stats.processed_tiles, 3);
        assert_eq!(stats.updated_tiles, 3);
        assert!(stats.last_update.is_some());
    }

    #[tokio::test]
    async fn test_limit_and_fresh_content() {
        let (ctx, _dir) = setup(4).await;
        let source = Arc::new(OddFailingSource {
            calls: AtomicUsize::new(0),
        });

        let limited = RefreshScheduler::new(ctx.clone(), source.clone(), CancellationToken::new())
            .with_limit(Some(2))
            .run()
            .await
            .unwrap();
        assert_eq!(limited.stop_reason, StopReason::LimitReached);
        assert_eq!(limited.processed, 2);

        // Successful tiles are fresh now; only the failures and the untouched
        // tiles are picked up again.
        let rest = RefreshScheduler::new(ctx.clone(), source, CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert_eq!(rest.processed + limited.updated, 4);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (ctx, _dir) = setup(4).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = Arc::new(OddFailingSource {
            calls: AtomicUsize::new(0),
        });

        let report = RefreshScheduler::new(ctx, source.clone(), cancel)
            .run()
            .await
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert_eq!(report.processed, 0);
        assert_eq!(report.remaining, 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_max_tiles_to_process() {
        let (ctx, _dir) = setup(6).await;
        let cap = SettingsUpdate {
            max_tiles_to_process: Some(4),
            ..Default::default()
        };
        ctx.settings().upsert(&cap.to_entries()).await.unwrap();
        let source = Arc::new(OddFailingSource {
            calls: AtomicUsize::new(0),
        });

        let report = RefreshScheduler::new(ctx, source.clone(), CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert_eq!(report.stop_reason, StopReason::LimitReached);
        assert_eq!(report.processed, 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_settings_changes_apply_at_next_load() {
        let (ctx, _dir) = setup(6).await;
        ctx.tiles()
            .insert_batch(&[(TileCoord::new(0, 0, 15), None), (TileCoord::new(1, 0, 15), None)])
            .await
            .unwrap();
        let only_14 = SettingsUpdate {
            zoom_levels: Some(vec![14]),
            ..Default::default()
        };
        ctx.settings().upsert(&only_14.to_entries()).await.unwrap();

        let switch_to_15 = SettingsUpdate {
            zoom_levels: Some(vec![15]),
            ..Default::default()
        };
        let source = Arc::new(ObservingSource::new(ctx.clone(), Some(switch_to_15)));

        let report = RefreshScheduler::new(ctx.clone(), source.clone(), CancellationToken::new())
            .run()
            .await
            .unwrap();

        // The first load queued three zoom-14 tiles. The reload after two of
        // them picked up the new scope and added only zoom-15 tiles.
        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(source.calls_at(14), 3);
        assert_eq!(source.calls_at(15), 2);
        assert_eq!(report.processed, 5);
        assert!(ctx.content().get(TileCoord::new(1, 0, 15)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_processed_stat_tracks_stored_content() {
        let (ctx, _dir) = setup(4).await;
        let always_stale = SettingsUpdate {
            update_interval: Some(0),
            ..Default::default()
        };
        ctx.settings().upsert(&always_stale.to_entries()).await.unwrap();

        let first = Arc::new(ObservingSource::new(ctx.clone(), None));
        RefreshScheduler::new(ctx.clone(), first.clone(), CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert!(first.seen_processed.lock().unwrap().iter().all(|&n| n <= 4));
        assert_eq!(ctx.stats().get().await.unwrap().processed_tiles, 4);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = Arc::new(ObservingSource::new(ctx.clone(), None));
        let report = RefreshScheduler::new(ctx.clone(), second.clone(), CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert_eq!(report.unchanged, 4);
        assert_eq!(*second.seen_processed.lock().unwrap(), vec![4, 4, 4, 4]);
        assert_eq!(ctx.stats().get().await.unwrap().processed_tiles, 4);
    }
}
