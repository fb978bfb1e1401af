//! End-to-end tests driving the controller against a fake tile source.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::tempdir;

use tilekeeper::config::Settings;
use tilekeeper::controller::{Controller, InitializeOutcome, RunState};
use tilekeeper::coord::TileCoord;
use tilekeeper::discovery::DiscoveryReport;
use tilekeeper::models::{HistoryMode, RefreshSettings, SettingsUpdate, TileContent};
use tilekeeper::scheduler::{StopReason, TileSource};
use tilekeeper::FetchError;

/// Serves `"<tile>@<generation>"` and counts requests.
#[derive(Default)]
struct FakeSource {
    calls: AtomicUsize,
    generation: AtomicUsize,
    latency: Duration,
}

impl FakeSource {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn body(&self, coord: TileCoord) -> Vec<u8> {
        format!("{}@{}", coord, self.generation.load(Ordering::SeqCst)).into_bytes()
    }
}

#[async_trait]
impl TileSource for FakeSource {
    async fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.body(coord))
    }
}

/// A region slightly inset from the 2x2 block of zoom-10 tiles starting at
/// (550, 355), so it touches exactly those four tiles.
fn write_region(path: &Path) {
    let nw = TileCoord::new(550, 355, 10).bounds();
    let se = TileCoord::new(551, 356, 10).bounds();
    let eps = 1e-4;
    let (west, north) = (nw.west + eps, nw.north - eps);
    let (east, south) = (se.east - eps, se.south + eps);

    let region = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "test block"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [west, south], [east, south], [east, north], [west, north], [west, south]
                ]]
            }
        }]
    });
    std::fs::write(path, serde_json::to_vec(&region).unwrap()).unwrap();
}

async fn open(dir: &Path, source: Arc<FakeSource>, max_zoom: u8) -> Controller {
    let mut settings = Settings::with_data_dir(dir.to_path_buf());
    settings.database_url = None;
    settings.connect_attempts = 2;
    settings.connect_delay_ms = 1;
    write_region(&settings.region_path);

    let controller = Controller::open(&settings, source).await.unwrap();
    controller
        .update_settings(&SettingsUpdate {
            min_zoom: Some(10),
            max_zoom: Some(max_zoom),
            request_delay: Some(0),
            batch_size: Some(5),
            min_queue_size: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    controller
}

async fn discover(controller: &Controller, force: bool) -> DiscoveryReport {
    match controller.initialize(force, false).await.unwrap() {
        InitializeOutcome::Started(handle) => handle.await.unwrap().unwrap(),
        other => panic!("expected discovery to start, got {:?}", other),
    }
}

#[tokio::test]
async fn test_discover_then_refresh_everything() {
    let dir = tempdir().unwrap();
    let source = Arc::new(FakeSource::default());
    let controller = open(dir.path(), source.clone(), 11).await;
    assert_eq!(controller.run_state().await, RunState::Uninitialized);

    let report = discover(&controller, false).await;
    assert_eq!(report.tiles_at(10), 4);
    assert!(report.tiles_at(11) >= 4 && report.tiles_at(11) <= 16);
    assert_eq!(report.total_tiles, report.tiles_at(10) + report.tiles_at(11));

    let tiles = controller.db().tiles();
    assert_eq!(tiles.count_orphans(10).await.unwrap(), 0);
    for page in tiles.page_at_zoom(10, 0, 100).await.unwrap() {
        assert!(page.parent.is_none());
    }

    let status = controller.status().await.unwrap();
    assert!(status.is_initialized);
    assert!(!status.is_running);
    assert_eq!(status.stats.total_tiles, report.total_tiles);

    // Without force an initialized store is left alone.
    assert!(matches!(
        controller.initialize(false, false).await.unwrap(),
        InitializeOutcome::AlreadyInitialized
    ));

    // Forced re-run finds the same tiles and inserts nothing.
    let rerun = discover(&controller, true).await;
    assert_eq!(rerun.inserted, 0);
    assert_eq!(rerun.total_tiles, report.total_tiles);
    assert_eq!(tiles.count().await.unwrap(), report.total_tiles);

    let refresh = controller.start_refresh(None).await.unwrap();
    let refreshed = refresh.await.unwrap().unwrap();
    assert_eq!(refreshed.stop_reason, StopReason::Exhausted);
    assert_eq!(refreshed.processed, report.total_tiles);
    assert_eq!(refreshed.updated, report.total_tiles);
    assert_eq!(refreshed.errors, 0);
    assert_eq!(source.calls() as u64, report.total_tiles);

    let status = controller.status().await.unwrap();
    assert!(!status.is_running);
    assert_eq!(status.stats.processed_tiles, report.total_tiles);
    assert_eq!(controller.db().content().history_count().await.unwrap(), 0);

    let tile = TileCoord::new(550, 355, 10);
    let stored = controller.tile_content(550, 355, 10).await.unwrap().unwrap();
    assert_eq!(stored.data, source.body(tile));
    assert_eq!(stored.hash, TileContent::compute_hash(&source.body(tile)));
}

#[tokio::test]
async fn test_hash_stability_and_history_modes() {
    let dir = tempdir().unwrap();
    let source = Arc::new(FakeSource::default());
    let controller = open(dir.path(), source.clone(), 10).await;
    controller
        .update_settings(&SettingsUpdate {
            update_interval: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();
    discover(&controller, false).await;

    let tile = TileCoord::new(551, 356, 10);
    let content = controller.db().content();

    let first = controller.start_refresh(None).await.unwrap().await.unwrap().unwrap();
    assert_eq!(first.updated, 4);
    let hash_before = content.get(tile).await.unwrap().unwrap().hash;

    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = controller.start_refresh(None).await.unwrap().await.unwrap().unwrap();
    assert_eq!(second.processed, 4);
    assert_eq!(second.unchanged, 4);
    assert_eq!(content.get(tile).await.unwrap().unwrap().hash, hash_before);
    assert_eq!(content.history_count().await.unwrap(), 0);

    controller
        .update_settings(&SettingsUpdate {
            history_mode: Some(HistoryMode::Confirmations),
            ..Default::default()
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.start_refresh(None).await.unwrap().await.unwrap().unwrap();
    assert_eq!(content.history_count().await.unwrap(), 4);

    source.generation.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let changed = controller.start_refresh(None).await.unwrap().await.unwrap().unwrap();
    assert_eq!(changed.updated, 4);
    let current = content.get(tile).await.unwrap().unwrap();
    assert_eq!(current.hash, TileContent::compute_hash(&source.body(tile)));
    assert_ne!(current.hash, hash_before);

    let history = content.history(tile).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.last().map(|v| v.hash.clone()), Some(current.hash));
}

#[tokio::test]
async fn test_settings_update_changes_only_given_key() {
    let dir = tempdir().unwrap();
    let controller = open(dir.path(), Arc::new(FakeSource::default()), 11).await;

    let before = controller.settings().await.unwrap();
    controller
        .update_settings(&SettingsUpdate {
            batch_size: Some(500),
            ..Default::default()
        })
        .await
        .unwrap();
    let after = controller.settings().await.unwrap();
    assert_eq!(
        after,
        RefreshSettings {
            batch_size: 500,
            ..before
        }
    );
}

#[tokio::test]
async fn test_stop_leaves_remaining_work() {
    let dir = tempdir().unwrap();
    let source = Arc::new(FakeSource::with_latency(Duration::from_millis(25)));
    let controller = open(dir.path(), source.clone(), 11).await;
    controller
        .update_settings(&SettingsUpdate {
            batch_size: Some(1000),
            ..Default::default()
        })
        .await
        .unwrap();
    let discovered = discover(&controller, false).await;
    assert!(discovered.total_tiles > 2);

    let handle = controller.start_refresh(None).await.unwrap();
    assert!(controller.status().await.unwrap().is_running);
    assert!(matches!(
        controller.start_refresh(None).await,
        Err(tilekeeper::TileError::Conflict(_))
    ));

    while source.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    controller.stop_refresh().await.unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.stop_reason, StopReason::Stopped);
    assert!(report.processed >= 1);
    assert!(report.remaining > 0);
    assert!(!controller.status().await.unwrap().is_running);
    assert_eq!(controller.run_state().await, RunState::Ready);
}

#[tokio::test]
async fn test_reset_returns_to_uninitialized() {
    let dir = tempdir().unwrap();
    let controller = open(dir.path(), Arc::new(FakeSource::default()), 10).await;
    discover(&controller, false).await;

    assert_eq!(controller.reset().await.unwrap(), 4);
    assert_eq!(controller.run_state().await, RunState::Uninitialized);
    assert_eq!(controller.status().await.unwrap().stats.total_tiles, 0);
}

#[tokio::test]
async fn test_extreme_update_interval_cannot_wedge_refresh() {
    let dir = tempdir().unwrap();
    let source = Arc::new(FakeSource::default());
    let controller = open(dir.path(), source.clone(), 10).await;
    discover(&controller, false).await;

    assert!(matches!(
        controller
            .update_settings(&SettingsUpdate {
                update_interval: Some(u32::MAX),
                ..Default::default()
            })
            .await,
        Err(tilekeeper::TileError::Validation(_))
    ));

    // A value written behind the controller's back still only widens the
    // staleness window.
    controller
        .db()
        .settings()
        .upsert(&[("updateInterval".to_string(), u32::MAX.to_string())])
        .await
        .unwrap();

    let first = controller.start_refresh(None).await.unwrap().await.unwrap().unwrap();
    assert_eq!(first.stop_reason, StopReason::Exhausted);
    assert_eq!(first.processed, 4);
    assert_eq!(controller.run_state().await, RunState::Ready);

    let second = controller.start_refresh(None).await.unwrap().await.unwrap().unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(controller.run_state().await, RunState::Ready);
}
