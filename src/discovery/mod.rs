//! Tile discovery.
//!
//! Finds every tile in a zoom range whose footprint intersects the target
//! region. The minimum zoom level is scanned in full over the region's
//! bounding box. Every deeper level only tests the four children of tiles
//! already stored one level up, so the store itself is the frontier.

mod report;

pub use report::DiscoveryReport;

use std::time::Instant;

use chrono::Utc;

use crate::coord::TileCoord;
use crate::error::{Result, TileError};
use crate::geometry::GeometryIndex;
use crate::models::{validate_zoom_bounds, StatsUpdate};
use crate::repository::{DbContext, StatsRepository, TileRepository};

/// Rows written per insert transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Parent records read per page when expanding a level.
const PAGE_SIZE: i64 = 1000;

/// Populates the `tiles` table for a zoom range.
pub struct DiscoveryEngine {
    db: DbContext,
    geometry: GeometryIndex,
    min_zoom: u8,
    max_zoom: u8,
    batch_size: usize,
}

impl DiscoveryEngine {
    /// Fails with [`TileError::Configuration`] on invalid zoom bounds.
    pub fn new(db: DbContext, geometry: GeometryIndex, min_zoom: u8, max_zoom: u8) -> Result<Self> {
        validate_zoom_bounds(min_zoom, max_zoom).map_err(TileError::Configuration)?;
        Ok(Self {
            db,
            geometry,
            min_zoom,
            max_zoom,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run discovery over the whole zoom range.
    ///
    /// Committed batches survive a failure part-way through; re-running picks
    /// up where the previous attempt stopped because inserts skip tiles that
    /// already exist.
    pub async fn run(&self) -> Result<DiscoveryReport> {
        let started = Instant::now();
        let tiles = self.db.tiles();
        let stats = self.db.stats();

        tracing::info!(
            "Discovering tiles for zoom {}..={} ({} region polygons)",
            self.min_zoom,
            self.max_zoom,
            self.geometry.polygon_count()
        );
        stats
            .apply(
                &StatsUpdate::replace()
                    .initialization_started(Utc::now())
                    .current_zoom(self.min_zoom),
            )
            .await?;

        let mut inserted = 0u64;
        for z in self.min_zoom..=self.max_zoom {
            let mut writer = BatchWriter::new(&tiles, &stats, z, self.batch_size);
            let level = if z == self.min_zoom {
                self.scan_level(&mut writer).await
            } else {
                self.expand_level(z, &mut writer).await
            };
            if let Err(e) = level {
                tracing::error!("Discovery failed at zoom {}: {}", z, e);
                return Err(e);
            }
            inserted += writer.inserted;
            tracing::info!("Zoom {}: {} new tiles", z, writer.inserted);
        }

        let total_tiles = tiles.count().await?;
        stats
            .apply(
                &StatsUpdate::replace()
                    .total_tiles(total_tiles)
                    .initialization_finished(Utc::now()),
            )
            .await?;

        let mut per_zoom = tiles.count_by_zoom().await?;
        per_zoom.retain(|z, _| (self.min_zoom..=self.max_zoom).contains(z));

        let report = DiscoveryReport {
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            per_zoom,
            inserted,
            total_tiles,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Discovery finished: {} new, {} total in {:.1}s",
            report.inserted,
            report.total_tiles,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Test every tile in the region's bounding box at the minimum zoom.
    async fn scan_level(&self, writer: &mut BatchWriter<'_>) -> Result<()> {
        let z = self.min_zoom;
        let (min, max) = self.geometry.tile_range(z);
        tracing::debug!(
            "Scanning zoom {} x={}..={} y={}..={}",
            z,
            min.x,
            max.x,
            min.y,
            max.y
        );

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                let tile = TileCoord::new(x, y, z);
                if self.geometry.intersects(tile) {
                    writer.push(tile, None).await?;
                }
            }
            tokio::task::yield_now().await;
        }
        writer.flush().await
    }

    /// Test the children of every stored tile at `z - 1`.
    async fn expand_level(&self, z: u8, writer: &mut BatchWriter<'_>) -> Result<()> {
        let tiles = self.db.tiles();
        let mut after_id = 0i64;

        loop {
            let parents = tiles.page_at_zoom(z - 1, after_id, PAGE_SIZE).await?;
            let Some(last) = parents.last() else {
                break;
            };
            after_id = last.id;

            for parent in &parents {
                for child in parent.coord.children() {
                    if self.geometry.intersects(child) {
                        writer.push(child, Some(parent.coord)).await?;
                    }
                }
            }
            tokio::task::yield_now().await;
        }
        writer.flush().await
    }
}

/// Buffers new tiles and commits them in fixed-size transactions.
struct BatchWriter<'a> {
    tiles: &'a TileRepository,
    stats: &'a StatsRepository,
    zoom: u8,
    capacity: usize,
    pending: Vec<(TileCoord, Option<TileCoord>)>,
    inserted: u64,
}

impl<'a> BatchWriter<'a> {
    fn new(tiles: &'a TileRepository, stats: &'a StatsRepository, zoom: u8, capacity: usize) -> Self {
        Self {
            tiles,
            stats,
            zoom,
            capacity,
            pending: Vec::with_capacity(capacity),
            inserted: 0,
        }
    }

    async fn push(&mut self, tile: TileCoord, parent: Option<TileCoord>) -> Result<()> {
        self.pending.push((tile, parent));
        if self.pending.len() >= self.capacity {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let inserted = self.tiles.insert_batch(&self.pending).await?;
        self.pending.clear();
        self.inserted += inserted;
        self.stats
            .apply(
                &StatsUpdate::increment()
                    .total_tiles(inserted)
                    .current_zoom(self.zoom),
            )
            .await?;
        tracing::debug!("Zoom {}: committed batch of {} tiles", self.zoom, inserted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::lon_lat_to_tile;
    use tempfile::tempdir;

    /// A square in Vienna well inside a single zoom-8 tile.
    const REGION: &str = r#"{
        "type": "Polygon",
        "coordinates": [[[16.30, 48.18], [16.42, 48.18], [16.42, 48.24], [16.30, 48.24], [16.30, 48.18]]]
    }"#;

    async fn setup() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_path(&dir.path().join("discovery.db"));
        ctx.init_schema().await.unwrap();
        (ctx, dir)
    }

    #[tokio::test]
    async fn test_invalid_zoom_bounds() {
        let (ctx, _dir) = setup().await;
        let geometry = GeometryIndex::from_geojson_str(REGION).unwrap();
        assert!(matches!(
            DiscoveryEngine::new(ctx.clone(), geometry.clone(), 12, 10),
            Err(TileError::Configuration(_))
        ));
        assert!(matches!(
            DiscoveryEngine::new(ctx, geometry, 10, 30),
            Err(TileError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_discovery_follows_parents_and_is_idempotent() {
        let (ctx, _dir) = setup().await;
        let geometry = GeometryIndex::from_geojson_str(REGION).unwrap();
        let engine = DiscoveryEngine::new(ctx.clone(), geometry, 8, 12)
            .unwrap()
            .with_batch_size(7);

        let first = engine.run().await.unwrap();
        assert_eq!(first.tiles_at(8), 1);
        assert_eq!(
            ctx.tiles()
                .get(lon_lat_to_tile(16.36, 48.21, 8))
                .await
                .unwrap()
                .map(|t| t.parent),
            Some(None)
        );
        for z in 9..=12 {
            assert!(first.tiles_at(z) >= first.tiles_at(z - 1));
            assert!(first.tiles_at(z) <= first.tiles_at(z - 1) * 4);
        }
        assert_eq!(first.inserted, first.total_tiles);
        assert_eq!(ctx.tiles().count_orphans(8).await.unwrap(), 0);

        let stats = ctx.stats().get().await.unwrap();
        assert_eq!(stats.total_tiles, first.total_tiles);
        assert!(stats.initialization_end_time.is_some());

        let second = engine.run().await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.total_tiles, first.total_tiles);
        assert_eq!(second.per_zoom, first.per_zoom);
    }
}
