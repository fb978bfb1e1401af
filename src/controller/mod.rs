//! Lifecycle orchestration: discovery, then refresh.
//!
//! The controller owns the run-state machine. Discovery and refresh each
//! run as a single background task, and the state guards keep them from
//! overlapping. Status and settings reads never wait on either task.

mod state;
mod status;

pub use state::{RunEvent, RunState};
pub use status::{InitializationProgress, Status};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::coord::TileCoord;
use crate::discovery::{DiscoveryEngine, DiscoveryReport};
use crate::error::{Result, TileError};
use crate::geometry::GeometryIndex;
use crate::models::{RefreshSettings, SettingsUpdate, StatsUpdate, TileContent};
use crate::repository::DbContext;
use crate::scheduler::{RefreshReport, RefreshScheduler, TileSource};

/// What [`Controller::initialize`] did.
#[derive(Debug)]
pub enum InitializeOutcome {
    /// Storage was prepared; discovery was not requested.
    StorageOnly,
    /// Tiles already exist and `force` was not set.
    AlreadyInitialized,
    /// Discovery is running in the background.
    Started(JoinHandle<Result<DiscoveryReport>>),
}

#[derive(Clone)]
pub struct Controller {
    db: DbContext,
    region_path: PathBuf,
    source: Arc<dyn TileSource>,
    state: Arc<RwLock<RunState>>,
    settings: Arc<RwLock<RefreshSettings>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl Controller {
    /// Connect to the store, create the schema and load settings.
    pub async fn open(config: &Settings, source: Arc<dyn TileSource>) -> Result<Self> {
        let db = DbContext::connect_with_retry(
            &config.database_url(),
            config.connect_attempts,
            config.connect_delay(),
        )
        .await?;
        Self::with_context(db, config.region_path.clone(), source).await
    }

    /// Build a controller over an already connected store.
    pub async fn with_context(
        db: DbContext,
        region_path: PathBuf,
        source: Arc<dyn TileSource>,
    ) -> Result<Self> {
        db.init_schema().await?;
        db.settings().seed_defaults(&RefreshSettings::default()).await?;
        let settings = db.settings().current().await?;
        let has_tiles = db.tiles().count().await? > 0;
        let state = if has_tiles {
            RunState::Ready
        } else {
            RunState::Uninitialized
        };
        tracing::debug!("Controller opened in state {:?}", state);

        Ok(Self {
            db,
            region_path,
            source,
            state: Arc::new(RwLock::new(state)),
            settings: Arc::new(RwLock::new(settings)),
            cancel: Arc::new(Mutex::new(None)),
        })
    }

    pub fn db(&self) -> &DbContext {
        &self.db
    }

    pub async fn run_state(&self) -> RunState {
        *self.state.read().await
    }

    /// Prepare storage and, unless `database_only`, start discovery.
    ///
    /// Discovery is skipped when tiles already exist unless `force` is set.
    /// Region and zoom problems are reported here, before anything is
    /// spawned.
    pub async fn initialize(&self, force: bool, database_only: bool) -> Result<InitializeOutcome> {
        let was_initialized = {
            let mut state = self.state.write().await;
            let current = *state;
            *state = current.transition(RunEvent::BeginInitialize)?;
            current.is_initialized()
        };

        let prepared = self.prepare(force, database_only, was_initialized).await;
        match prepared {
            Ok(Some(engine)) => {
                self.apply(RunEvent::BeginDiscovery).await?;
                let state = self.state.clone();
                let handle = tokio::spawn(async move {
                    let result =
                        run_isolated("discovery", async move { engine.run().await }).await;
                    let event = match result {
                        Ok(_) => RunEvent::DiscoveryFinished,
                        Err(ref e) => {
                            tracing::error!("Tile discovery failed: {}", e);
                            RunEvent::InitializationFailed
                        }
                    };
                    apply_event(&state, event).await;
                    result
                });
                Ok(InitializeOutcome::Started(handle))
            }
            Ok(None) => {
                let has_tiles = self.db.tiles().count().await? > 0;
                self.apply(RunEvent::StorageReady { has_tiles }).await?;
                if database_only {
                    Ok(InitializeOutcome::StorageOnly)
                } else {
                    Ok(InitializeOutcome::AlreadyInitialized)
                }
            }
            Err(e) => {
                tracing::error!("Initialization failed: {}", e);
                self.apply(RunEvent::InitializationFailed).await?;
                Err(e)
            }
        }
    }

    /// Storage preparation plus the discovery engine, if discovery should run.
    async fn prepare(
        &self,
        force: bool,
        database_only: bool,
        was_initialized: bool,
    ) -> Result<Option<DiscoveryEngine>> {
        self.db.init_schema().await?;
        let settings = self.reload_settings().await?;

        if database_only {
            tracing::info!("Database prepared");
            return Ok(None);
        }
        if was_initialized && !force {
            tracing::info!("Tiles already initialized; skipping discovery");
            return Ok(None);
        }

        let geometry = GeometryIndex::load(&self.region_path).await?;
        let engine =
            DiscoveryEngine::new(self.db.clone(), geometry, settings.min_zoom, settings.max_zoom)?;
        Ok(Some(engine))
    }

    /// Spawn the refresh scheduler. `limit` overrides `maxTilesToProcess`.
    pub async fn start_refresh(
        &self,
        limit: Option<u64>,
    ) -> Result<JoinHandle<Result<RefreshReport>>> {
        let token = CancellationToken::new();
        {
            let mut state = self.state.write().await;
            *state = state.transition(RunEvent::StartRefresh)?;
            *self.cancel.lock().await = Some(token.clone());
        }

        let scheduler = RefreshScheduler::new(self.db.clone(), self.source.clone(), token)
            .with_limit(limit);
        let state = self.state.clone();
        let cancel = self.cancel.clone();

        Ok(tokio::spawn(async move {
            let result = run_isolated("refresh", async move { scheduler.run().await }).await;
            if let Err(ref e) = result {
                tracing::error!("Refresh failed: {}", e);
            }
            cancel.lock().await.take();
            apply_event(&state, RunEvent::RefreshFinished).await;
            result
        }))
    }

    /// Ask a running refresh to stop after the in-flight tile.
    pub async fn stop_refresh(&self) -> Result<()> {
        if !self.state.read().await.is_running() {
            return Err(TileError::Conflict("refresh is not running".into()));
        }
        if let Some(token) = self.cancel.lock().await.as_ref() {
            tracing::info!("Stopping refresh");
            token.cancel();
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<Status> {
        let state = *self.state.read().await;
        let stats = self.db.stats().get().await?;

        let initialization_progress = if state == RunState::GeneratingTiles {
            let settings = self.settings.read().await;
            Some(InitializationProgress::from_stats(
                &stats,
                settings.min_zoom,
                settings.max_zoom,
                Utc::now(),
            ))
        } else {
            None
        };

        Ok(Status {
            is_initialized: state.is_initialized(),
            is_running: state.is_running(),
            current_operation: state.current_operation(),
            stats,
            initialization_progress,
        })
    }

    /// Stored settings merged over the defaults.
    pub async fn settings(&self) -> Result<RefreshSettings> {
        self.reload_settings().await
    }

    /// Validate and persist a partial update. Returns the merged settings.
    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<RefreshSettings> {
        let current = self.reload_settings().await?;
        let next = current.merge(update)?;
        self.db.settings().upsert(&update.to_entries()).await?;
        *self.settings.write().await = next.clone();
        tracing::info!("Settings updated: {:?}", update);
        Ok(next)
    }

    /// Current bytes of one tile.
    ///
    /// `z` must be inside the configured zoom range and `x`, `y` inside the
    /// `2^z` grid.
    pub async fn tile_content(&self, x: u32, y: u32, z: u8) -> Result<Option<TileContent>> {
        {
            let settings = self.settings.read().await;
            if z < settings.min_zoom || z > settings.max_zoom {
                return Err(TileError::Validation(format!(
                    "zoom {} outside configured range {}..={}",
                    z, settings.min_zoom, settings.max_zoom
                )));
            }
        }
        let coord = TileCoord::new(x, y, z);
        if !coord.is_within_grid() {
            return Err(TileError::Validation(format!(
                "tile {} outside the {}x{} grid",
                coord,
                coord.axis_len(),
                coord.axis_len()
            )));
        }

        Ok(self.db.content().get(coord).await?)
    }

    /// Delete every tile record and return to `Uninitialized`.
    ///
    /// Stored content and history are kept. The state reads `initializing`
    /// while the records are removed.
    pub async fn reset(&self) -> Result<u64> {
        self.apply(RunEvent::BeginReset).await?;

        match self.clear_tiles().await {
            Ok(deleted) => {
                self.apply(RunEvent::StorageReady { has_tiles: false }).await?;
                tracing::info!("Reset: removed {} tile records", deleted);
                Ok(deleted)
            }
            Err(e) => {
                tracing::error!("Reset failed: {}", e);
                let has_tiles = self.db.tiles().count().await.map_or(false, |n| n > 0);
                self.apply(RunEvent::StorageReady { has_tiles }).await?;
                Err(e)
            }
        }
    }

    async fn clear_tiles(&self) -> Result<u64> {
        let deleted = self.db.tiles().delete_all().await?;
        self.db
            .stats()
            .apply(&StatsUpdate::replace().total_tiles(0))
            .await?;
        Ok(deleted)
    }

    async fn reload_settings(&self) -> Result<RefreshSettings> {
        let settings = self.db.settings().current().await?;
        *self.settings.write().await = settings.clone();
        Ok(settings)
    }

    async fn apply(&self, event: RunEvent) -> Result<()> {
        let mut state = self.state.write().await;
        *state = state.transition(event)?;
        Ok(())
    }
}

/// Run `task` on its own tokio task so a panic comes back as
/// [`TileError::Task`] instead of unwinding through the caller.
async fn run_isolated<T, F>(name: &'static str, task: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => Err(TileError::Task(format!("{} task failed: {}", name, e))),
    }
}

async fn apply_event(state: &RwLock<RunState>, event: RunEvent) {
    let mut state = state.write().await;
    match state.transition(event) {
        Ok(next) => *state = next,
        Err(e) => tracing::warn!("Ignoring {:?} in state {:?}: {}", event, *state, e),
    }
}
