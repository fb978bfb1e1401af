//! Configuration management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "tiles.db";

/// Default region file, resolved against the data directory.
pub const DEFAULT_REGION_FILENAME: &str = "region.geojson";

/// Default remote tile URL template.
pub const DEFAULT_TILE_URL: &str = "https://kataster.bev.gv.at/tiles/kataster/{z}/{x}/{y}.pbf";

/// Runtime settings resolved from defaults, the config file and the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var or config.
    pub database_url: Option<String>,
    /// GeoJSON file describing the target region.
    pub region_path: PathBuf,
    /// Remote tile URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub tile_url: String,
    /// User agent for tile requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Database connection attempts at startup.
    pub connect_attempts: u32,
    /// Initial backoff between connection attempts in milliseconds.
    pub connect_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilekeeper");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            region_path: data_dir.join(DEFAULT_REGION_FILENAME),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: std::env::var("DATABASE_URL").ok(),
            tile_url: DEFAULT_TILE_URL.to_string(),
            user_agent: crate::scheduler::USER_AGENT.to_string(),
            request_timeout: 30,
            connect_attempts: 5,
            connect_delay_ms: 200,
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Region GeoJSON path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Tile URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_url: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_delay_ms: Option<u64>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers tilekeeper config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("tilekeeper").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// Paths starting with `~/` are expanded against the home directory.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let path = match path_str.strip_prefix("~/") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => PathBuf::from(path_str),
            },
            None => PathBuf::from(path_str),
        };

        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.region_path = settings.data_dir.join(DEFAULT_REGION_FILENAME);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref url) = self.database_url {
            if std::env::var("DATABASE_URL").is_err() {
                settings.database_url = Some(url.clone());
            }
        }
        if let Some(ref region) = self.region {
            settings.region_path = self.resolve_path(region, base_dir);
        }
        if let Some(ref tile_url) = self.tile_url {
            settings.tile_url = tile_url.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(attempts) = self.connect_attempts {
            settings.connect_attempts = attempts;
        }
        if let Some(delay) = self.connect_delay_ms {
            settings.connect_delay_ms = delay;
        }
    }

    /// Resolve runtime settings, with relative paths anchored at the config
    /// file's directory (or the current directory).
    pub fn to_settings(&self) -> Settings {
        let base_dir = self
            .base_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut settings = Settings::default();
        self.apply_to_settings(&mut settings, &base_dir);
        settings
    }
}
