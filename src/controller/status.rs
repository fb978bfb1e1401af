//! Status projection returned by [`super::Controller::status`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ProgressStats;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_initialized: bool,
    pub is_running: bool,
    pub current_operation: Option<&'static str>,
    pub stats: ProgressStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_progress: Option<InitializationProgress>,
}

/// Discovery progress, present only while tiles are being generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationProgress {
    pub current_zoom: Option<u8>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tiles_discovered: u64,
    pub elapsed_seconds: f64,
    /// Share of zoom levels started, 0 to 100.
    pub zoom_percentage: f64,
}

impl InitializationProgress {
    pub fn from_stats(stats: &ProgressStats, min_zoom: u8, max_zoom: u8, now: DateTime<Utc>) -> Self {
        let levels = f64::from(max_zoom.saturating_sub(min_zoom)) + 1.0;
        let zoom_percentage = match stats.current_zoom {
            Some(z) if z >= min_zoom => {
                (f64::from(z - min_zoom) + 1.0).min(levels) / levels * 100.0
            }
            _ => 0.0,
        };
        let elapsed_seconds = stats
            .initialization_start_time
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        Self {
            current_zoom: stats.current_zoom,
            min_zoom,
            max_zoom,
            tiles_discovered: stats.total_tiles,
            elapsed_seconds,
            zoom_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_projection() {
        let now = Utc::now();
        let stats = ProgressStats {
            total_tiles: 120,
            current_zoom: Some(15),
            initialization_start_time: Some(now - chrono::Duration::seconds(30)),
            ..Default::default()
        };
        let progress = InitializationProgress::from_stats(&stats, 14, 16, now);
        assert_eq!(progress.tiles_discovered, 120);
        assert!((progress.zoom_percentage - 200.0 / 3.0).abs() < 1e-9);
        assert!((progress.elapsed_seconds - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_json_shape() {
        let status = Status {
            is_initialized: true,
            is_running: false,
            current_operation: None,
            stats: ProgressStats::default(),
            initialization_progress: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isInitialized"], true);
        assert_eq!(json["stats"]["totalTiles"], 0);
        assert!(json["currentOperation"].is_null());
        assert!(json.get("initializationProgress").is_none());
        assert!(json["stats"].get("initializationStartTime").is_none());
    }
}
