//! Initialize command.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::controller::{Controller, InitializeOutcome};

/// Prepare the database and run tile discovery.
pub async fn cmd_init(
    controller: &Controller,
    settings: &Settings,
    force: bool,
    database_only: bool,
) -> anyhow::Result<()> {
    match controller.initialize(force, database_only).await? {
        InitializeOutcome::StorageOnly => {
            println!(
                "{} Database ready at {}",
                style("✓").green(),
                settings.database_url()
            );
        }
        InitializeOutcome::AlreadyInitialized => {
            println!(
                "{} Tiles already discovered (use --force to run discovery again)",
                style("!").yellow()
            );
        }
        InitializeOutcome::Started(mut handle) => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            pb.set_message(format!(
                "Discovering tiles in {}...",
                settings.region_path.display()
            ));
            pb.enable_steady_tick(Duration::from_millis(120));

            let report = loop {
                tokio::select! {
                    joined = &mut handle => {
                        let report = joined?;
                        break report;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {
                        if let Ok(status) = controller.status().await {
                            if let Some(p) = status.initialization_progress {
                                pb.set_message(format!(
                                    "Zoom {}/{} ({:.0}%), {} tiles",
                                    p.current_zoom.unwrap_or(p.min_zoom),
                                    p.max_zoom,
                                    p.zoom_percentage,
                                    p.tiles_discovered
                                ));
                            }
                        }
                    }
                }
            };
            pb.finish_and_clear();
            let report = report?;

            println!(
                "{} Discovered {} tiles ({} new) in {:.1}s",
                style("✓").green(),
                report.total_tiles,
                report.inserted,
                report.elapsed.as_secs_f64()
            );
            for (z, count) in &report.per_zoom {
                println!("  {:>4}  {}", style(format!("z{}", z)).cyan(), count);
            }
        }
    }

    Ok(())
}
