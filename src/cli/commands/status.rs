//! Status command.

use console::style;

use crate::controller::Controller;

pub async fn cmd_status(controller: &Controller, json: bool) -> anyhow::Result<()> {
    let status = controller.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let state = match (status.is_initialized, status.current_operation) {
        (_, Some(op)) => style(op.to_string()).cyan(),
        (true, None) => style("ready".to_string()).green(),
        (false, None) => style("uninitialized".to_string()).yellow(),
    };
    println!("{}", style("Tilekeeper Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<16} {}", "State:", state);
    println!("{:<16} {}", "Tiles:", status.stats.total_tiles);
    println!("{:<16} {}", "With content:", status.stats.processed_tiles);
    println!("{:<16} {}", "Updated:", status.stats.updated_tiles);
    if let Some(z) = status.stats.current_zoom {
        println!("{:<16} {}", "Current zoom:", z);
    }
    match status.stats.last_update {
        Some(at) => println!("{:<16} {}", "Last update:", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("{:<16} {}", "Last update:", style("never").dim()),
    }
    if let Some(p) = status.initialization_progress {
        println!(
            "{:<16} zoom {:?} of {}..={} ({:.0}%), {} tiles, {:.0}s",
            "Discovery:",
            p.current_zoom,
            p.min_zoom,
            p.max_zoom,
            p.zoom_percentage,
            p.tiles_discovered,
            p.elapsed_seconds
        );
    }

    Ok(())
}
