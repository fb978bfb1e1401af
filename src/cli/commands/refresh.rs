//! Refresh command.

use console::style;

use crate::controller::Controller;
use crate::scheduler::StopReason;

/// Run the refresh scheduler in the foreground until it stops.
pub async fn cmd_refresh(controller: &Controller, limit: Option<u64>) -> anyhow::Result<()> {
    let mut handle = controller.start_refresh(limit).await?;
    println!(
        "{} Refreshing tiles (Ctrl-C to stop after the current tile)",
        style("→").cyan()
    );

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            println!("{} Stopping...", style("!").yellow());
            controller.stop_refresh().await?;
            handle.await
        }
    };
    let report = joined??;

    let marker = match report.stop_reason {
        StopReason::Exhausted => style("✓").green(),
        StopReason::LimitReached | StopReason::Stopped => style("!").yellow(),
    };
    println!("{} Refresh {}", marker, report.stop_reason);
    println!("  Processed: {}", report.processed);
    println!("  Updated:   {}", report.updated);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Errors:    {}", report.errors);
    if report.remaining > 0 {
        println!("  Remaining: {}", report.remaining);
    }

    Ok(())
}
