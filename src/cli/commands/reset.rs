//! Reset command.

use console::style;

use crate::controller::Controller;

pub async fn cmd_reset(controller: &Controller, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        println!(
            "{} This deletes every discovered tile record. Re-run with --confirm.",
            style("!").yellow()
        );
        return Ok(());
    }

    let deleted = controller.reset().await?;
    println!(
        "{} Removed {} tile records; run `tilekeeper init` to discover again",
        style("✓").green(),
        deleted
    );
    Ok(())
}
