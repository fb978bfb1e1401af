//! Tile lookup command.

use std::path::Path;

use console::style;

use crate::controller::Controller;

pub async fn cmd_tile(
    controller: &Controller,
    x: u32,
    y: u32,
    z: u8,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let Some(tile) = controller.tile_content(x, y, z).await? else {
        anyhow::bail!("tile {}/{}/{} has no stored content", z, x, y);
    };

    if let Some(path) = output {
        tokio::fs::write(path, &tile.data).await?;
        println!(
            "{} Wrote {} bytes to {}",
            style("✓").green(),
            tile.data.len(),
            path.display()
        );
        return Ok(());
    }

    println!("{}", style(format!("Tile {}", tile.coord)).bold());
    println!("  Size:          {} bytes", tile.data.len());
    println!("  SHA-256:       {}", tile.hash);
    println!(
        "  Last modified: {}",
        tile.last_modified.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
