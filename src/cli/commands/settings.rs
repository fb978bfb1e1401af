//! Settings commands.

use console::style;

use crate::controller::Controller;
use crate::models::SettingsUpdate;

pub async fn cmd_settings_show(controller: &Controller, json: bool) -> anyhow::Result<()> {
    let settings = controller.settings().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    for (key, value) in settings.to_entries() {
        println!("{:<20} {}", style(key).cyan(), value);
    }
    Ok(())
}

pub async fn cmd_settings_set(controller: &Controller, pairs: &[String]) -> anyhow::Result<()> {
    let parsed = pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{}'", pair))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let update = SettingsUpdate::from_pairs(&parsed)?;
    controller.update_settings(&update).await?;

    for (key, value) in update.to_entries() {
        println!("{} {} = {}", style("✓").green(), key, value);
    }
    Ok(())
}
