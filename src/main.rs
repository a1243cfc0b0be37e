use possim::{init_logging, Monitor, SettingsPersistence, BUILD_DATE, VERSION};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => SettingsPersistence::default_path()?,
    };
    let settings = SettingsPersistence::load_or_default(&path)?;

    // Initialize logging
    init_logging(&settings.config().logging)?;
    tracing::info!("possim {} (built {})", VERSION, BUILD_DATE);
    tracing::info!("Configuration: {}", settings.path().display());

    let monitor = Monitor::from_config(settings.config())?;
    if monitor.devices().is_empty() {
        tracing::warn!("No devices configured");
        return Ok(());
    }
    monitor.log_events();

    // Claims block until the first poll cycle of each connection
    let monitor = tokio::task::spawn_blocking(move || {
        let failed = monitor.claim_all(None);
        if !failed.is_empty() {
            tracing::warn!("{} device(s) could not be claimed", failed.len());
        }
        monitor
    })
    .await?;

    tracing::info!(
        "Monitoring {} device(s) on {} connection(s), Ctrl-C to stop",
        monitor.devices().len(),
        monitor.connection_count()
    );
    tokio::signal::ctrl_c().await?;

    tokio::task::spawn_blocking(move || monitor.release_all()).await?;
    tracing::info!("Stopped");
    Ok(())
}
