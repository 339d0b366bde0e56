//! cleanroom - stage and commit build configuration
//!
//! Main entry point for the command-line stager.
//!
//! # Execution Flow
//!
//! 1. Load settings for the current directory (`cleanroom.toml`, `CLEANROOM_*`)
//! 2. Initialize logging → `<log_dir>/cleanroom.<date>`
//! 3. Create tokio runtime
//! 4. Load the existing configuration document, or start an empty one
//! 5. Stage the configuration directory and the document on an [`FsQueue`]
//! 6. Commit the queue, logging lifecycle events as they arrive
//!
//! [`FsQueue`]: cleanroom::FsQueue

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use cleanroom::{
    APP_NAME, ConfigurationStore, StagerSettings, TokioFileSystem, VERSION, WarningChannel,
};
use cleanroom::state::log_events;
use std::sync::Arc;

fn main() -> Result<()> {
    let current_dir = std::env::current_dir().context("Failed to read current directory")?;
    let project_root = Utf8PathBuf::try_from(current_dir)
        .context("Current directory is not valid UTF-8")?;

    let settings = StagerSettings::load(&project_root)?;
    let _log_guard = cleanroom::logging::setup_logging_with_console(
        &settings.project_root.join(&settings.log_dir),
        APP_NAME,
        settings.debug,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("cleanroom-worker")
        .build()?;

    let result = runtime.block_on(run(settings));
    if let Err(e) = &result {
        tracing::error!("Staging failed: {:#}", e);
    }

    result
}

async fn run(settings: StagerSettings) -> Result<()> {
    let store = ConfigurationStore::new(&settings)?;
    let document = store.load().await?;

    let warnings = WarningChannel::new();
    let mut queue = store.queue(Arc::new(TokioFileSystem), warnings.clone())?;

    let listener = tokio::spawn(log_events(queue.subscribe()));

    store.stage(&mut queue, &document)?;
    let outcome = queue.commit().await;

    // The sender lives in the queue; dropping it ends the listener on failure.
    drop(queue);
    let _ = listener.await;

    outcome.with_context(|| format!("Failed to write {}", store.path()))?;
    tracing::info!(
        "Configuration written to {} ({} warning(s))",
        store.path(),
        warnings.emitted()
    );
    Ok(())
}
