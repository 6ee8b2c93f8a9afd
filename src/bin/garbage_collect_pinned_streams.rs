//! Standalone entry point: `garbageCollectPinnedStreams` (spec §6).

use anchor_sequencer::app::App;
use anchor_sequencer::cli::CommonArgs;
use anchor_sequencer::config::load_config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommonArgs::parse();
    args.logging.init_tracing();

    let config = load_config(args.config.as_deref())?;
    let app = App::new(config).await?;

    let collected = app.garbage_collect_pinned_streams().await?;
    tracing::info!(count = collected.len(), "garbage collection finished");
    Ok(())
}
