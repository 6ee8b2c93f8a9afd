//! Standalone entry point: claims and anchors one batch of READY requests
//! (spec §6 `anchorReadyRequests`). Exits non-zero on fatal error.

use anchor_sequencer::app::App;
use anchor_sequencer::cli::CommonArgs;
use anchor_sequencer::config::{load_config, ServiceConfig};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommonArgs::parse();
    args.logging.init_tracing();

    if !ServiceConfig::is_test_mode() {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    let config = load_config(args.config.as_deref())?;
    let app = App::new(config).await?;

    match app.run_batch().await {
        Ok(Some(outcome)) => {
            tracing::info!(?outcome, "batch processed");
            Ok(())
        }
        Ok(None) => {
            tracing::info!("no eligible requests, nothing to do");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
