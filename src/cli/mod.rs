//! Shared CLI scaffolding for the three standalone entry points (spec §6):
//! log setup and the config-file flag, grounded on the teacher's
//! `src/cli/logging.rs` but rebuilt around `clap` derive args and
//! `tracing-subscriber`'s `EnvFilter`, matching the rest of this crate's
//! dependency stack rather than the teacher's legacy `structopt`/`eyre`
//! layer.

pub mod logging;

use std::path::PathBuf;

use clap::Parser;

/// Options shared by `anchor-ready-requests`, `emit-anchor-event-if-ready`,
/// and `garbage-collect-pinned-streams`.
#[derive(Debug, Parser)]
pub struct CommonArgs {
    /// Path to a TOML config file; overridden by `CAS__`-prefixed env vars.
    #[clap(long, env = "CAS_CONFIG")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub logging: logging::Args,
}
