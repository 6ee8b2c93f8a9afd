//! Logging setup, grounded on the teacher's `src/cli/logging.rs` (a
//! verbosity-counted CLI flag plus a `--log-format`/`--log-filter` pair
//! feeding a `tracing_subscriber` layer), rebuilt on `clap::Args` and
//! `EnvFilter` instead of the teacher's legacy `structopt`/`Targets` pair.

use std::str::FromStr;

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("invalid log format: {other}")),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Verbose mode (-v, -vv, -vvv).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// `tracing_subscriber::EnvFilter` directive string, e.g.
    /// `anchor_sequencer=debug`.
    #[clap(long, env = "CAS_LOG_FILTER", default_value = "")]
    log_filter: String,

    #[clap(long, env = "CAS_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

impl Args {
    fn default_directive(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Installs the global tracing subscriber. Call once, at process start.
    pub fn init_tracing(&self) {
        let filter = if self.log_filter.is_empty() {
            EnvFilter::new(self.default_directive())
        } else {
            EnvFilter::new(&self.log_filter)
        };

        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

        match self.log_format {
            LogFormat::Compact => subscriber.compact().init(),
            LogFormat::Pretty => subscriber.pretty().init(),
            LogFormat::Json => subscriber.json().init(),
        }
    }
}
