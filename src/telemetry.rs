//! Log output for the command-line binary.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Warnings by default, then info, debug and trace for each `-v`. `RUST_LOG`
/// takes precedence when set.
pub fn init(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose > 1))
        .try_init()
        .or_raise(|| ErrorKind::Telemetry)
}
