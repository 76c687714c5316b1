mod app;
mod cli;
mod error;
mod notify;
mod telemetry;

use crate::app::App;
use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use addons_config::Config;
use clap::Parser;
use exn::ResultExt;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            if err.is_retryable() {
                eprintln!("The failure may be temporary; running the command again could succeed.");
            }
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    telemetry::init(cli.verbose)?;
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let app = App::open(&config).await?;
    let result = app.run(cli.command).await;
    app.close().await;
    result
}
