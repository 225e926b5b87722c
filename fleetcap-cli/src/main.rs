mod commands;
mod logging;
mod prompt;
mod stop_signal;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::level_filters::LevelFilter;
use fleetcap_schemas::capture_config::CaptureConfig;
use fleetcap_schemas::cli_models::{Opts, SubCommand};
use crate::logging::{configure_logging, log_level};
use crate::prompt::Prompt;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    // exit from inside the runtime, a stdin read left pending by the stop prompt would otherwise
    // hold up runtime shutdown
    std::process::exit(match run_app().await {
        Ok(code) => code,
        Err(err) => {
            // only logging setup fails here, so there is no subscriber to report through
            eprintln!("fleetcap: {:#}", err);
            1
        }
    });
}

/// Parse the options, set up logging and run the chosen sub command. Returns the exit code.
pub async fn run_app() -> anyhow::Result<i32> {
    let opts: Opts = Opts::parse();
    let mut e = None;
    let level = match &opts.verbosity {
        None => LevelFilter::INFO,
        Some(x) => match log_level(x) {
            Ok(l) => l,
            Err(err) => {
                e = Some(err);
                LevelFilter::INFO
            }
        },
    };
    let _guard = configure_logging(level, opts.log_file.as_deref())?;
    if let Some(e) = e {
        tracing::warn!("{}", e);
    }

    tracing::debug!("running {}", opts.sub_command.name());
    match parse_command(opts).await {
        Ok(code) => Ok(code),
        Err(err) => {
            tracing::error!("ERROR: {}", err);
            err.chain().skip(1).for_each(|cause| tracing::error!("because: {}", cause));
            Ok(1)
        }
    }
}

pub async fn parse_command(opts: Opts) -> anyhow::Result<i32> {
    // profiles doesn't need the capture config
    if let SubCommand::Profiles = &opts.sub_command {
        return commands::profiles().await;
    }

    let config = CaptureConfig::load_from_file(&opts.config).await
        .with_context(|| format!("loading {}", opts.config))?;
    tracing::trace!("config: {config}");
    let prompt = Prompt::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());

    match &opts.sub_command {
        SubCommand::Capture(cmd) => commands::capture(&config, cmd, prompt).await,
        SubCommand::Connect(args) => commands::connect(&config, args, prompt).await,
        SubCommand::Services => commands::services(&config),
        SubCommand::Profiles => commands::profiles().await,
    }
}
