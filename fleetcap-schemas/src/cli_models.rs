use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use crate::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(version = "0.1", about = "Capture traffic across a fleet of ECS tasks or EC2 instances")]
pub struct Opts {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, help = "Configuration file")]
    pub config: String,
    #[arg(short, long)]
    pub verbosity: Option<String>,
    #[arg(long, help = "Also write logs to this file")]
    pub log_file: Option<String>,
    #[command(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Subcommand, Debug, Deserialize, Serialize)]
pub enum SubCommand {
    #[command(about = "Capture packets on every target of a service, then merge and open the result")]
    Capture(CaptureCmd),
    #[command(about = "Print the commands to open a shell on every target of a service")]
    Connect(SelectionArgs),
    #[command(about = "List the capture services in the config")]
    Services,
    #[command(about = "List the AWS profiles available locally")]
    Profiles,
}

impl SubCommand {
    pub fn name(&self) -> String {
        match &self {
            SubCommand::Capture(_) => "capture".into(),
            SubCommand::Connect(_) => "connect".into(),
            SubCommand::Services => "services".into(),
            SubCommand::Profiles => "profiles".into(),
        }
    }
}

/// Any selection not given here is asked for interactively.
#[derive(Args, Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SelectionArgs {
    #[arg(short, long, help = "AWS profile to use")]
    pub profile: Option<String>,
    #[arg(short, long, help = "Environment, as named in the config regions")]
    pub env: Option<String>,
    #[arg(short, long, help = "Service path, e.g. voice/sbc")]
    pub service: Option<String>,
}

#[derive(Args, Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CaptureCmd {
    #[command(flatten)]
    pub selection: SelectionArgs,
    #[arg(long, help = "Base folder for captures, overrides the config")]
    pub output_dir: Option<String>,
    #[arg(long, help = "Timeout in seconds for each remote command, overrides the config")]
    pub timeout: Option<u64>,
    #[arg(long, action, help = "Merge the captures but don't open the viewer")]
    pub no_viewer: bool,
    #[arg(short, long, action, help = "Start capturing without asking for confirmation")]
    pub yes: bool,
}
