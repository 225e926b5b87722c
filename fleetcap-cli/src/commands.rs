use std::path::PathBuf;
use std::time::Duration;
use anyhow::{bail, Context};
use tokio::io::{AsyncBufRead, AsyncWrite};
use fleetcap_lib::analysis_tools::packet_capture::{Mergecap, Wireshark};
use fleetcap_lib::aws::control_plane::AwsControlPlane;
use fleetcap_lib::aws::executor::AwsRemoteExecutor;
use fleetcap_lib::aws::s3::AwsS3Store;
use fleetcap_lib::aws::{connect_command, sso, AwsCli};
use fleetcap_lib::discovery::discover;
use fleetcap_lib::orchestration::orchestrator::{CapturePlan, CaptureRun, RunOutcome, RunStatus};
use fleetcap_lib::target::Target;
use fleetcap_schemas::capture_config::{CaptureConfig, ServiceSelector};
use fleetcap_schemas::cli_models::{CaptureCmd, SelectionArgs};
use crate::prompt::Prompt;
use crate::stop_signal::TerminalStopSignal;

/// Who and what a command runs against, from the flags or asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub profile: String,
    pub environment: String,
    pub service: ServiceSelector,
}

pub async fn select<R, W>(
    config: &CaptureConfig,
    args: &SelectionArgs,
    prompt: &mut Prompt<R, W>,
) -> anyhow::Result<Selection>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let profile = match &args.profile {
        Some(profile) => profile.clone(),
        None => {
            let config_file = sso::default_aws_config_file().context("could not find the aws config file")?;
            let profiles = sso::list_profiles(&config_file).await?;
            prompt.choose("AWS profile", &profiles).await?
        }
    };

    let environment = match &args.env {
        Some(env) => {
            config.check_environment(env)?;
            env.clone()
        }
        None => match config.infer_environment(&profile) {
            Some(env) => {
                tracing::info!("using environment {env} for profile {profile}");
                env
            }
            None => prompt.choose("environment", &config.environments()).await?,
        },
    };

    let service = match &args.service {
        Some(name) => config.find_selector(name)?,
        None => {
            let names: Vec<String> = config.resolve_selectors().iter().map(|s| s.name()).collect();
            let name = prompt.choose("service", &names).await?;
            config.find_selector(&name)?
        }
    };
    Ok(Selection { profile, environment, service })
}

/// Log in through SSO unless the cached session is still good
pub async fn ensure_session(profile: &str) -> anyhow::Result<()> {
    let Some(cache_dir) = sso::default_sso_cache_dir() else {
        tracing::warn!("HOME is not set, skipping the SSO session check");
        return Ok(());
    };
    if sso::is_session_valid(&cache_dir, chrono::Utc::now()).await? {
        tracing::debug!("SSO session is valid");
        return Ok(());
    }
    tracing::info!("no valid SSO session, logging in");
    sso::login(profile).await
}

fn print_targets(targets: &[Target]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(targets)?);
    Ok(())
}

pub async fn capture<R, W>(
    config: &CaptureConfig,
    cmd: &CaptureCmd,
    mut prompt: Prompt<R, W>,
) -> anyhow::Result<i32>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let selection = select(config, &cmd.selection, &mut prompt).await?;
    ensure_session(&selection.profile).await?;

    let mut plan = CapturePlan::from_config(config, &selection.profile, &selection.environment, selection.service)?;
    if let Some(dir) = &cmd.output_dir {
        plan.base_dir = PathBuf::from(dir);
    }
    if let Some(timeout) = cmd.timeout {
        plan.settings.command_timeout_secs = timeout;
    }
    plan.open_viewer = !cmd.no_viewer;

    let cli = AwsCli::new(&plan.profile, plan.command_timeout());
    let download_cli = AwsCli::new(&plan.profile, plan.download_timeout());
    let merge_tool = Mergecap { binary: plan.settings.merge_tool.clone(), timeout: plan.download_timeout() };
    let viewer = Wireshark { binary: plan.settings.viewer.clone() };
    let run = CaptureRun::new(
        plan,
        Box::new(AwsControlPlane::new(cli.clone())),
        Box::new(AwsRemoteExecutor::new(cli)),
        Box::new(AwsS3Store::new(download_cli)),
        Box::new(merge_tool),
        Some(Box::new(viewer)),
    );

    let targets = run.discover().await?;
    if targets.is_empty() {
        let plan = run.plan();
        println!("No targets found for {} in {} ({:?})", plan.service.name(), plan.environment, plan.regions);
    } else {
        print_targets(&targets)?;
        if !cmd.yes {
            prompt.wait_for_enter(&format!("Press Enter to start capturing on {} targets", targets.len())).await?;
        }
    }

    let (reader, writer) = prompt.into_parts();
    let mut stop = TerminalStopSignal::install(reader, writer);
    let outcome = run.capture(&targets, &mut stop).await;
    report(&outcome);
    Ok(outcome.exit_code())
}

fn report(outcome: &RunOutcome) {
    if outcome.status == RunStatus::NoTargets {
        return;
    }
    println!("{}", outcome.report);
    match &outcome.status {
        RunStatus::Merged { artifact, .. } => println!("Capture saved to {}", artifact.display()),
        RunStatus::Interrupted => println!("Interrupted, captures were staged to the bucket but not downloaded"),
        _ => {}
    }
}

pub async fn connect<R, W>(config: &CaptureConfig, args: &SelectionArgs, mut prompt: Prompt<R, W>) -> anyhow::Result<i32>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let selection = select(config, args, &mut prompt).await?;
    ensure_session(&selection.profile).await?;
    let regions = config.regions_for(&selection.environment)?;
    let cli = AwsCli::new(&selection.profile, Duration::from_secs(config.capture.command_timeout_secs));
    let targets = discover(&AwsControlPlane::new(cli), regions, &selection.service).await?;
    if targets.is_empty() {
        println!("No targets found for {} in {}", selection.service.name(), selection.environment);
        return Ok(2);
    }
    for target in &targets {
        println!("# {target}");
        println!("{}", connect_command(target, &selection.profile));
    }
    Ok(0)
}

pub fn services(config: &CaptureConfig) -> anyhow::Result<i32> {
    for selector in config.resolve_selectors() {
        println!("{:<30} {} {}", selector.name(), selector.kind, selector.selector);
    }
    Ok(0)
}

pub async fn profiles() -> anyhow::Result<i32> {
    let Some(config_file) = sso::default_aws_config_file() else {
        bail!("could not find the aws config file, set HOME or AWS_CONFIG_FILE");
    };
    for profile in sso::list_profiles(&config_file).await? {
        println!("{profile}");
    }
    Ok(0)
}
