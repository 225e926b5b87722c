use std::path::PathBuf;
use std::time::Duration;
use fleetcap_schemas::capture_config::{BucketConfig, CaptureConfig, CaptureSettings, ConfigError, ServiceSelector};
use crate::analysis_tools::{MergeTool, Viewer};
use crate::discovery::{discover, DiscoveryError, FleetControlPlane};
use crate::orchestration::collector::collect_all;
use crate::orchestration::controller::{stop_and_stage_all, StopReason, StopSignal};
use crate::orchestration::launcher::{launch_all, launch_summary};
use crate::orchestration::merge::{merge_and_open, MergeError, ViewerOutcome};
use crate::orchestration::report::RunReport;
use crate::orchestration::run_dir::RunDirectory;
use crate::remote::commands::CaptureCommands;
use crate::remote::RemoteExecutor;
use crate::state::RunContext;
use crate::storage::ObjectStore;
use crate::target::Target;

/// Everything decided before a run starts. Built once from the config and the operator's
/// choices, then passed to the run, nothing reads the config after this.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub profile: String,
    pub environment: String,
    pub service: ServiceSelector,
    pub regions: Vec<String>,
    pub bucket: BucketConfig,
    pub settings: CaptureSettings,
    pub base_dir: PathBuf,
    pub open_viewer: bool,
}

impl CapturePlan {
    pub fn from_config(
        config: &CaptureConfig,
        profile: &str,
        environment: &str,
        service: ServiceSelector,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            profile: profile.to_string(),
            environment: environment.to_string(),
            service,
            regions: config.regions_for(environment)?.to_vec(),
            bucket: config.bucket_for(environment)?.clone(),
            settings: config.capture.clone(),
            base_dir: PathBuf::from(&config.capture.pcap_dir),
            open_viewer: true,
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.command_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.download_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// discovery found nothing, no remote command was issued
    NoTargets,
    /// captures were stopped because the process is exiting, nothing was downloaded
    Interrupted,
    NothingToMerge,
    Merged {
        artifact: PathBuf,
        viewer: ViewerOutcome,
    },
    MergeFailed(String),
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub status: RunStatus,
}

impl RunOutcome {
    /// A viewer that didn't start still counts as a completed run
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Merged { .. } => 0,
            RunStatus::NoTargets | RunStatus::NothingToMerge => 2,
            RunStatus::Interrupted | RunStatus::MergeFailed(_) => 1,
        }
    }
}

/// One capture run and the collaborators it talks to
pub struct CaptureRun {
    plan: CapturePlan,
    control_plane: Box<dyn FleetControlPlane>,
    executor: Box<dyn RemoteExecutor>,
    store: Box<dyn ObjectStore>,
    merge_tool: Box<dyn MergeTool>,
    viewer: Option<Box<dyn Viewer>>,
}

impl CaptureRun {
    pub fn new(
        plan: CapturePlan,
        control_plane: Box<dyn FleetControlPlane>,
        executor: Box<dyn RemoteExecutor>,
        store: Box<dyn ObjectStore>,
        merge_tool: Box<dyn MergeTool>,
        viewer: Option<Box<dyn Viewer>>,
    ) -> Self {
        Self { plan, control_plane, executor, store, merge_tool, viewer }
    }

    pub fn plan(&self) -> &CapturePlan {
        &self.plan
    }

    pub async fn discover(&self) -> Result<Vec<Target>, DiscoveryError> {
        discover(self.control_plane.as_ref(), &self.plan.regions, &self.plan.service).await
    }

    /// Discover, then capture on whatever was found
    pub async fn execute(&self, stop: &mut dyn StopSignal) -> Result<RunOutcome, DiscoveryError> {
        let targets = self.discover().await?;
        Ok(self.capture(&targets, stop).await)
    }

    /// Launch on every target, wait for `stop`, stop and stage, download, merge and open. Each
    /// stage waits for all of its targets before the next one starts.
    pub async fn capture(&self, targets: &[Target], stop: &mut dyn StopSignal) -> RunOutcome {
        let plan = &self.plan;
        let run_dir = RunDirectory::for_now(&plan.base_dir, plan.service.service_name(), &plan.environment);
        let mut context = RunContext::new(&plan.profile, &plan.environment, plan.service.clone(), run_dir);

        if targets.is_empty() {
            tracing::warn!("no targets found for {} in {}", plan.service.name(), plan.environment);
            return RunOutcome { report: RunReport::from_context(&context, 0), status: RunStatus::NoTargets };
        }

        let commands = CaptureCommands::new(&plan.settings, &plan.service, &plan.bucket);
        context.sessions = launch_all(targets, self.executor.as_ref(), &commands, plan.command_timeout()).await;
        let launch = launch_summary(&context.sessions);

        let reason = if launch.succeeded == 0 {
            tracing::warn!("no capture started, skipping the stop prompt");
            StopReason::Operator
        } else {
            match stop.wait().await {
                Ok(reason) => reason,
                Err(err) => {
                    tracing::error!("lost the stop prompt ({err:#}), stopping the captures");
                    StopReason::Interrupted
                }
            }
        };

        let stop_summary = stop_and_stage_all(
            &mut context.sessions,
            self.executor.as_ref(),
            &commands,
            plan.command_timeout(),
        ).await;

        if reason == StopReason::Interrupted {
            let mut report = RunReport::from_context(&context, targets.len());
            report.launch = launch;
            report.stop = stop_summary;
            report.interrupted = true;
            return RunOutcome { report, status: RunStatus::Interrupted };
        }

        let collection = collect_all(
            &mut context.sessions,
            self.store.as_ref(),
            &plan.bucket,
            context.run_dir.path(),
            plan.download_timeout(),
        ).await;

        let mut report = RunReport::from_context(&context, targets.len());
        report.launch = launch;
        report.stop = stop_summary;
        report.collect = collection.summary;

        let viewer = if plan.open_viewer { self.viewer.as_deref() } else { None };
        let merged_file = context.run_dir.merged_file();
        let status = match merge_and_open(
            self.merge_tool.as_ref(),
            viewer,
            &collection.files,
            &merged_file,
            &plan.settings.viewer_filter,
        ).await {
            Ok(viewer) => {
                report.merged = Some(merged_file.clone());
                report.viewer = Some(viewer.to_string());
                RunStatus::Merged { artifact: merged_file, viewer }
            }
            Err(MergeError::NothingToMerge) => {
                tracing::warn!("{}", MergeError::NothingToMerge);
                report.merge_error = Some(MergeError::NothingToMerge.to_string());
                RunStatus::NothingToMerge
            }
            Err(err) => {
                tracing::error!("{err}");
                report.merge_error = Some(err.to_string());
                RunStatus::MergeFailed(err.to_string())
            }
        };

        match report.write_json(&context.run_dir.report_file()).await {
            Ok(true) => tracing::info!("run report written to {}", context.run_dir.report_file().display()),
            Ok(false) => {}
            Err(err) => tracing::warn!("{err:#}"),
        }
        RunOutcome { report, status }
    }
}
