use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{anyhow, Context};
use futures_util::future::join_all;
use serde::Serialize;
use fleetcap_schemas::capture_config::BucketConfig;
use crate::format_path_component;
use crate::orchestration::StageSummary;
use crate::remote::commands::object_key;
use crate::state::SessionMap;
use crate::storage::ObjectStore;

/// What happened to one target's download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Collected(PathBuf),
    Failed {
        reason: String,
    },
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    #[serde(flatten)]
    pub summary: StageSummary,
    /// local captures that downloaded completely, in target id order
    pub files: Vec<PathBuf>,
}

/// Download the staged capture of every stopped session into `local_dir`. A download that fails
/// is recorded on its session and the batch carries on. `local_dir` is only created if there is
/// something to download.
pub async fn collect_all(
    sessions: &mut SessionMap<'_>,
    store: &dyn ObjectStore,
    bucket: &BucketConfig,
    local_dir: &Path,
    timeout: Duration,
) -> CollectionReport {
    let stopped: Vec<_> = sessions.values()
        .filter(|s| s.is_stopped())
        .map(|s| s.target)
        .collect();
    let mut report = CollectionReport::default();
    if stopped.is_empty() {
        tracing::info!("Stage: nothing was staged, skipping downloads");
        return report;
    }
    tracing::info!("Stage: downloading {} captures from {} into {}", stopped.len(), bucket.name, local_dir.display());

    let file_names = local_file_names(stopped.iter().map(|t| t.id.as_str()));
    let outcomes = match tokio::fs::create_dir_all(local_dir).await {
        Ok(_) => {
            let downloads = stopped.iter().zip(&file_names).map(|(target, file_name)| async move {
                let final_path = local_dir.join(file_name);
                (target.id.as_str(), download_one(store, bucket, &target.id, &final_path, timeout).await)
            });
            join_all(downloads).await
        }
        Err(err) => {
            let reason = format!("could not create {}: {err}", local_dir.display());
            tracing::error!("{reason}");
            stopped.iter()
                .map(|t| (t.id.as_str(), CollectOutcome::Failed { reason: reason.clone() }))
                .collect()
        }
    };

    for (id, outcome) in outcomes {
        let Some(session) = sessions.get_mut(id) else { continue };
        match outcome {
            CollectOutcome::Collected(path) => {
                tracing::debug!("collected {id} into {}", path.display());
                report.files.push(path.clone());
                session.local_path = Some(path);
                report.summary.record(true);
            }
            CollectOutcome::Failed { reason } => {
                tracing::warn!("could not download the capture of {id}: {reason}");
                session.download_failure = Some(reason);
                report.summary.record(false);
            }
        }
    }
    report.files.sort();
    tracing::info!("download: {}", report.summary);
    report
}

/// Local file name for each target id, in the same order. Ids that only differ in characters
/// replaced by `format_path_component` get a numeric suffix so no capture overwrites another.
fn local_file_names<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    ids.into_iter().map(|id| {
        let base = format_path_component(id);
        let mut name = object_key(&base);
        let mut n = 2;
        while taken.contains(&name) {
            name = object_key(&format!("{base}-{n}"));
            n += 1;
        }
        taken.insert(name.clone());
        name
    }).collect()
}

async fn download_one(
    store: &dyn ObjectStore,
    bucket: &BucketConfig,
    target_id: &str,
    final_path: &Path,
    timeout: Duration,
) -> CollectOutcome {
    match try_download(store, bucket, target_id, final_path, timeout).await {
        Ok(path) => CollectOutcome::Collected(path),
        Err(err) => CollectOutcome::Failed { reason: format!("{err:#}") },
    }
}

/// Downloads go to a temporary file next to the final one and are renamed into place once
/// complete. On any error, timeout included, the temporary file is dropped and with it deleted.
async fn try_download(
    store: &dyn ObjectStore,
    bucket: &BucketConfig,
    target_id: &str,
    final_path: &Path,
    timeout: Duration,
) -> anyhow::Result<PathBuf> {
    let key = object_key(target_id);
    let local_dir = final_path.parent().unwrap_or(Path::new("."));
    let partial = tempfile::Builder::new()
        .prefix(".fleetcap-")
        .suffix(".part")
        .tempfile_in(local_dir)
        .context("creating a temporary download file")?;

    tokio::time::timeout(timeout, store.download(&bucket.name, &key, &bucket.region, partial.path()))
        .await
        .map_err(|_| anyhow!("download of s3://{}/{key} timed out after {timeout:?}", bucket.name))??;

    partial.persist_noclobber(final_path)
        .map_err(|e| e.error)
        .with_context(|| format!("moving the download to {}", final_path.display()))?;
    Ok(final_path.to_path_buf())
}
