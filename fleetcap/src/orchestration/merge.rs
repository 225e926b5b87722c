use std::fmt;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::analysis_tools::{MergeTool, Viewer};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no capture files were collected, there is nothing to merge")]
    NothingToMerge,
    #[error("merging captures into {output} failed: {reason}")]
    MergeToolFailed {
        output: PathBuf,
        reason: String,
    },
    #[error("merge tool exited cleanly but {0} was not written")]
    OutputMissing(PathBuf),
}

/// A viewer that doesn't start is reported, the merged file is there either way
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerOutcome {
    Opened,
    Skipped,
    LaunchFailed(String),
}

impl fmt::Display for ViewerOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ViewerOutcome::Opened => write!(f, "opened in viewer"),
            ViewerOutcome::Skipped => write!(f, "viewer not requested"),
            ViewerOutcome::LaunchFailed(reason) => write!(f, "viewer failed to start: {reason}"),
        }
    }
}

/// Merge the collected captures into `output` and, if a viewer is given, open the result with
/// `filter`. The output file existing afterwards is what counts as a successful merge.
pub async fn merge_and_open(
    merge_tool: &dyn MergeTool,
    viewer: Option<&dyn Viewer>,
    files: &[PathBuf],
    output: &Path,
    filter: &str,
) -> Result<ViewerOutcome, MergeError> {
    if files.is_empty() {
        return Err(MergeError::NothingToMerge);
    }
    tracing::info!("Stage: merging {} captures into {}", files.len(), output.display());

    merge_tool.merge(files, output).await
        .map_err(|err| MergeError::MergeToolFailed { output: output.to_path_buf(), reason: format!("{err:#}") })?;
    if !tokio::fs::try_exists(output).await.unwrap_or(false) {
        return Err(MergeError::OutputMissing(output.to_path_buf()));
    }
    tracing::info!("merged capture written to {}", output.display());

    let Some(viewer) = viewer else {
        return Ok(ViewerOutcome::Skipped);
    };
    let filter = Some(filter).filter(|f| !f.trim().is_empty());
    match viewer.open(output, filter).await {
        Ok(_) => Ok(ViewerOutcome::Opened),
        Err(err) => {
            tracing::warn!("could not open {} in the viewer: {err:#}", output.display());
            Ok(ViewerOutcome::LaunchFailed(format!("{err:#}")))
        }
    }
}
