use std::path::{Path, PathBuf};
use async_trait::async_trait;

pub mod packet_capture;

/// Combines per-target capture files into one
#[async_trait]
pub trait MergeTool: Send + Sync {
    /// A zero exit is not proof of success, callers should check `output` exists afterwards
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()>;
}

/// Opens a capture for the operator to look at
#[async_trait]
pub trait Viewer: Send + Sync {
    async fn open(&self, artifact: &Path, filter: Option<&str>) -> anyhow::Result<()>;
}
