use std::path::Path;
use async_trait::async_trait;

/// Object storage the targets stage their captures into.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` from `bucket` into the file at `destination`, replacing its contents. On
    /// error the destination may hold a partial object, the caller decides what to do with it.
    async fn download(&self, bucket: &str, key: &str, region: &str, destination: &Path) -> anyhow::Result<()>;
}
