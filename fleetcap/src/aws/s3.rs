use std::path::Path;
use async_trait::async_trait;
use crate::aws::AwsCli;
use crate::storage::ObjectStore;
use crate::vec_of_strings;

/// Downloads with `aws s3 cp`
pub struct AwsS3Store {
    cli: AwsCli,
}

impl AwsS3Store {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl ObjectStore for AwsS3Store {
    async fn download(&self, bucket: &str, key: &str, region: &str, destination: &Path) -> anyhow::Result<()> {
        self.cli.run(
            region,
            vec_of_strings![
                "s3", "cp",
                format!("s3://{bucket}/{key}"),
                destination.to_string_lossy(),
                "--only-show-errors",
            ],
        ).await?;
        Ok(())
    }
}
