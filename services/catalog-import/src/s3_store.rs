use crate::config::S3Config;
use crate::ports::{ObjectReader, ObjectStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// [`ObjectStore`] backed by S3 or an S3-compatible service
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 object store initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn open_read(&self, container: &str, key: &str) -> Result<ObjectReader> {
        let output = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{container}/{key}"))?;

        debug!(content_length = ?output.content_length(), "Opened object stream");

        Ok(Box::new(Box::pin(output.body.into_async_read())))
    }

    #[instrument(skip(self))]
    async fn copy(&self, container: &str, from_key: &str, to_key: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(container)
            .copy_source(copy_source(container, from_key))
            .key(to_key)
            .send()
            .await
            .with_context(|| format!("Failed to copy s3://{container}/{from_key} to {to_key}"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, container: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{container}/{key}"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn presign_put(
        &self,
        container: &str,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String> {
        let presigning_config =
            PresigningConfig::expires_in(ttl).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .put_object()
            .bucket(container)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        Ok(presigned.uri().to_string())
    }
}

/// `CopySource` value: `{bucket}/{key}` with each key segment URL-encoded
fn copy_source(container: &str, key: &str) -> String {
    let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
    format!("{container}/{}", encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_encodes_key() {
        assert_eq!(
            copy_source("imports", "intake/products.csv"),
            "imports/intake/products.csv"
        );
        assert_eq!(
            copy_source("imports", "intake/spring sale+1.csv"),
            "imports/intake/spring%20sale%2B1.csv"
        );
        assert_eq!(copy_source("imports", "intake/é.csv"), "imports/intake/%C3%A9.csv");
    }
}
