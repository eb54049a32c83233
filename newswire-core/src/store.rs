//! Object-store seam: named blob upload and existence probes.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{NewsError, Result};

/// Remote blob store shared across runs. Uploads are idempotent by key.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Whether `bucket/key` already exists. A missing object is `Ok(false)`;
    /// transient store failures are errors so callers can retry next run.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Upload a local file under `bucket/key`.
    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()>;
}

/// S3-backed store using ambient AWS credentials.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub async fn from_env() -> Self {
        let config =
            aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found())
                {
                    Ok(false)
                } else {
                    Err(NewsError::Store(format!("head {bucket}/{key}: {err}")))
                }
            }
        }
    }

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|err| NewsError::Store(format!("read {}: {err}", local_path.display())))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| NewsError::Store(format!("put {bucket}/{key}: {err}")))?;
        Ok(())
    }
}
