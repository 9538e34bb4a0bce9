use std::fmt;
use std::path::Path;
use std::time::Duration;

use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::common::{StorageClient, StorageError, StorageResult};

/// Connection settings for an S3 compatible object store, such as MinIO.
#[derive(Clone)]
pub struct S3Config {
    /// The endpoint URL, for example `http://localhost:9000`.
    pub endpoint: String,
    /// The region name sent in signatures. MinIO accepts any value.
    pub region: String,
    /// The bucket all benchmark objects are written to. It is created when missing.
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Whether to address the bucket in the path instead of the host name.
    pub path_style: bool,
    pub request_timeout: Option<Duration>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "multimedia-test".into(),
            access_key: None,
            secret_key: None,
            path_style: true,
            request_timeout: None,
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

/// A [`StorageClient`] for S3 compatible object stores.
pub struct S3Client {
    bucket: Box<Bucket>,
}

impl S3Client {
    /// Connects to the object store and ensures the configured bucket exists.
    pub async fn connect(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|cause| StorageError::Generic {
            context: "invalid s3 credentials".into(),
            cause: Box::new(cause),
        })?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|cause| StorageError::s3("failed to configure bucket", cause))?;

        if config.path_style {
            bucket = bucket.with_path_style();
        }

        if let Some(request_timeout) = config.request_timeout {
            bucket = bucket
                .with_request_timeout(request_timeout)
                .map_err(|cause| StorageError::s3("failed to set request timeout", cause))?;
        }

        let exists = bucket
            .exists()
            .await
            .map_err(|cause| StorageError::s3("failed to check bucket", cause))?;

        if !exists {
            tracing::info!(bucket = %config.bucket, "creating bucket");
            let response = if config.path_style {
                Bucket::create_with_path_style(
                    &config.bucket,
                    region,
                    credentials,
                    BucketConfiguration::default(),
                )
                .await
            } else {
                Bucket::create(
                    &config.bucket,
                    region,
                    credentials,
                    BucketConfiguration::default(),
                )
                .await
            }
            .map_err(|cause| StorageError::s3("failed to create bucket", cause))?;

            if !response.success() {
                return Err(StorageError::Rejected {
                    context: "create bucket".into(),
                    status: response.response_code,
                });
            }
        }

        Ok(Self { bucket })
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.host())
            .finish_non_exhaustive()
    }
}

/// Maps a failed S3 request, reporting missing objects as [`StorageError::NotFound`].
fn map_s3_error(context: &str, object_name: &str, cause: S3Error) -> StorageError {
    match cause {
        S3Error::HttpFailWithBody(404, _) => StorageError::not_found(object_name),
        cause => StorageError::s3(context, cause),
    }
}

#[async_trait::async_trait]
impl StorageClient for S3Client {
    fn name(&self) -> &str {
        "MinIO"
    }

    #[tracing::instrument(level = "trace", skip(self, local_path))]
    async fn upload(&self, local_path: &Path, object_name: &str) -> StorageResult<()> {
        let mut file = File::open(local_path).await?;

        let response = self
            .bucket
            .put_object_stream(&mut file, object_name)
            .await
            .map_err(|cause| StorageError::s3("put object", cause))?;

        match response.status_code() {
            200..=299 => Ok(()),
            status => Err(StorageError::Rejected {
                context: "put object".into(),
                status,
            }),
        }
    }

    #[tracing::instrument(level = "trace", skip(self, local_path))]
    async fn retrieve(&self, object_name: &str, local_path: &Path) -> StorageResult<()> {
        let mut file = File::create(local_path).await?;

        let status = self
            .bucket
            .get_object_to_writer(object_name, &mut file)
            .await
            .map_err(|cause| map_s3_error("get object", object_name, cause))?;
        file.flush().await?;

        match status {
            200..=299 => Ok(()),
            404 => Err(StorageError::not_found(object_name)),
            status => Err(StorageError::Rejected {
                context: "get object".into(),
                status,
            }),
        }
    }

    async fn cleanup(&self) -> StorageResult<()> {
        let pages = self
            .bucket
            .list(String::new(), None)
            .await
            .map_err(|cause| StorageError::s3("list objects", cause))?;

        let mut deleted = 0;
        for object in pages.iter().flat_map(|page| &page.contents) {
            self.bucket
                .delete_object(&object.key)
                .await
                .map_err(|cause| StorageError::s3("delete object", cause))?;
            deleted += 1;
        }

        tracing::debug!(bucket = %self.bucket.name(), deleted, "emptied bucket");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_objects_are_not_found() {
        let err = map_s3_error(
            "get object",
            "small/a.txt",
            S3Error::HttpFailWithBody(404, "NoSuchKey".into()),
        );
        assert!(err.is_not_found());

        let err = map_s3_error(
            "get object",
            "small/a.txt",
            S3Error::HttpFailWithBody(503, "SlowDown".into()),
        );
        assert!(matches!(err, StorageError::S3 { .. }));
    }

    #[test]
    fn config_debug_redacts_credentials() {
        let config = S3Config {
            access_key: Some("minioadmin".into()),
            secret_key: Some("hunter2".into()),
            ..Default::default()
        };

        let debug = format!("{config:?}");
        assert!(debug.contains("multimedia-test"));
        assert!(!debug.contains("hunter2"));
    }
}
