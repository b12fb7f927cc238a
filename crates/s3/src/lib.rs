//! Blob storage on any S3-compatible endpoint. Deployments run this
//! against MinIO, so the client pins path-style addressing and static
//! credentials instead of the AWS resolver chain.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;

use vox_stt_interface::{BlobStat, BlobStore, PipelineError, PipelineResult};

mod error;

pub use error::Error;

#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint for MinIO or another S3-compatible service; `None`
    /// resolves against AWS proper.
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub async fn connect(config: S3Config) -> Result<Self, Error> {
        if config.bucket.trim().is_empty() {
            return Err(Error::Config("bucket name cannot be empty".into()));
        }

        let credentials = Credentials::from_keys(
            config.access_key_id,
            config.secret_access_key,
            None,
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket,
        })
    }

    /// Create the configured bucket if it does not exist yet. Safe to call
    /// on every startup.
    pub async fn ensure_bucket(&self) -> Result<(), Error> {
        let head = self.client.head_bucket().bucket(&self.bucket).send().await;
        match head {
            Ok(_) => return Ok(()),
            Err(err) if !err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                return Err(Error::sdk("head_bucket", err));
            }
            Err(_) => {}
        }

        tracing::info!(bucket = %self.bucket, "creating_bucket");
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            // Lost the race against another worker booting at the same time.
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(err) => Err(Error::sdk("create_bucket", err)),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PipelineError::blob(Error::sdk("put_object", e)))?;
        tracing::debug!(path, size, "blob_uploaded");
        Ok(())
    }

    async fn download(&self, path: &str, dest: &Path) -> PipelineResult<()> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| PipelineError::blob(Error::sdk("get_object", e)))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(PipelineError::blob)?;
        let mut body = resp.body;
        let mut written: u64 = 0;
        while let Some(chunk) = body.try_next().await.map_err(PipelineError::blob)? {
            written += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(PipelineError::blob)?;
        }
        file.flush().await.map_err(PipelineError::blob)?;
        tracing::debug!(path, bytes = written, "blob_downloaded");
        Ok(())
    }

    async fn exists(&self, path: &str) -> PipelineResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(PipelineError::blob(Error::sdk("head_object", err))),
        }
    }

    async fn stat(&self, path: &str) -> PipelineResult<BlobStat> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| PipelineError::blob(Error::sdk("head_object", e)))?;
        Ok(BlobStat {
            size_bytes: head.content_length().unwrap_or(0).max(0) as u64,
        })
    }

    async fn presign_get(&self, path: &str, ttl: Duration) -> PipelineResult<String> {
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| PipelineError::blob(Error::Config(e.to_string())))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(config)
            .await
            .map_err(|e| PipelineError::blob(Error::sdk("presign_get_object", e)))?;
        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, path: &str) -> PipelineResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| PipelineError::blob(Error::sdk("delete_object", e)))?;
        tracing::debug!(path, "blob_deleted");
        Ok(())
    }
}
