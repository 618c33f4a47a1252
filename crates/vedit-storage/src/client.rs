//! S3-compatible client implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Asset storage used by the edit pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` to `dest`, creating parent directories.
    async fn download(&self, key: &str, dest: &Path) -> StorageResult<PathBuf>;

    /// Upload `src` under `key`, returning the stored key.
    async fn upload(&self, src: &Path, key: &str) -> StorageResult<String>;
}

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint (MinIO, R2, AWS)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| StorageError::config_error(format!("{} not set", key)))
        };

        Ok(Self {
            endpoint_url: required("S3_ENDPOINT_URL")?,
            access_key_id: required("S3_ACCESS_KEY")?,
            secret_access_key: required("S3_SECRET_KEY")?,
            bucket_name: lookup("S3_BUCKET").unwrap_or_else(|| "ai-video-editor".to_string()),
            region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        })
    }
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vedit",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file.
    pub async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Stream an object to a file.
    pub async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Downloading {} to {}", key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::not_found(key),
                _ => StorageError::download_failed(DisplayErrorContext(&e).to_string()),
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut body = response.body.into_async_read();
        let mut file = tokio::fs::File::create(path).await?;
        let bytes = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("{}: {}", key, e)))?;
        file.flush().await?;

        info!(bytes, "Downloaded {} to {}", key, path.display());
        Ok(())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::AwsSdk(format!(
                    "Storage connectivity check failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn download(&self, key: &str, dest: &Path) -> StorageResult<PathBuf> {
        self.download_file(key, dest).await?;
        Ok(dest.to_path_buf())
    }

    async fn upload(&self, src: &Path, key: &str) -> StorageResult<String> {
        self.upload_file(src, key, content_type_for(src)).await?;
        Ok(key.to_string())
    }
}

/// Reject keys S3 would misinterpret.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!("leading slash: {}", key)));
    }
    Ok(())
}

/// MIME type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_requires_credentials() {
        let err = S3Config::from_lookup(lookup(&[("S3_ENDPOINT_URL", "http://minio:9000")])).unwrap_err();
        assert!(err.to_string().contains("S3_ACCESS_KEY"));

        let blank = S3Config::from_lookup(lookup(&[
            ("S3_ENDPOINT_URL", "http://minio:9000"),
            ("S3_ACCESS_KEY", "  "),
            ("S3_SECRET_KEY", "secret"),
        ]));
        assert!(matches!(blank, Err(StorageError::ConfigError(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config = S3Config::from_lookup(lookup(&[
            ("S3_ENDPOINT_URL", "http://minio:9000"),
            ("S3_ACCESS_KEY", "minioadmin"),
            ("S3_SECRET_KEY", "minioadmin"),
        ]))
        .unwrap();
        assert_eq!(config.bucket_name, "ai-video-editor");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn test_validate_key() {
        tokio_test::assert_ok!(validate_key("projects/p1/output/a.mp4"));
        assert!(matches!(validate_key(""), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_key("/abs"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("out/final.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
