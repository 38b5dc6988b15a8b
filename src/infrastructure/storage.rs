//! S3-compatible object storage (MinIO).

use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{
        BucketLifecycleConfiguration, ExpirationStatus, LifecycleExpiration, LifecycleRule,
        LifecycleRuleFilter, Tag,
    },
};
use tracing::{debug, info};

use crate::config::StorageConfig;

/// Driver name that enables object storage.
pub const MINIO_DRIVER: &str = "minio";
pub const LIFECYCLE_RULE_ID: &str = "expire-rule";
const TEMPORARY_TAG_KEY: &str = "type";
const TEMPORARY_TAG_VALUE: &str = "temporary";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage configuration: {0}")]
    Config(String),

    #[error("storage request failed: {0}")]
    Request(String),
}

fn request_error<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Request(DisplayErrorContext(err).to_string())
}

/// A downloaded object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub bytes: Vec<u8>,
}

/// Bucket-scoped storage client.
#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
}

/// Whether `config` asks for object storage at all.
pub fn is_enabled(config: Option<&StorageConfig>) -> bool {
    config.is_some_and(|c| c.driver.as_deref() == Some(MINIO_DRIVER))
}

/// Object key for `filename` under `path`.
pub fn object_key(path: &str, filename: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        filename.to_string()
    } else {
        format!("{path}/{filename}")
    }
}

fn endpoint_url(config: &StorageConfig) -> String {
    if config.endpoint.contains("://") {
        return config.endpoint.clone();
    }
    let scheme = if config.use_ssl { "https" } else { "http" };
    format!("{scheme}://{}", config.endpoint)
}

fn lifecycle(retention_days: i32) -> Result<BucketLifecycleConfiguration, StorageError> {
    let tag = Tag::builder()
        .key(TEMPORARY_TAG_KEY)
        .value(TEMPORARY_TAG_VALUE)
        .build()
        .map_err(|e| StorageError::Config(e.to_string()))?;

    let rule = LifecycleRule::builder()
        .id(LIFECYCLE_RULE_ID)
        .status(ExpirationStatus::Enabled)
        .filter(LifecycleRuleFilter::builder().tag(tag).build())
        .expiration(LifecycleExpiration::builder().days(retention_days).build())
        .build()
        .map_err(|e| StorageError::Config(e.to_string()))?;

    BucketLifecycleConfiguration::builder()
        .rules(rule)
        .build()
        .map_err(|e| StorageError::Config(e.to_string()))
}

impl ObjectStorage {
    /// Builds the client, creates the bucket when missing and installs the
    /// expiry rule for temporary objects.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the bucket cannot be checked, created or
    /// configured.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.bucket_name.is_empty() {
            return Err(StorageError::Config("bucketName is required".into()));
        }

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "service-helper",
        );

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(DEFAULT_REGION))
            .endpoint_url(endpoint_url(config))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let storage = Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket_name.clone(),
        };

        storage.ensure_bucket().await?;
        storage.install_lifecycle(config.retention_days).await?;

        info!(bucket = %storage.bucket, "✓ Object storage ready");
        Ok(storage)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_not_found()) =>
            {
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(request_error)?;
                info!(bucket = %self.bucket, "Bucket created");
                Ok(())
            }
            Err(err) => Err(request_error(err)),
        }
    }

    async fn install_lifecycle(&self, retention_days: i32) -> Result<(), StorageError> {
        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(&self.bucket)
            .lifecycle_configuration(lifecycle(retention_days)?)
            .send()
            .await
            .map_err(request_error)?;
        debug!(bucket = %self.bucket, retention_days, "lifecycle rule installed");
        Ok(())
    }

    /// Stores `bytes` under `path/filename` and returns the object key.
    ///
    /// Temporary objects are tagged so the lifecycle rule expires them.
    pub async fn upload(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
        temporary: bool,
    ) -> Result<String, StorageError> {
        let key = object_key(path, filename);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes));
        if temporary {
            request = request.tagging(format!("{TEMPORARY_TAG_KEY}={TEMPORARY_TAG_VALUE}"));
        }

        request.send().await.map_err(request_error)?;
        debug!(key = %key, temporary, "object uploaded");
        Ok(key)
    }

    /// Reads the object at `path/filename` with its metadata.
    pub async fn download(&self, path: &str, filename: &str) -> Result<StoredObject, StorageError> {
        let key = object_key(path, filename);

        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(request_error)?;

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(request_error)?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(StoredObject {
            key,
            content_type: head.content_type().map(str::to_string),
            size: head.content_length().unwrap_or(bytes.len() as i64),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(driver: Option<&str>) -> StorageConfig {
        StorageConfig {
            driver: driver.map(str::to_string),
            endpoint: "minio:9000".into(),
            bucket_name: "uploads".into(),
            retention_days: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_enabled_only_for_minio_driver() {
        assert!(!is_enabled(None));
        assert!(!is_enabled(Some(&config(None))));
        assert!(!is_enabled(Some(&config(Some("s3")))));
        assert!(is_enabled(Some(&config(Some("minio")))));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("avatars", "a.png"), "avatars/a.png");
        assert_eq!(object_key("/avatars/", "a.png"), "avatars/a.png");
        assert_eq!(object_key("", "a.png"), "a.png");
    }

    #[test]
    fn test_endpoint_scheme_follows_use_ssl() {
        let mut cfg = config(Some("minio"));
        assert_eq!(endpoint_url(&cfg), "http://minio:9000");
        cfg.use_ssl = true;
        assert_eq!(endpoint_url(&cfg), "https://minio:9000");
        cfg.endpoint = "http://explicit:9000".into();
        assert_eq!(endpoint_url(&cfg), "http://explicit:9000");
    }

    #[test]
    fn test_lifecycle_rule_targets_temporary_tag() {
        let lifecycle = lifecycle(7).unwrap();
        let rule = &lifecycle.rules()[0];

        assert_eq!(rule.id(), Some(LIFECYCLE_RULE_ID));
        assert_eq!(rule.status(), &ExpirationStatus::Enabled);
        assert_eq!(rule.expiration().and_then(|e| e.days()), Some(7));

        let tag = rule.filter().and_then(|f| f.tag()).unwrap();
        assert_eq!(tag.key(), "type");
        assert_eq!(tag.value(), "temporary");
    }

    #[tokio::test]
    async fn test_connect_requires_bucket() {
        let mut cfg = config(Some("minio"));
        cfg.bucket_name.clear();
        assert!(matches!(
            ObjectStorage::connect(&cfg).await,
            Err(StorageError::Config(_))
        ));
    }
}
