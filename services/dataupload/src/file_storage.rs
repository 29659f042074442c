use crate::config::{S3Config, StorageBackend, StorageConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Attempts at finding a free local file name before giving up
const MAX_NAME_ATTEMPTS: usize = 16;

/// Keeps the raw bytes of uploaded files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist `contents` and return the reference to record on the upload
    async fn save(&self, file_name: &str, contents: &[u8]) -> Result<String>;
}

/// Build the configured storage backend
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn FileStorage>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalFileStorage::new(&config.local_dir))),
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .context("storage.s3 must be configured for the s3 backend")?;
            Ok(Arc::new(S3FileStorage::new(s3).await?))
        }
    }
}

/// Files on local disk under one directory.
///
/// Existing files are never overwritten: a taken name gets a random
/// `_xxxxxxx` suffix before its extension.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    #[instrument(skip(self, contents), fields(size_bytes = contents.len()))]
    async fn save(&self, file_name: &str, contents: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create upload directory {}", self.root.display()))?;

        let base_name = safe_file_name(file_name);
        let mut candidate = base_name.clone();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.root.join(&candidate);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(contents)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    file.flush().await?;

                    let reference = path.to_string_lossy().into_owned();
                    info!(file = %reference, "Raw file stored");
                    return Ok(reference);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(name = %candidate, "File name taken, picking another");
                    candidate = with_random_suffix(&base_name);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()))
                }
            }
        }

        anyhow::bail!("No free file name found for {base_name} after {MAX_NAME_ATTEMPTS} attempts")
    }
}

/// Objects in an S3 bucket, partitioned by upload date
pub struct S3FileStorage {
    client: S3Client,
    bucket: String,
}

impl S3FileStorage {
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
            bucket = %config.bucket,
            region = %config.region,
            "S3 file storage initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    #[instrument(skip(self, contents), fields(size_bytes = contents.len()))]
    async fn save(&self, file_name: &str, contents: &[u8]) -> Result<String> {
        let key = generate_s3_key(file_name, Uuid::new_v4(), Utc::now().date_naive());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(contents.to_vec()))
            .content_type(content_type_for(file_name))
            .metadata("original-name", file_name)
            .send()
            .await
            .context("Failed to upload file to S3")?;

        info!(bucket = %self.bucket, key = %key, "Raw file stored");
        Ok(key)
    }
}

/// Format: uploads/{date}/{id}_{name}
fn generate_s3_key(file_name: &str, id: Uuid, date: chrono::NaiveDate) -> String {
    format!(
        "uploads/{date}/{id}_{name}",
        date = date.format("%Y-%m-%d"),
        id = id.simple(),
        name = safe_file_name(file_name)
    )
}

/// Reduce a client-supplied name to a single safe path component
fn safe_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

fn with_random_suffix(file_name: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(7).collect();

    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{file_name}_{suffix}"),
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    if file_name.ends_with(".csv") {
        "text/csv"
    } else if file_name.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::Path;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("test_file.csv"), "test_file.csv");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("C:\\temp\\data.json"), "data.json");
        assert_eq!(safe_file_name("my report (1).csv"), "my_report__1_.csv");
        assert_eq!(safe_file_name(".."), "upload");
        assert_eq!(safe_file_name(""), "upload");
    }

    #[test]
    fn test_random_suffix_keeps_extension() {
        let name = with_random_suffix("test_file.csv");
        assert!(name.starts_with("test_file_"), "{name}");
        assert!(name.ends_with(".csv"), "{name}");
        assert_eq!(name.len(), "test_file.csv".len() + 8);

        let name = with_random_suffix("README");
        assert!(name.starts_with("README_"));
    }

    #[test]
    fn test_generate_s3_key() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        assert_eq!(
            generate_s3_key("sub/dir/rows.csv", id, date),
            "uploads/2024-01-15/550e8400e29b41d4a716446655440000_rows.csv"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.csv"), "text/csv");
        assert_eq!(content_type_for("a.json"), "application/json");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_local_save_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().join("uploads"));

        let reference = storage
            .save("test_file.csv", b"col1,col2\nval1,val2")
            .await
            .unwrap();

        assert_eq!(
            Path::new(&reference),
            dir.path().join("uploads").join("test_file.csv")
        );
        let written = std::fs::read(&reference).unwrap();
        assert_eq!(written, b"col1,col2\nval1,val2");
    }

    #[tokio::test]
    async fn test_local_save_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());

        let first = storage.save("test_file.json", b"{\"v\": 1}").await.unwrap();
        let second = storage.save("test_file.json", b"{\"v\": 2}").await.unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with(".json"));
        assert_eq!(std::fs::read(&first).unwrap(), b"{\"v\": 1}");
        assert_eq!(std::fs::read(&second).unwrap(), b"{\"v\": 2}");
    }

    #[tokio::test]
    async fn test_local_save_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().join("uploads"));

        let reference = storage.save("../escape.csv", b"a\n1").await.unwrap();

        assert_eq!(
            Path::new(&reference),
            dir.path().join("uploads").join("escape.csv")
        );
        assert!(!dir.path().join("escape.csv").exists());
    }
}
