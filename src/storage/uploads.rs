//! Payment proof uploads on local disk
//!
//! Files land in the configured directory under a unique name and are served
//! back from the public prefix (`/images` by default).

use crate::config::UploadConfig;
use crate::core::error::{MartError, StorageError};
use crate::core::service::{ProofUpload, ProofUploader};
use async_trait::async_trait;
use chrono::Utc;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("only image uploads are accepted, got '{0}'")]
    UnsupportedType(String),

    #[error("upload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("upload is empty")]
    Empty,

    #[error("failed to write upload to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<UploadError> for MartError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io { .. } => MartError::Storage(StorageError::OperationFailed {
                message: err.to_string(),
            }),
            other => MartError::field("paymentProof", other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalDiskUploader {
    directory: PathBuf,
    public_prefix: String,
    max_bytes: usize,
}

impl LocalDiskUploader {
    pub fn new(
        directory: impl Into<PathBuf>,
        public_prefix: impl Into<String>,
        max_bytes: usize,
    ) -> Self {
        Self {
            directory: directory.into(),
            public_prefix: public_prefix.into(),
            max_bytes,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.directory, &config.public_prefix, config.max_bytes)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Check type and size; returns the file extension to use
    fn check(&self, upload: &ProofUpload) -> Result<&'static str, UploadError> {
        let content_type = upload
            .content_type
            .as_deref()
            .map(|c| c.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(UploadError::UnsupportedType(if content_type.is_empty() {
                "unknown".to_string()
            } else {
                content_type
            }));
        }
        if upload.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: upload.bytes.len(),
                max: self.max_bytes,
            });
        }

        let from_name = upload
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        Ok(extension_for(&content_type, from_name.as_deref()))
    }
}

fn extension_for(content_type: &str, from_name: Option<&str>) -> &'static str {
    match (content_type, from_name) {
        ("image/png", _) | (_, Some("png")) => "png",
        ("image/jpeg", _) | ("image/jpg", _) | (_, Some("jpg")) | (_, Some("jpeg")) => "jpg",
        ("image/gif", _) | (_, Some("gif")) => "gif",
        ("image/webp", _) | (_, Some("webp")) => "webp",
        _ => "img",
    }
}

#[async_trait]
impl ProofUploader for LocalDiskUploader {
    async fn store(&self, upload: ProofUpload) -> crate::core::error::Result<String> {
        let extension = self.check(&upload)?;
        let file_name = format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            extension
        );
        let path = self.directory.join(&file_name);

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| UploadError::Io {
                path: self.directory.clone(),
                source,
            })?;
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|source| UploadError::Io {
                path: path.clone(),
                source,
            })?;

        info!(file = %file_name, bytes = upload.bytes.len(), "payment proof stored");
        Ok(format!("{}/{}", self.public_prefix.trim_end_matches('/'), file_name))
    }

    /// Only references under the public prefix are removed, by bare file name
    async fn discard(&self, reference: &str) -> crate::core::error::Result<()> {
        let prefix = format!("{}/", self.public_prefix.trim_end_matches('/'));
        let Some(file_name) = reference
            .strip_prefix(&prefix)
            .filter(|name| Path::new(name).file_name() == Some(OsStr::new(name)))
        else {
            return Ok(());
        };

        let path = self.directory.join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(file = %file_name, "payment proof discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(UploadError::Io { path, source }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn upload(content_type: &str, bytes: &'static [u8]) -> ProofUpload {
        ProofUpload {
            file_name: Some("screenshot.PNG".to_string()),
            content_type: Some(content_type.to_string()),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[tokio::test]
    async fn test_store_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalDiskUploader::new(dir.path(), "/images", 1024);

        let first = uploader.store(upload("image/png", b"\x89PNG")).await.unwrap();
        let second = uploader.store(upload("image/png", b"\x89PNG")).await.unwrap();

        assert!(first.starts_with("/images/"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);

        let name = first.trim_start_matches("/images/");
        let written = std::fs::read(dir.path().join(name)).unwrap();
        assert_eq!(written, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalDiskUploader::new(dir.path(), "/images", 1024);

        let err = uploader.store(upload("application/pdf", b"%PDF")).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("application/pdf"));
    }

    #[tokio::test]
    async fn test_rejects_oversized_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalDiskUploader::new(dir.path(), "/images", 3);

        let err = uploader.store(upload("image/png", b"1234")).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let err = uploader.store(upload("image/png", b"")).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_discard_removes_only_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalDiskUploader::new(dir.path(), "/images", 1024);
        let outside = dir.path().join("keep.png");
        std::fs::write(&outside, b"keep").unwrap();

        let reference = uploader.store(upload("image/png", b"\x89PNG")).await.unwrap();
        uploader.discard(&reference).await.unwrap();
        uploader.discard(&reference).await.unwrap();

        uploader.discard("/images/../keep.png").await.unwrap();
        uploader.discard("https://cdn.example.com/keep.png").await.unwrap();
        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
        assert!(outside.exists());
    }

    #[test]
    fn test_extension_selection() {
        assert_eq!(extension_for("image/jpeg", None), "jpg");
        assert_eq!(extension_for("image/x-icon", Some("webp")), "webp");
        assert_eq!(extension_for("image/heic", None), "img");
    }
}
