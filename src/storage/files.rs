//! File buckets for logos, avatars, news images and documents
//!
//! Objects live under `<data_dir>/buckets/<bucket>/<name>` and are served
//! read-only at `/files/<bucket>/<name>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted object name
pub const MAX_NAME_LEN: usize = 200;

/// Errors from bucket operations
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Logos,
    Avatars,
    News,
    Documents,
}

impl Bucket {
    pub fn all() -> &'static [Bucket] {
        &[Bucket::Logos, Bucket::Avatars, Bucket::News, Bucket::Documents]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Logos => "logos",
            Bucket::Avatars => "avatars",
            Bucket::News => "news",
            Bucket::Documents => "documents",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bucket::all()
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| FileError::UnknownBucket(s.to_string()))
    }
}

/// Result of an upload
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub bucket: Bucket,
    pub name: String,
    pub size: usize,
    /// Public URL the file is served at
    pub url: String,
}

/// Bucketed file storage on local disk
pub struct FileStore {
    root: PathBuf,
    max_bytes: usize,
}

impl FileStore {
    /// `root` is the directory holding one sub-directory per bucket
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of an object
    pub fn public_url(bucket: Bucket, name: &str) -> String {
        format!("/files/{}/{}", bucket, urlencoding::encode(name))
    }

    fn object_path(&self, bucket: Bucket, name: &str) -> Result<PathBuf, FileError> {
        validate_name(name)?;
        Ok(self.root.join(bucket.as_str()).join(name))
    }

    /// Store `bytes` under `bucket/name`, replacing any existing object
    pub async fn upload(
        &self,
        bucket: Bucket,
        name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, FileError> {
        if bytes.len() > self.max_bytes {
            return Err(FileError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let path = self.object_path(bucket, name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(bucket = %bucket, name, size = bytes.len(), "Stored file");

        Ok(StoredFile {
            bucket,
            name: name.to_string(),
            size: bytes.len(),
            url: Self::public_url(bucket, name),
        })
    }

    /// Delete `bucket/name`
    pub async fn remove(&self, bucket: Bucket, name: &str) -> Result<(), FileError> {
        let path = self.object_path(bucket, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(bucket = %bucket, name, "Removed file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileError::NotFound(format!("{}/{}", bucket, name)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_name(name: &str) -> Result<(), FileError> {
    let invalid = name.is_empty()
        || name.chars().count() > MAX_NAME_LEN
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.chars().any(char::is_control);

    if invalid {
        Err(FileError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_and_remove() {
        let dir = TempDir::new().unwrap();
        let files = FileStore::new(dir.path(), 1024);

        let stored = files
            .upload(Bucket::Logos, "logo azul.png", b"png-bytes")
            .await
            .unwrap();
        assert_eq!(stored.url, "/files/logos/logo%20azul.png");
        assert!(dir.path().join("logos").join("logo azul.png").exists());

        files.remove(Bucket::Logos, "logo azul.png").await.unwrap();
        assert!(matches!(
            files.remove(Bucket::Logos, "logo azul.png").await,
            Err(FileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_bad_names_and_large_files() {
        let dir = TempDir::new().unwrap();
        let files = FileStore::new(dir.path(), 4);

        let long = "x".repeat(201);
        for name in ["", "../secret", "a/b", "..", long.as_str()] {
            assert!(matches!(
                files.upload(Bucket::News, name, b"ok").await,
                Err(FileError::InvalidName(_))
            ));
        }

        assert!(matches!(
            files.upload(Bucket::News, "big.jpg", b"too big").await,
            Err(FileError::TooLarge { size: 7, limit: 4 })
        ));
    }

    #[test]
    fn test_bucket_parsing() {
        assert_eq!("avatars".parse::<Bucket>().unwrap(), Bucket::Avatars);
        assert!("tmp".parse::<Bucket>().is_err());
    }
}
