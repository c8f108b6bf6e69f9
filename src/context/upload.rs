//! Archive storage contract
//!
//! The packager only ever talks to an [`ArchiveUploader`]. Concrete object
//! stores live outside this crate; [`LocalDirUploader`] keeps archives in a
//! directory and backs the CLI and the tests.

use super::digest::DIGEST_PREFIX;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to create upload destination: {message}")]
    Destination { message: String },

    #[error("failed to upload to {url}: {message}")]
    Put { url: String, message: String },

    #[error("invalid upload URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Storage area an archive is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Archives referenced by real deployments
    Durable,
    /// Short-lived archives for previews and estimates
    Ephemeral,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Durable => "uploads",
            Namespace::Ephemeral => "preview",
        }
    }
}

/// How build contexts are packaged and where they go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Content-addressed upload; unchanged contexts are not stored twice
    #[default]
    Digest,
    /// Always upload under a fresh name
    Force,
    /// No archive at all; the local context path is returned
    Ignore,
    /// Content-addressed upload into the ephemeral namespace
    Preview,
    /// Upload into the ephemeral namespace without computing a digest
    Estimate,
}

impl UploadMode {
    pub fn namespace(&self) -> Namespace {
        match self {
            UploadMode::Digest | UploadMode::Force | UploadMode::Ignore => Namespace::Durable,
            UploadMode::Preview | UploadMode::Estimate => Namespace::Ephemeral,
        }
    }

    pub fn computes_digest(&self) -> bool {
        matches!(self, UploadMode::Digest | UploadMode::Preview)
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadMode::Digest => "digest",
            UploadMode::Force => "force",
            UploadMode::Ignore => "ignore",
            UploadMode::Preview => "preview",
            UploadMode::Estimate => "estimate",
        };
        write!(f, "{}", s)
    }
}

#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    /// Returns a URL the archive can be written to. With a digest the URL is
    /// stable, which lets the store skip content it already holds.
    async fn create_destination(
        &self,
        digest: Option<&str>,
        namespace: Namespace,
    ) -> Result<String, UploadError>;

    async fn put_bytes(&self, url: &str, content_type: &str, body: Bytes) -> Result<(), UploadError>;
}

/// Drops signing query parameters and maps public GCS URLs to `gs://`.
pub fn normalize_upload_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_query(None);
    url.set_fragment(None);
    if url.scheme() == "https" && url.host_str() == Some("storage.googleapis.com") {
        return format!("gs://{}", url.path().trim_start_matches('/'));
    }
    url.to_string()
}

/// Stores archives as `<root>/<namespace>/<name>.tar.gz`
#[derive(Debug)]
pub struct LocalDirUploader {
    root: PathBuf,
    sequence: AtomicU64,
}

impl LocalDirUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fresh_name(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("upload-{}-{}-{}", std::process::id(), nanos, seq)
    }
}

#[async_trait]
impl ArchiveUploader for LocalDirUploader {
    async fn create_destination(
        &self,
        digest: Option<&str>,
        namespace: Namespace,
    ) -> Result<String, UploadError> {
        let dir = self.root.join(namespace.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| UploadError::Io {
                path: dir.clone(),
                source,
            })?;
        let dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|source| UploadError::Io {
                path: dir.clone(),
                source,
            })?;

        let name = match digest {
            Some(digest) => digest.to_string(),
            None => self.fresh_name(),
        };
        let path = dir.join(format!("{}.tar.gz", name));
        let url = Url::from_file_path(&path).map_err(|_| UploadError::Destination {
            message: format!("cannot express {} as a file URL", path.display()),
        })?;
        Ok(url.to_string())
    }

    async fn put_bytes(&self, url: &str, content_type: &str, body: Bytes) -> Result<(), UploadError> {
        let parsed = Url::parse(url).map_err(|source| UploadError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let path = parsed.to_file_path().map_err(|_| UploadError::Put {
            url: url.to_string(),
            message: "not a file URL".to_string(),
        })?;

        let digest_keyed = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(DIGEST_PREFIX));
        if digest_keyed && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!(path = %path.display(), "Archive already stored; skipping upload");
            return Ok(());
        }

        debug!(path = %path.display(), content_type, bytes = body.len(), "Writing archive");
        tokio::fs::write(&path, &body)
            .await
            .map_err(|source| UploadError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yare::parameterized;

    #[parameterized(
        strips_query = { "https://bucket.s3.amazonaws.com/uploads/a.tar.gz?X-Amz-Signature=abc", "https://bucket.s3.amazonaws.com/uploads/a.tar.gz" },
        gcs = { "https://storage.googleapis.com/my-bucket/uploads/a.tar.gz?sig=1", "gs://my-bucket/uploads/a.tar.gz" },
        file = { "file:///tmp/x.tar.gz", "file:///tmp/x.tar.gz" },
        not_a_url = { "/tmp/x.tar.gz", "/tmp/x.tar.gz" },
    )]
    fn test_normalize_upload_url(input: &str, expected: &str) {
        assert_eq!(normalize_upload_url(input), expected);
    }

    #[test]
    fn test_upload_mode_namespace() {
        assert_eq!(UploadMode::Digest.namespace(), Namespace::Durable);
        assert_eq!(UploadMode::Preview.namespace(), Namespace::Ephemeral);
        assert!(UploadMode::Preview.computes_digest());
        assert!(!UploadMode::Estimate.computes_digest());
        assert!(!UploadMode::Force.computes_digest());
    }

    #[tokio::test]
    async fn test_local_uploader_digest_destination_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = LocalDirUploader::new(temp_dir.path());

        let digest = "sha256-0000000000000000000000000000000000000000000000000000000000000000";
        let first = uploader
            .create_destination(Some(digest), Namespace::Durable)
            .await
            .unwrap();
        let second = uploader
            .create_destination(Some(digest), Namespace::Durable)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("file://"));
        assert!(first.ends_with(&format!("uploads/{}.tar.gz", digest)));

        uploader
            .put_bytes(&first, "application/gzip", Bytes::from_static(b"one"))
            .await
            .unwrap();
        uploader
            .put_bytes(&first, "application/gzip", Bytes::from_static(b"two"))
            .await
            .unwrap();
        let path = Url::parse(&first).unwrap().to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_local_uploader_fresh_names() {
        let temp_dir = TempDir::new().unwrap();
        let uploader = LocalDirUploader::new(temp_dir.path());
        let a = uploader.create_destination(None, Namespace::Ephemeral).await.unwrap();
        let b = uploader.create_destination(None, Namespace::Ephemeral).await.unwrap();
        assert_ne!(a, b);
        assert!(a.contains("/preview/"));
    }
}
