use super::archive::{ArchiveBuilder, ArchiveLimits, CONTENT_TYPE};
use super::digest::content_digest;
use super::ignore::clean_slash_path;
use super::upload::{normalize_upload_url, ArchiveUploader, UploadError, UploadMode};
use super::PackageError;
use crate::warnings::Warnings;
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A packaged build context, ready to be referenced by a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildContext {
    /// Where the archive was stored, or the local directory in [`UploadMode::Ignore`]
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub dockerfile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_file: Option<String>,
    #[serde(skip)]
    pub root: PathBuf,
}

pub struct BuildContextPackager {
    uploader: Arc<dyn ArchiveUploader>,
    limits: ArchiveLimits,
    mode: UploadMode,
}

impl BuildContextPackager {
    pub fn new(uploader: Arc<dyn ArchiveUploader>, mode: UploadMode) -> Self {
        Self {
            uploader,
            limits: ArchiveLimits::default(),
            mode,
        }
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Archives `root` and hands it to the uploader according to the upload mode.
    ///
    /// Archive limits are enforced before any uploader call is made.
    pub async fn package(
        &self,
        service: &str,
        root: &Path,
        dockerfile: &str,
        cancel: &CancellationToken,
        warnings: &mut Warnings,
    ) -> Result<BuildContext, PackageError> {
        let root = absolute(root);
        let dockerfile = clean_slash_path(dockerfile);

        if self.mode == UploadMode::Ignore {
            debug!(service, root = %root.display(), "Skipping build context upload");
            return Ok(BuildContext {
                url: root.to_string_lossy().to_string(),
                digest: None,
                dockerfile,
                ignore_file: None,
                root,
            });
        }

        info!(service, root = %root.display(), mode = %self.mode, "Packaging build context");

        let builder = ArchiveBuilder::new(root.clone(), &dockerfile)
            .with_limits(self.limits)
            .with_cancellation(cancel.clone())
            .for_service(service);
        let (archive, archive_warnings) = tokio::task::spawn_blocking(move || {
            let mut collected = Warnings::new();
            builder.build(&mut collected).map(|archive| (archive, collected))
        })
        .await
        .map_err(|e| PackageError::Task(e.to_string()))??;
        warnings.extend(archive_warnings);

        let digest = self
            .mode
            .computes_digest()
            .then(|| content_digest(&archive.bytes));

        let url = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PackageError::Cancelled),
            result = self.upload(digest.as_deref(), archive.bytes) => result?,
        };

        info!(service, url = %url, "Build context uploaded");
        Ok(BuildContext {
            url,
            digest,
            dockerfile: archive.dockerfile,
            ignore_file: archive.ignore_source.file_name().map(str::to_string),
            root,
        })
    }

    async fn upload(&self, digest: Option<&str>, body: Bytes) -> Result<String, UploadError> {
        let url = self
            .uploader
            .create_destination(digest, self.mode.namespace())
            .await?;
        debug!(url = %url, bytes = body.len(), "Uploading archive");
        self.uploader.put_bytes(&url, CONTENT_TYPE, body).await?;
        Ok(normalize_upload_url(&url))
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
