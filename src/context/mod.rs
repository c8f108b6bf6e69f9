//! Build-context packaging: ignore rules, deterministic archives, digests and uploads

pub mod archive;
pub mod digest;
pub mod ignore;
pub mod packager;
pub mod upload;

pub use archive::{Archive, ArchiveBuilder, ArchiveError, ArchiveLimits};
pub use digest::content_digest;
pub use ignore::{IgnoreMatcher, IgnoreSource};
pub use packager::{BuildContext, BuildContextPackager};
pub use upload::{ArchiveUploader, LocalDirUploader, Namespace, UploadError, UploadMode};

use crate::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("build context packaging cancelled")]
    Cancelled,

    #[error("archive task failed: {0}")]
    Task(String),
}

impl PackageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackageError::Archive(e) => match e {
                ArchiveError::SizeLimit { .. } => ErrorKind::ArchiveLimit,
                ArchiveError::DockerfileNotFound { .. } => ErrorKind::DockerfileNotFound,
                ArchiveError::Cancelled => ErrorKind::Cancelled,
                ArchiveError::InvalidContext { .. } | ArchiveError::InvalidPattern { .. } => {
                    ErrorKind::Structural
                }
                ArchiveError::Io { .. } => ErrorKind::Io,
            },
            PackageError::Upload(_) => ErrorKind::Upload,
            PackageError::Cancelled => ErrorKind::Cancelled,
            PackageError::Task(_) => ErrorKind::Invariant,
        }
    }
}
