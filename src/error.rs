//! Top-level error type and its structured classification
//!
//! Callers should branch on [`Error::kind`] and [`Error::service`], never on the
//! rendered message.

use crate::context::PackageError;
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Coarse classification of every fatal condition the core can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The project violates a structural rule and cannot be deployed
    Structural,
    /// The build context exceeded the archive size ceiling
    ArchiveLimit,
    /// The resolved dockerfile is not part of the build context
    DockerfileNotFound,
    /// Filesystem error while reading the build context
    Io,
    /// The archive uploader failed
    Upload,
    /// The run was cancelled
    Cancelled,
    /// An internal precondition was violated (e.g. an unvalidated port mode)
    Invariant,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("service {service:?}: {source}")]
    Package {
        service: String,
        #[source]
        source: PackageError,
    },

    #[error("service {service:?}: {message}")]
    Structural { service: String, message: String },

    #[error("service {service:?}: {message}")]
    Invariant { service: String, message: String },

    #[error("service {service:?}: operation cancelled")]
    Cancelled { service: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Structural { .. } => ErrorKind::Structural,
            Error::Package { source, .. } => source.kind(),
            Error::Invariant { .. } => ErrorKind::Invariant,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Name of the service that caused the error, when there is exactly one
    pub fn service(&self) -> Option<&str> {
        match self {
            Error::Validation(errors) => errors.first_service(),
            Error::Package { service, .. }
            | Error::Structural { service, .. }
            | Error::Invariant { service, .. }
            | Error::Cancelled { service } => Some(service),
        }
    }

    /// Wraps a packaging failure. Cancellation always surfaces as [`Error::Cancelled`].
    pub fn package(service: impl Into<String>, source: PackageError) -> Self {
        let service = service.into();
        match source.kind() {
            ErrorKind::Cancelled => Error::Cancelled { service },
            _ => Error::Package { service, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ArchiveError, UploadError};

    #[test]
    fn test_package_cancellation_has_one_shape() {
        for source in [
            PackageError::Cancelled,
            PackageError::Archive(ArchiveError::Cancelled),
        ] {
            let err = Error::package("api", source);
            assert!(matches!(&err, Error::Cancelled { service } if service == "api"));
            assert_eq!(err.kind(), ErrorKind::Cancelled);
        }
    }

    #[test]
    fn test_package_failure_keeps_source() {
        let err = Error::package("api", PackageError::Archive(ArchiveError::SizeLimit { limit: 1 }));
        assert!(matches!(err, Error::Package { .. }));
        assert_eq!(err.kind(), ErrorKind::ArchiveLimit);
        assert_eq!(err.service(), Some("api"));

        let upload = UploadError::Destination {
            message: "bucket missing".to_string(),
        };
        let err = Error::package("web", PackageError::Upload(upload));
        assert_eq!(err.kind(), ErrorKind::Upload);
    }
}
