//! shipbox - validation, packaging and fixup of compose-style projects
//!
//! Turns a multi-service project description into deployable services:
//!
//! - [`validation`]: rejects projects the deployment target cannot run and
//!   collects advisories for directives it ignores
//! - [`context`]: packages each build context into a reproducible gzip'd tar
//!   archive, content-addresses it and hands it to an [`ArchiveUploader`]
//! - [`fixup`]: normalizes ports, classifies environment variables against
//!   the config store and rewrites references to other services into private
//!   DNS names
//!
//! # Example
//!
//! ```no_run
//! use shipbox::{
//!     ConfigRegistry, InternalDnsNamer, LocalDirUploader, Project, ProjectValidator,
//!     ServiceFixupPipeline, ShipboxConfig, UploadMode,
//! };
//! use shipbox::fixup::ProviderKind;
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let project = Project::from_file(Path::new("project.yaml"))?;
//! let warnings = ProjectValidator::new().validate(&project)?;
//!
//! let config = ShipboxConfig::default();
//! let pipeline = ServiceFixupPipeline::new(
//!     Arc::new(LocalDirUploader::new("/tmp/contexts")),
//!     ConfigRegistry::new(["DB_PASSWORD"]),
//!     Arc::new(InternalDnsNamer::new(&project.name)),
//!     config.fixup_options(UploadMode::Digest, ProviderKind::Byoc),
//! );
//! let output = pipeline.run(project, &CancellationToken::new()).await?;
//! warnings.log();
//! output.warnings.log();
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod compose;
pub mod config;
pub mod context;
pub mod error;
pub mod fixup;
pub mod util;
pub mod validation;
pub mod warnings;

pub use compose::{Port, PortMode, Project, Protocol, Service};
pub use config::{ConfigError, ShipboxConfig};
pub use context::{
    ArchiveBuilder, ArchiveLimits, ArchiveUploader, BuildContext, BuildContextPackager,
    LocalDirUploader, UploadMode,
};
pub use error::{Error, ErrorKind, Result};
pub use fixup::{
    ConfigRegistry, DnsNamer, FixupOptions, FixupOutput, InternalDnsNamer, ServiceFixupPipeline,
};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use validation::{ProjectValidator, ValidationErrors};
pub use warnings::{Warning, Warnings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_shipbox() {
        assert_eq!(NAME, "shipbox");
    }
}
