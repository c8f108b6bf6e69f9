//! Managed data stores and provider-specific extension handling

use crate::compose::extension::{AUTOSCALING, MONGODB, POSTGRES, REDIS};
use crate::compose::{is_stateful_image, DecodedExtensions, Port, Protocol, Service};
use crate::context::UploadMode;
use crate::error::{Error, Result};
use crate::warnings::Warnings;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const REDIS_PORT: u32 = 6379;
pub const POSTGRES_PORT: u32 = 5432;
pub const MONGODB_PORT: u32 = 27017;
pub const MONGODB_SHARD_PORT: u32 = 27018;
pub const MONGODB_CONFIG_PORT: u32 = 27019;

/// Backend the project is deployed to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The user's own cloud account
    #[default]
    Byoc,
    /// Shared multi-tenant backend
    Playground,
}

impl ProviderKind {
    pub fn supports_managed_stores(&self) -> bool {
        matches!(self, ProviderKind::Byoc)
    }
}

/// Gives a managed store without ports a host-mode TCP port so it gets a private DNS name.
pub fn add_managed_store_port(service: &mut Service) -> Result<()> {
    if !service.ports.is_empty() {
        return Ok(());
    }
    let args: Vec<String> = service
        .entrypoint
        .iter()
        .chain(service.command.iter())
        .cloned()
        .collect();

    let port = if service.has_extension(REDIS) {
        redis_port(&args)
    } else if service.has_extension(POSTGRES) {
        match service.environment.get("PGPORT") {
            Some(Some(pgport)) => parse_port(pgport),
            _ => Ok(POSTGRES_PORT),
        }
    } else if service.has_extension(MONGODB) {
        mongodb_port(&args)
    } else {
        return Ok(());
    };

    let port = port.map_err(|message| Error::Structural {
        service: service.name.clone(),
        message,
    })?;
    debug!(service = %service.name, port, "Adding managed store host port");
    service.ports.push(Port::host(port, Protocol::Tcp));
    Ok(())
}

fn parse_port(value: &str) -> std::result::Result<u32, String> {
    value
        .parse::<u16>()
        .map(u32::from)
        .map_err(|e| format!("invalid port number {:?}: {}", value, e))
}

/// The last `--port N` wins
fn redis_port(args: &[String]) -> std::result::Result<u32, String> {
    let mut port = REDIS_PORT;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--port" {
            if let Some(next) = args.get(i + 1) {
                port = parse_port(next)?;
            }
        }
    }
    Ok(port)
}

/// The first explicit `--port` wins; otherwise the role decides
fn mongodb_port(args: &[String]) -> std::result::Result<u32, String> {
    let mut port = MONGODB_PORT;
    for (i, arg) in args.iter().enumerate() {
        let explicit = match arg.as_str() {
            "--shardsvr" => {
                port = MONGODB_SHARD_PORT;
                continue;
            }
            "--configsvr" => {
                port = MONGODB_CONFIG_PORT;
                continue;
            }
            "--port" => match args.get(i + 1) {
                Some(next) => next.as_str(),
                None => continue,
            },
            other => match other.strip_prefix("--port=") {
                Some(value) => value,
                None => continue,
            },
        };
        return parse_port(explicit);
    }
    Ok(port)
}

/// Removes extensions the provider cannot honour, warning about each one.
///
/// Estimates never warn since nothing is deployed.
pub fn strip_unsupported_extensions(
    service: &mut Service,
    provider: ProviderKind,
    mode: UploadMode,
    warnings: &mut Warnings,
) {
    if provider.supports_managed_stores() {
        return;
    }
    let unsupported = [
        (REDIS, "managed Redis"),
        (POSTGRES, "managed Postgres"),
        (MONGODB, "managed MongoDB"),
        (AUTOSCALING, "auto-scaling"),
    ];
    for (key, feature) in unsupported {
        if service.extensions.remove(key).is_some() && mode != UploadMode::Estimate {
            warnings.service(
                &service.name,
                format!(
                    "{} is not supported in the Playground; consider using BYOC",
                    feature
                ),
            );
        }
    }
}

/// Warns when a database-like image runs without a managed store behind it
pub fn warn_if_stateful(service: &Service, extensions: &DecodedExtensions, warnings: &mut Warnings) {
    if !extensions.has_managed_store() && is_stateful_image(service.image()) {
        warnings.service(
            &service.name,
            "stateful service will lose data on restart; use a managed service instead",
        );
    }
}
