//! Command handlers; each returns the process exit code

use super::commands::{FixupArgs, PackageArgs, ValidateArgs};
use super::output::{OutputFormat, OutputFormatter, PackageReport, ValidationReport};
use crate::compose::Project;
use crate::config::ShipboxConfig;
use crate::context::{content_digest, ArchiveBuilder, LocalDirUploader};
use crate::error::{Error, ErrorKind};
use crate::fixup::config::missing_configs;
use crate::fixup::{
    ConfigRegistry, InternalDnsNamer, ProviderKind, ServiceFixupPipeline, StaticConfigLister,
};
use crate::validation::ProjectValidator;
use crate::warnings::Warnings;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

/// Default archive store, next to the project file
const STORE_DIR: &str = ".shipbox";

pub async fn handle_package(args: &PackageArgs, quiet: bool) -> i32 {
    match run_package(args).await {
        Ok(report) => {
            if !quiet {
                print_or_fail(OutputFormatter::new(OutputFormat::Human).format_package(&report))
            } else {
                println!("{}", report.digest);
                EXIT_OK
            }
        }
        Err(e) => report_error(&e),
    }
}

async fn run_package(args: &PackageArgs) -> Result<PackageReport> {
    let config = load_config()?;
    let root = args.context.clone();
    let dockerfile = args.dockerfile.clone();
    let limits = config.archive_limits();

    let (archive, warnings) = tokio::task::spawn_blocking(move || {
        let mut warnings = Warnings::new();
        ArchiveBuilder::new(root, &dockerfile)
            .with_limits(limits)
            .build(&mut warnings)
            .map(|archive| (archive, warnings))
    })
    .await
    .context("Archive task failed")??;

    let digest = content_digest(&archive.bytes);
    info!(digest = %digest, files = archive.file_count, "Packaged build context");

    if let Some(output) = &args.output {
        tokio::fs::write(output, &archive.bytes)
            .await
            .with_context(|| format!("Failed to write archive to {}", output.display()))?;
        debug!(path = %output.display(), "Archive written");
    }

    Ok(PackageReport {
        digest,
        file_count: archive.file_count,
        size: archive.bytes.len(),
        dockerfile: archive.dockerfile.clone(),
        ignore_file: archive.ignore_source.file_name().map(str::to_string),
        warnings,
    })
}

pub async fn handle_validate(args: &ValidateArgs) -> i32 {
    let project = match Project::from_file(&args.project) {
        Ok(project) => project,
        Err(e) => return report_error(&e.into()),
    };

    let result = ProjectValidator::new().validate(&project);
    let report = ValidationReport::new(&result);
    let code = print_or_fail(OutputFormatter::new(args.format.into()).format_validation(&report));
    match (code, report.valid) {
        (EXIT_OK, true) => EXIT_OK,
        (EXIT_OK, false) => EXIT_INVALID,
        (code, _) => code,
    }
}

pub async fn handle_fixup(args: &FixupArgs) -> i32 {
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; cancelling");
            signal_token.cancel();
        }
    });

    let code = match run_fixup(args, &cancel).await {
        Ok(code) => code,
        Err(e) => report_error(&e),
    };
    signal.abort();
    code
}

async fn run_fixup(args: &FixupArgs, cancel: &CancellationToken) -> Result<i32> {
    let config = load_config()?;
    let project = Project::from_file(&args.project)?;
    let formatter = OutputFormatter::new(args.format.into());

    let mut warnings = match ProjectValidator::new().validate(&project) {
        Ok(warnings) => warnings,
        Err(errors) => {
            let report = ValidationReport::new(&Err(errors));
            return Ok(match print_or_fail(formatter.format_validation(&report)) {
                EXIT_OK => EXIT_INVALID,
                code => code,
            });
        }
    };

    let lister = StaticConfigLister::new(args.configs.iter().cloned());
    let registry = ConfigRegistry::load(&lister, &project.name).await;
    let missing = missing_configs(&project, &registry);
    if !missing.is_empty() {
        warnings.global(format!(
            "missing configs {:?}; they must be set before deploying",
            missing
        ));
    }

    let store = store_dir(args.store.as_deref(), &args.project);
    let provider = if args.playground {
        ProviderKind::Playground
    } else {
        ProviderKind::Byoc
    };
    let pipeline = ServiceFixupPipeline::new(
        Arc::new(LocalDirUploader::new(store)),
        registry,
        Arc::new(InternalDnsNamer::new(&project.name)),
        config.fixup_options(args.upload_mode.into(), provider),
    );

    let mut output = match pipeline.run(project, cancel).await {
        Ok(output) => output,
        Err(e) => return Ok(report_core_error(&e)),
    };
    warnings.extend(std::mem::take(&mut output.warnings));
    output.warnings = warnings;

    Ok(print_or_fail(formatter.format_fixup(&output)))
}

fn load_config() -> Result<ShipboxConfig> {
    let config = ShipboxConfig::default();
    config.validate()?;
    debug!("{}", config);
    Ok(config)
}

fn store_dir(store: Option<&Path>, project_file: &Path) -> PathBuf {
    match store {
        Some(store) => store.to_path_buf(),
        None => project_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(STORE_DIR),
    }
}

fn print_or_fail(rendered: Result<String>) -> i32 {
    match rendered {
        Ok(text) => {
            println!("{}", text.trim_end());
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

fn report_core_error(e: &Error) -> i32 {
    match e.kind() {
        ErrorKind::Cancelled => {
            error!("Cancelled");
            EXIT_CANCELLED
        }
        ErrorKind::Structural => {
            error!("{}", e);
            EXIT_INVALID
        }
        kind => {
            error!(kind = ?kind, "{}", e);
            EXIT_FAILURE
        }
    }
}

fn report_error(e: &anyhow::Error) -> i32 {
    if let Some(core) = e.downcast_ref::<Error>() {
        return report_core_error(core);
    }
    error!("{:#}", e);
    EXIT_FAILURE
}
