use super::config::{ConfigClassifier, ConfigRegistry, ConfigSource};
use super::managed::{add_managed_store_port, strip_unsupported_extensions, warn_if_stateful, ProviderKind};
use super::names::{DnsNamer, RewriteTarget, ServiceNameResolver};
use super::port::PortNormalizer;
use super::secrets::scan_literal;
use crate::compose::{normalize_service_name, Project, Service};
use crate::context::{ArchiveLimits, ArchiveUploader, BuildContext, BuildContextPackager, UploadMode};
use crate::error::{Error, Result};
use crate::warnings::Warnings;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct FixupOptions {
    pub upload_mode: UploadMode,
    pub provider: ProviderKind,
    /// Services processed at once; at least 1
    pub concurrency: usize,
    pub limits: ArchiveLimits,
}

impl Default for FixupOptions {
    fn default() -> Self {
        Self {
            upload_mode: UploadMode::Digest,
            provider: ProviderKind::Byoc,
            concurrency: DEFAULT_CONCURRENCY,
            limits: ArchiveLimits::default(),
        }
    }
}

/// How one environment variable was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVariable {
    pub source: ConfigSource,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
}

/// A service after fixup, ready for deployment submission
#[derive(Debug, Clone, Serialize)]
pub struct FixedService {
    pub service: Service,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_context: Option<BuildContext>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, ResolvedVariable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixupOutput {
    pub project: String,
    pub services: Vec<FixedService>,
    pub warnings: Warnings,
}

/// One row of the environment resolution summary
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ConfigRow {
    pub service: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    pub source: ConfigSource,
}

impl FixupOutput {
    /// Every environment variable of every service, sorted by service then name
    pub fn config_summary(&self) -> Vec<ConfigRow> {
        let mut rows: Vec<ConfigRow> = self
            .services
            .iter()
            .flat_map(|fixed| {
                fixed.config.iter().map(|(name, resolved)| ConfigRow {
                    service: fixed.service.name.clone(),
                    name: name.clone(),
                    value: resolved.value.clone(),
                    source: resolved.source,
                })
            })
            .collect();
        rows.sort();
        rows.dedup();
        rows
    }
}

/// Turns a validated project into deployable services.
///
/// Per-service work runs concurrently; results and warnings are returned in
/// service declaration order.
pub struct ServiceFixupPipeline {
    packager: BuildContextPackager,
    registry: ConfigRegistry,
    namer: Arc<dyn DnsNamer>,
    options: FixupOptions,
}

struct ServiceContext<'a> {
    /// The project with its services taken out
    project: &'a Project,
    resolver: &'a ServiceNameResolver,
    cancel: &'a CancellationToken,
}

impl ServiceFixupPipeline {
    pub fn new(
        uploader: Arc<dyn ArchiveUploader>,
        registry: ConfigRegistry,
        namer: Arc<dyn DnsNamer>,
        options: FixupOptions,
    ) -> Self {
        let packager = BuildContextPackager::new(uploader, options.upload_mode).with_limits(options.limits);
        Self {
            packager,
            registry,
            namer,
            options,
        }
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub async fn run(&self, project: Project, cancel: &CancellationToken) -> Result<FixupOutput> {
        info!(
            project = %project.name,
            services = project.services.len(),
            mode = %self.options.upload_mode,
            "Fixing up services"
        );

        let mut project = project;
        let normalizer = PortNormalizer::new();
        let mut collectors = Vec::with_capacity(project.services.len());
        for service in &mut project.services {
            let mut warnings = Warnings::new();
            normalizer.normalize_service(service, &mut warnings)?;
            add_managed_store_port(service)?;
            collectors.push(warnings);
        }

        let resolver = ServiceNameResolver::new(&project, self.namer.as_ref());
        let services = std::mem::take(&mut project.services);
        let cancel = cancel.child_token();
        let ctx = ServiceContext {
            project: &project,
            resolver: &resolver,
            cancel: &cancel,
        };

        let results: Vec<(FixedService, Warnings)> = stream::iter(services.into_iter().zip(collectors))
            .map(|(service, warnings)| self.fix_service(service, warnings, &ctx))
            .buffered(self.options.concurrency.max(1))
            .try_collect()
            .await
            .map_err(|e| {
                cancel.cancel();
                e
            })?;

        let mut warnings = Warnings::new();
        let mut fixed = Vec::with_capacity(results.len());
        for (service, service_warnings) in results {
            warnings.extend(service_warnings);
            fixed.push(service);
        }

        Ok(FixupOutput {
            project: project.name,
            services: fixed,
            warnings,
        })
    }

    async fn fix_service(
        &self,
        mut service: Service,
        mut warnings: Warnings,
        ctx: &ServiceContext<'_>,
    ) -> Result<(FixedService, Warnings)> {
        let name = service.name.clone();
        let mode = self.options.upload_mode;
        debug!(service = %name, "Fixing up service");

        let mut build_context = None;
        if let Some(build) = service.build.as_mut() {
            let root = ctx.project.resolve_path(&build.context);
            let packaged = self
                .packager
                .package(&name, &root, build.dockerfile_or_default(), ctx.cancel, &mut warnings)
                .await
                .map_err(|source| Error::package(&name, source))?;
            build.context = packaged.url.clone();
            build_context = Some(packaged);

            let mut removed = Vec::new();
            let mut args = BTreeMap::new();
            for (key, value) in std::mem::take(&mut build.args) {
                match value {
                    Some(value) if !key.is_empty() && !value.is_empty() => {
                        let value = ctx
                            .resolver
                            .rewrite(&name, &key, &value, RewriteTarget::BuildArgs, &mut warnings);
                        args.insert(key, Some(value));
                    }
                    _ => removed.push(key),
                }
            }
            build.args = args;
            if !removed.is_empty() {
                warnings.service(&name, format!("skipping unset build argument(s) {:?}", removed));
            }
        }

        for (i, secret) in std::mem::take(&mut service.secrets).into_iter().enumerate() {
            if i == 0 {
                warnings.service(
                    &name,
                    "secrets will be exposed as environment variables, not files (use 'environment' instead)",
                );
            }
            service.environment.insert(secret.source, None);
        }

        let config = self.fix_environment(&mut service, ctx.resolver, &mut warnings);

        strip_unsupported_extensions(&mut service, self.options.provider, mode, &mut warnings);
        let extensions = service.decode_extensions().map_err(|e| Error::Structural {
            service: name.clone(),
            message: e.to_string(),
        })?;
        warn_if_stateful(&service, &extensions, &mut warnings);

        let normalized = normalize_service_name(&name);
        if normalized != name {
            warnings.service(&name, format!("service name will be normalized to {:?}", normalized));
            service.name = normalized;
        }

        Ok((
            FixedService {
                service,
                build_context,
                config,
            },
            warnings,
        ))
    }

    fn fix_environment(
        &self,
        service: &mut Service,
        resolver: &ServiceNameResolver,
        warnings: &mut Warnings,
    ) -> BTreeMap<String, ResolvedVariable> {
        let name = service.name.clone();
        let classifier = ConfigClassifier::new(&self.registry);

        if service.environment.remove("").is_some() {
            warnings.service(&name, "skipping unset environment variable key");
        }

        let mut config = BTreeMap::new();
        let mut not_adjusted = Vec::new();
        let mut overridden = Vec::new();
        for (key, value) in service.environment.iter_mut() {
            let classification = classifier.classify(key, value.as_deref());
            config.insert(
                key.clone(),
                ResolvedVariable {
                    source: classification.source,
                    value: classification.display,
                },
            );

            let Some(literal) = value.as_deref() else {
                continue;
            };
            if classifier.is_registered(key) {
                if resolver.has_service_name(literal) {
                    not_adjusted.push(key.clone());
                } else {
                    overridden.push(key.clone());
                }
                *value = None;
                continue;
            }

            if let Some(kind) = scan_literal(key, literal) {
                warnings.service(
                    &name,
                    format!(
                        "environment variable {:?} looks like it contains a {}; consider using a config value instead",
                        key, kind
                    ),
                );
            }

            if self.options.upload_mode != UploadMode::Estimate {
                let rewritten = resolver.rewrite(&name, key, literal, RewriteTarget::EnvironmentVars, warnings);
                *value = Some(rewritten);
            }
        }

        if !not_adjusted.is_empty() {
            warnings.service(
                &name,
                format!(
                    "environment variable(s) {:?} will use the config value instead of adjusted service name",
                    not_adjusted
                ),
            );
        }
        if !overridden.is_empty() {
            warnings.service(
                &name,
                format!("environment variable(s) {:?} overridden by config", overridden),
            );
        }
        config
    }
}
