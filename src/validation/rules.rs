use crate::compose::extension::{MONGODB, POSTGRES, REDIS};
use crate::compose::{
    is_mongo_image, is_postgres_image, is_redis_image, normalize_service_name, Port, PortMode,
    Project, Protocol, Service,
};
use crate::warnings::Warnings;
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 32767;
pub const MAX_NAME_LEN: usize = 63;

const DEFAULT_HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(30);

/// A structural check applied to one service.
///
/// Returning an error rejects the project; advisories go into `warnings`.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, service: &Service, project: &Project, warnings: &mut Warnings)
        -> Result<()>;
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid regex"))
}

fn secret_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid regex"))
}

pub struct ServiceNameRule;

impl ValidationRule for ServiceNameRule {
    fn name(&self) -> &'static str {
        "ServiceName"
    }

    fn validate(&self, service: &Service, _project: &Project, _warnings: &mut Warnings) -> Result<()> {
        if service.name.is_empty() {
            anyhow::bail!("service name is required");
        }
        let normalized = normalize_service_name(&service.name);
        if normalized.len() > MAX_NAME_LEN || !identifier_regex().is_match(&normalized) {
            anyhow::bail!(
                "service name {:?} must normalize to a DNS label of at most {} characters, got {:?}",
                service.name,
                MAX_NAME_LEN,
                normalized
            );
        }
        Ok(())
    }
}

pub struct ImageOrBuildRule;

impl ValidationRule for ImageOrBuildRule {
    fn name(&self) -> &'static str {
        "ImageOrBuild"
    }

    fn validate(&self, service: &Service, _project: &Project, _warnings: &mut Warnings) -> Result<()> {
        match &service.build {
            Some(build) if build.context.is_empty() => anyhow::bail!("build.context is required"),
            Some(_) => Ok(()),
            None if service.image().is_empty() => anyhow::bail!("missing image or build"),
            None => Ok(()),
        }
    }
}

/// Build directives the remote builder cannot honour
pub struct BuildDirectivesRule;

impl ValidationRule for BuildDirectivesRule {
    fn name(&self) -> &'static str {
        "BuildDirectives"
    }

    fn validate(&self, service: &Service, _project: &Project, warnings: &mut Warnings) -> Result<()> {
        let Some(build) = &service.build else {
            return Ok(());
        };

        if let Some(dockerfile) = &build.dockerfile {
            if dockerfile.starts_with('/') {
                anyhow::bail!("dockerfile path must be relative to the build context");
            }
            let cleaned = dockerfile.trim_start_matches("./");
            if cleaned == ".." || cleaned.starts_with("../") {
                anyhow::bail!("dockerfile path must be inside the build context");
            }
        }

        let unsupported = [
            ("ssh", !build.ssh.is_empty()),
            ("extra_hosts", !build.extra_hosts.is_empty()),
            ("network", build.network.is_some()),
            ("secrets", !build.secrets.is_empty()),
            ("tags", !build.tags.is_empty()),
            ("platforms", !build.platforms.is_empty()),
            ("privileged", build.privileged),
            ("dockerfile_inline", build.dockerfile_inline.is_some()),
            ("additional_contexts", !build.additional_contexts.is_empty()),
        ];
        if let Some((directive, _)) = unsupported.iter().find(|(_, present)| *present) {
            anyhow::bail!("unsupported compose directive: build {}", directive);
        }

        if build.ulimits.is_some() {
            warnings.service(&service.name, "unsupported compose directive: build ulimits");
        }

        let ignored = [
            ("labels", !build.labels.is_empty()),
            ("cache_from", !build.cache_from.is_empty()),
            ("cache_to", !build.cache_to.is_empty()),
            ("no_cache", build.no_cache),
            ("isolation", build.isolation.is_some()),
        ];
        for (directive, _) in ignored.iter().filter(|(_, present)| *present) {
            debug!(service = %service.name, "Ignoring unsupported compose directive: build {}", directive);
        }
        Ok(())
    }
}

/// Service-level compose directives without a counterpart on the platform
pub struct ServiceDirectivesRule;

impl ValidationRule for ServiceDirectivesRule {
    fn name(&self) -> &'static str {
        "ServiceDirectives"
    }

    fn validate(&self, service: &Service, project: &Project, warnings: &mut Warnings) -> Result<()> {
        if service.hostname.is_some() {
            anyhow::bail!("unsupported compose directive: hostname; consider using 'domainname' instead");
        }
        let unsupported = [
            ("dns_search", !service.dns_search.is_empty()),
            ("dns", !service.dns.is_empty()),
            ("devices", !service.devices.is_empty()),
            ("device_cgroup_rules", !service.device_cgroup_rules.is_empty()),
            ("entrypoint", !service.entrypoint.is_empty()),
            ("group_add", !service.group_add.is_empty()),
        ];
        if let Some((directive, _)) = unsupported.iter().find(|(_, present)| *present) {
            anyhow::bail!("unsupported compose directive: {}", directive);
        }

        if !service.volumes.is_empty() {
            warnings.service(&service.name, "unsupported compose directive: volumes");
        }
        if !service.volumes_from.is_empty() {
            warnings.service(&service.name, "unsupported compose directive: volumes_from");
        }

        let restart_ignored = service
            .restart
            .as_deref()
            .is_some_and(|policy| policy != "always" && policy != "unless-stopped");
        let ignored = [
            ("read_only", service.read_only),
            ("restart", restart_ignored),
            ("container_name", service.container_name.is_some()),
            ("dns_opt", !service.dns_opt.is_empty()),
            ("depends_on", !service.depends_on.is_empty()),
            ("ipc", service.ipc.is_some()),
            ("uts", service.uts.is_some()),
            ("isolation", service.isolation.is_some()),
            ("mac_address", service.mac_address.is_some()),
            ("labels", !service.labels.is_empty()),
            ("links", !service.links.is_empty()),
            ("logging", service.logging.is_some()),
        ];
        for (directive, _) in ignored.iter().filter(|(_, present)| *present) {
            debug!(service = %service.name, "Ignoring unsupported compose directive: {}", directive);
        }
        for network in &service.networks {
            if !project.networks.contains(network) {
                debug!(service = %service.name, network = %network, "Network is not declared at the top level");
            }
        }
        Ok(())
    }
}

pub struct SecretsRule;

impl ValidationRule for SecretsRule {
    fn name(&self) -> &'static str {
        "Secrets"
    }

    fn validate(&self, service: &Service, project: &Project, warnings: &mut Warnings) -> Result<()> {
        for secret in &service.secrets {
            if !secret_name_regex().is_match(&secret.source) {
                anyhow::bail!("secret {:?} must be a valid environment variable name", secret.source);
            }
            match project.secrets.get(&secret.source) {
                None => {
                    debug!(service = %service.name, secret = %secret.source, "Secret is not declared at the top level");
                }
                Some(definition) => {
                    if let Some(name) = definition.name.as_deref() {
                        if !name.is_empty() && name != secret.source {
                            anyhow::bail!(
                                "unsupported secret {:?}: cannot override name {:?}",
                                secret.source,
                                name
                            );
                        }
                    }
                    if !definition.external {
                        warnings.service(
                            &service.name,
                            format!("unsupported secret {:?}: not marked external:true", secret.source),
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct PortsRule;

impl PortsRule {
    fn validate_port(port: &Port) -> Result<()> {
        if !(MIN_PORT..=MAX_PORT).contains(&port.target) {
            anyhow::bail!(
                "port {}: 'target' must be an integer between {} and {}",
                port.target,
                MIN_PORT,
                MAX_PORT
            );
        }
        if port.host_ip.as_deref().is_some_and(|ip| !ip.is_empty()) {
            anyhow::bail!("port {}: 'host_ip' is not supported", port.target);
        }
        if let Some(Protocol::Other(protocol)) = &port.protocol {
            anyhow::bail!(
                "port {}: 'protocol' not one of [tcp udp http http2 grpc]: {}",
                port.target,
                protocol
            );
        }
        if let Some(PortMode::Other(mode)) = &port.mode {
            anyhow::bail!("port {}: 'mode' not one of [host ingress]: {}", port.target, mode);
        }
        if port.is_ingress() && port.is_udp() {
            anyhow::bail!("port {}: `mode: ingress` is not supported by `protocol: udp`", port.target);
        }
        Ok(())
    }

    /// Advisory only; `published` is ignored by the platform either way
    fn check_published(port: &Port, service: &str, warnings: &mut Warnings) {
        let Some(published) = port.published.as_deref().filter(|p| !p.is_empty()) else {
            return;
        };
        let (start, end) = match published.split_once('-') {
            Some((start, end)) => (start, Some(end)),
            None => (published, None),
        };
        let Ok(start) = start.parse::<u16>() else {
            warnings.service(
                service,
                format!(
                    "port {}: 'published' range start should be an integer; ignoring 'published: {}'",
                    port.target, start
                ),
            );
            return;
        };
        let start = u32::from(start);
        let message = match end {
            Some(end) => match end.parse::<u16>().map(u32::from) {
                Err(_) => Some(format!(
                    "'published' range end should be an integer; ignoring 'published: {}'",
                    end
                )),
                Ok(end) if start > end => Some(format!(
                    "'published' range start should be less than end; ignoring 'published: {}'",
                    published
                )),
                Ok(end) if port.target < start || port.target > end => Some(format!(
                    "'published' range should include 'target'; ignoring 'published: {}'",
                    published
                )),
                Ok(_) => None,
            },
            None if start != port.target => Some(format!(
                "'published' should be equal to 'target'; ignoring 'published: {}'",
                published
            )),
            None => None,
        };
        if let Some(message) = message {
            warnings.service(service, format!("port {}: {}", port.target, message));
        }
    }
}

impl ValidationRule for PortsRule {
    fn name(&self) -> &'static str {
        "Ports"
    }

    fn validate(&self, service: &Service, _project: &Project, warnings: &mut Warnings) -> Result<()> {
        let mut seen = HashSet::new();
        for port in &service.ports {
            Self::validate_port(port)?;
            if !seen.insert(port.target) {
                anyhow::bail!("duplicate target port {}", port.target);
            }
            Self::check_published(port, &service.name, warnings);
        }
        Ok(())
    }
}

pub struct HealthCheckRule;

impl HealthCheckRule {
    fn warn_fractional(name: &str, value: Duration, service: &str, warnings: &mut Warnings) {
        if value.subsec_nanos() != 0 {
            warnings.service(
                service,
                format!("healthcheck {} must be a multiple of 1s", name),
            );
        }
    }
}

impl ValidationRule for HealthCheckRule {
    fn name(&self) -> &'static str {
        "HealthCheck"
    }

    fn validate(&self, service: &Service, _project: &Project, warnings: &mut Warnings) -> Result<()> {
        let ingress = service
            .ports
            .iter()
            .find(|port| port.effective_mode() == PortMode::Ingress);

        let healthcheck = match &service.healthcheck {
            Some(hc) if !hc.disable => hc,
            _ => {
                if let Some(port) = ingress {
                    warnings.service(
                        &service.name,
                        format!(
                            "ingress port {} without healthcheck; defaults to GET / HTTP/1.1",
                            port.target
                        ),
                    );
                }
                return Ok(());
            }
        };

        if let Some((kind, args)) = healthcheck.test.split_first() {
            match kind.as_str() {
                "CMD" | "CMD-SHELL" => {
                    let local = args
                        .iter()
                        .any(|arg| arg.contains("localhost") || arg.contains("127.0.0.1"));
                    if ingress.is_some() && !local {
                        anyhow::bail!(
                            "invalid healthcheck: ingress ports require an HTTP healthcheck on `localhost`"
                        );
                    }
                }
                "NONE" => {
                    if ingress.is_some() {
                        anyhow::bail!(
                            "invalid healthcheck: ingress ports require a CMD or CMD-SHELL healthcheck"
                        );
                    }
                }
                _ => anyhow::bail!("unsupported healthcheck: {:?}", healthcheck.test),
            }
        }

        let timeout = healthcheck.timeout.unwrap_or(DEFAULT_HEALTHCHECK_TIMEOUT);
        let interval = healthcheck.interval.unwrap_or(DEFAULT_HEALTHCHECK_INTERVAL);
        Self::warn_fractional("timeout", timeout, &service.name, warnings);
        Self::warn_fractional("interval", interval, &service.name, warnings);
        if interval < timeout || timeout.is_zero() {
            anyhow::bail!(
                "healthcheck timeout {}s must be positive and smaller than the interval {}s",
                timeout.as_secs_f64(),
                interval.as_secs_f64()
            );
        }

        if healthcheck.start_period.is_some() {
            debug!(service = %service.name, "Ignoring unsupported compose directive: healthcheck start_period");
        }
        if healthcheck.start_interval.is_some() {
            debug!(service = %service.name, "Ignoring unsupported compose directive: healthcheck start_interval");
        }
        Ok(())
    }
}

pub struct DeployRule;

impl ValidationRule for DeployRule {
    fn name(&self) -> &'static str {
        "Deploy"
    }

    fn validate(&self, service: &Service, _project: &Project, warnings: &mut Warnings) -> Result<()> {
        let reservations = match &service.deploy {
            None => None,
            Some(deploy) => {
                if let Some(mode) = deploy.mode.as_deref() {
                    if !mode.is_empty() && mode != "replicated" {
                        anyhow::bail!("unsupported compose directive: deploy mode: {:?}", mode);
                    }
                }
                let unsupported = [
                    ("update_config", deploy.update_config.is_some()),
                    ("rollback_config", deploy.rollback_config.is_some()),
                    ("restart_policy", deploy.restart_policy.is_some()),
                    ("endpoint_mode", deploy.endpoint_mode.is_some()),
                ];
                if let Some((directive, _)) = unsupported.iter().find(|(_, present)| *present) {
                    anyhow::bail!("unsupported compose directive: deploy {}", directive);
                }

                let resources = &deploy.resources;
                if resources.limits.is_some() && resources.reservations.is_none() {
                    debug!(service = %service.name, "No reservations specified; using limits as reservations");
                }
                let reservations = resources.effective_reservations();
                if let Some(cpus) = reservations.and_then(|r| r.cpus) {
                    if cpus < 0.0 {
                        anyhow::bail!("invalid value for cpus: {}", cpus);
                    }
                }
                if !deploy.labels.is_empty() {
                    debug!(service = %service.name, "Ignoring unsupported compose directive: deploy labels");
                }
                if deploy.placement.is_some() {
                    debug!(service = %service.name, "Ignoring unsupported compose directive: deploy placement");
                }
                reservations
            }
        };

        let has_memory = reservations.and_then(|r| r.memory).is_some_and(|m| m > 0);
        // Static-file pseudo-services have no container to size
        let static_site = service
            .decode_extensions()
            .is_ok_and(|decoded| decoded.static_files().is_some());
        if !has_memory && !static_site {
            warnings.service(
                &service.name,
                "missing memory reservation; using provider-specific defaults. Specify deploy.resources.reservations.memory to avoid out-of-memory errors",
            );
        }
        Ok(())
    }
}

pub struct ExtensionsRule;

impl ValidationRule for ExtensionsRule {
    fn name(&self) -> &'static str {
        "Extensions"
    }

    fn validate(&self, service: &Service, _project: &Project, warnings: &mut Warnings) -> Result<()> {
        let decoded = service.decode_extensions()?;

        let image = service.image();
        let mismatched = [
            (REDIS, is_redis_image(image), "managed Redis service should use a redis or valkey image"),
            (POSTGRES, is_postgres_image(image), "managed Postgres service should use a postgres image"),
            (MONGODB, is_mongo_image(image), "managed MongoDB service should use a mongo image"),
        ];
        for (key, matches, message) in mismatched {
            if service.has_extension(key) && !matches {
                warnings.service(&service.name, message);
            }
        }

        for key in &decoded.unknown {
            warnings.service(&service.name, format!("unsupported compose extension: {:?}", key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Build, Deploy, HealthCheck, Resource, Resources, SecretDefinition, SecretRef};
    use crate::compose::extension::{DNS_ROLE, LLM, STATIC_FILES};
    use serde_json::{json, Value};
    use yare::parameterized;

    fn run(rule: &dyn ValidationRule, service: &Service) -> (Result<()>, Warnings) {
        run_in(rule, service, &Project::new("p", "/work"))
    }

    fn run_in(rule: &dyn ValidationRule, service: &Service, project: &Project) -> (Result<()>, Warnings) {
        let mut warnings = Warnings::new();
        let result = rule.validate(service, project, &mut warnings);
        (result, warnings)
    }

    fn image_service(name: &str) -> Service {
        let mut service = Service::new(name);
        service.image = Some("nginx".to_string());
        service
    }

    fn port(target: u32, mode: Option<&str>, protocol: Option<&str>) -> Port {
        Port {
            target,
            mode: mode.map(|m| PortMode::from(m.to_string())),
            protocol: protocol.map(|p| Protocol::from(p.to_string())),
            ..Default::default()
        }
    }

    #[parameterized(
        simple = { "web", true },
        underscores = { "My_Service", true },
        empty = { "", false },
        only_symbols = { "__", false },
        leading_symbol = { "_api", false },
    )]
    fn test_service_name(name: &str, valid: bool) {
        let (result, _) = run(&ServiceNameRule, &image_service(name));
        assert_eq!(result.is_ok(), valid);
    }

    #[test]
    fn test_service_name_length() {
        assert!(run(&ServiceNameRule, &image_service(&"a".repeat(63))).0.is_ok());
        assert!(run(&ServiceNameRule, &image_service(&"a".repeat(64))).0.is_err());
    }

    #[test]
    fn test_image_or_build() {
        let (result, _) = run(&ImageOrBuildRule, &Service::new("bare"));
        assert_eq!(result.unwrap_err().to_string(), "missing image or build");

        let mut built = Service::new("built");
        built.build = Some(Build::new("."));
        assert!(run(&ImageOrBuildRule, &built).0.is_ok());

        built.build = Some(Build::new(""));
        assert!(run(&ImageOrBuildRule, &built).0.is_err());
    }

    #[parameterized(
        relative = { "app.Dockerfile", true },
        nested = { "docker/Dockerfile", true },
        dot_slash = { "./Dockerfile", true },
        absolute = { "/etc/Dockerfile", false },
        outside = { "../Dockerfile", false },
        dot_outside = { "./../Dockerfile", false },
    )]
    fn test_dockerfile_location(dockerfile: &str, valid: bool) {
        let mut service = Service::new("api");
        let mut build = Build::new(".");
        build.dockerfile = Some(dockerfile.to_string());
        service.build = Some(build);
        assert_eq!(run(&BuildDirectivesRule, &service).0.is_ok(), valid);
    }

    #[test]
    fn test_build_directives() {
        let mut service = Service::new("api");
        let mut build = Build::new(".");
        build.ulimits = Some(json!({"nofile": 1024}));
        build.no_cache = true;
        service.build = Some(build.clone());
        let (result, warnings) = run(&BuildDirectivesRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("ulimits"), 1);

        build.platforms = vec!["linux/arm64".to_string()];
        service.build = Some(build);
        let err = run(&BuildDirectivesRule, &service).0.unwrap_err();
        assert!(err.to_string().contains("platforms"));
    }

    #[test]
    fn test_service_directives() {
        let mut service = image_service("api");
        service.volumes = vec!["data:/data".to_string()];
        service.depends_on = vec!["db".to_string()];
        service.restart = Some("on-failure".to_string());
        let (result, warnings) = run(&ServiceDirectivesRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.len(), 1);

        service.hostname = Some("api.local".to_string());
        let err = run(&ServiceDirectivesRule, &service).0.unwrap_err();
        assert!(err.to_string().contains("domainname"));

        let mut service = image_service("api");
        service.entrypoint = vec!["/bin/sh".to_string()];
        assert!(run(&ServiceDirectivesRule, &service).0.is_err());
    }

    #[test]
    fn test_secrets() {
        let mut service = image_service("api");
        service.secrets.push(SecretRef {
            source: "DB_PASSWORD".to_string(),
        });
        let mut project = Project::new("p", "/work");

        let (result, warnings) = run_in(&SecretsRule, &service, &project);
        assert!(result.is_ok());
        assert!(warnings.is_empty());

        project.secrets.insert("DB_PASSWORD".to_string(), SecretDefinition::default());
        let (result, warnings) = run_in(&SecretsRule, &service, &project);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("external:true"), 1);

        project.secrets.insert(
            "DB_PASSWORD".to_string(),
            SecretDefinition {
                name: Some("other".to_string()),
                external: true,
            },
        );
        let err = run_in(&SecretsRule, &service, &project).0.unwrap_err();
        assert!(err.to_string().contains("cannot override name"));

        service.secrets[0].source = "1bad-name".to_string();
        assert!(run(&SecretsRule, &service).0.is_err());
    }

    #[parameterized(
        zero = { port(0, None, None), false },
        too_high = { port(32768, None, None), false },
        max = { port(32767, None, None), true },
        ingress_udp = { port(53, Some("ingress"), Some("udp")), false },
        host_udp = { port(53, Some("host"), Some("udp")), true },
        unset_mode_udp = { port(53, None, Some("udp")), true },
        bad_protocol = { port(80, None, Some("sctp")), false },
        bad_mode = { port(80, Some("bridge"), None), false },
    )]
    fn test_port(port: Port, valid: bool) {
        let mut service = image_service("api");
        service.ports.push(port);
        assert_eq!(run(&PortsRule, &service).0.is_ok(), valid);
    }

    #[test]
    fn test_duplicate_targets() {
        let mut service = image_service("api");
        service.ports.push(port(80, Some("ingress"), None));
        service.ports.push(port(80, Some("host"), Some("tcp")));
        let err = run(&PortsRule, &service).0.unwrap_err();
        assert_eq!(err.to_string(), "duplicate target port 80");
    }

    #[test]
    fn test_host_ip_rejected() {
        let mut service = image_service("api");
        let mut p = port(80, None, None);
        p.host_ip = Some("127.0.0.1".to_string());
        service.ports.push(p);
        assert!(run(&PortsRule, &service).0.is_err());
    }

    #[parameterized(
        equal = { "8080", 8080, 0 },
        different = { "80", 8080, 1 },
        range_including = { "8000-8100", 8080, 0 },
        range_excluding = { "9000-9100", 8080, 1 },
        reversed = { "9100-9000", 9050, 1 },
        not_a_number = { "http", 8080, 1 },
        bad_end = { "8000-x", 8080, 1 },
    )]
    fn test_published(published: &str, target: u32, expected: usize) {
        let mut service = image_service("api");
        let mut p = port(target, Some("host"), None);
        p.published = Some(published.to_string());
        service.ports.push(p);
        let (result, warnings) = run(&PortsRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("'published"), expected);
    }

    fn with_healthcheck(test: &[&str]) -> Service {
        let mut service = image_service("web");
        service.ports.push(Port::ingress(80));
        service.healthcheck = Some(HealthCheck {
            test: test.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        service
    }

    #[parameterized(
        curl_localhost = { &["CMD", "curl", "-f", "http://localhost/health"], true },
        shell_loopback = { &["CMD-SHELL", "wget -q -O- http://127.0.0.1:80/"], true },
        remote_url = { &["CMD", "curl", "-f", "http://example.com/"], false },
        none_with_ingress = { &["NONE"], false },
        unknown_kind = { &["RUN", "true"], false },
    )]
    fn test_healthcheck_with_ingress(test: &[&str], valid: bool) {
        assert_eq!(run(&HealthCheckRule, &with_healthcheck(test)).0.is_ok(), valid);
    }

    #[test]
    fn test_healthcheck_none_without_ingress() {
        let mut service = with_healthcheck(&["NONE"]);
        service.ports = vec![Port::host(5432, Protocol::Tcp)];
        assert!(run(&HealthCheckRule, &service).0.is_ok());
    }

    #[test]
    fn test_missing_healthcheck_warns_for_ingress() {
        let mut service = image_service("web");
        service.ports.push(port(8080, None, None));
        let (result, warnings) = run(&HealthCheckRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("ingress port 8080 without healthcheck"), 1);
    }

    #[test]
    fn test_healthcheck_timing() {
        let mut service = with_healthcheck(&["CMD", "curl", "http://localhost"]);
        let hc = service.healthcheck.as_mut().unwrap();
        hc.interval = Some(Duration::from_secs(10));
        hc.timeout = Some(Duration::from_millis(2500));
        let (result, warnings) = run(&HealthCheckRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("multiple of 1s"), 1);

        let hc = service.healthcheck.as_mut().unwrap();
        hc.interval = Some(Duration::from_secs(2));
        hc.timeout = Some(Duration::from_secs(5));
        assert!(run(&HealthCheckRule, &service).0.is_err());

        let hc = service.healthcheck.as_mut().unwrap();
        hc.interval = None;
        hc.timeout = Some(Duration::ZERO);
        assert!(run(&HealthCheckRule, &service).0.is_err());
    }

    #[test]
    fn test_deploy() {
        let mut service = image_service("api");
        let (result, warnings) = run(&DeployRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("missing memory reservation"), 1);

        service.deploy = Some(Deploy {
            resources: Resources {
                limits: Some(Resource {
                    cpus: Some(0.5),
                    memory: Some(512 * 1024 * 1024),
                }),
                reservations: None,
            },
            ..Default::default()
        });
        let (result, warnings) = run(&DeployRule, &service);
        assert!(result.is_ok());
        assert!(warnings.is_empty());

        service.deploy.as_mut().unwrap().mode = Some("global".to_string());
        assert!(run(&DeployRule, &service).0.is_err());

        let mut service = image_service("api");
        service.deploy = Some(Deploy {
            resources: Resources {
                limits: None,
                reservations: Some(Resource {
                    cpus: Some(-1.0),
                    memory: None,
                }),
            },
            ..Default::default()
        });
        let err = run(&DeployRule, &service).0.unwrap_err();
        assert!(err.to_string().contains("cpus"));
    }

    #[test]
    fn test_static_files_suppresses_memory_warning() {
        let mut service = image_service("site");
        service.extensions.insert(STATIC_FILES.to_string(), json!("dist"));
        let (_, warnings) = run(&DeployRule, &service);
        assert!(warnings.is_empty());

        service.extensions.insert(STATIC_FILES.to_string(), Value::Null);
        let (_, warnings) = run(&DeployRule, &service);
        assert_eq!(warnings.count_containing("missing memory reservation"), 1);
    }

    #[test]
    fn test_extensions() {
        let mut service = image_service("cache");
        service.extensions.insert(REDIS.to_string(), json!(true));
        service.extensions.insert("x-custom".to_string(), json!(1));
        let (result, warnings) = run(&ExtensionsRule, &service);
        assert!(result.is_ok());
        assert_eq!(warnings.count_containing("redis or valkey image"), 1);
        assert_eq!(warnings.count_containing("unsupported compose extension: \"x-custom\""), 1);

        service.extensions.insert("x-defang-dns-role".to_string(), json!(42));
        assert!(run(&ExtensionsRule, &service).0.is_err());
    }

    #[test]
    fn test_recognized_extensions_do_not_warn() {
        let mut service = image_service("chat");
        service.extensions.insert(LLM.to_string(), json!(true));
        service.extensions.insert(DNS_ROLE.to_string(), Value::Null);
        service.extensions.insert(STATIC_FILES.to_string(), Value::Null);
        let (result, warnings) = run(&ExtensionsRule, &service);
        assert!(result.is_ok());
        assert!(warnings.is_empty(), "{:?}", warnings);
    }
}
