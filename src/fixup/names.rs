//! Cross-service name rewriting
//!
//! Values such as `http://api:8080/v1` or `redis://cache:6379` refer to other
//! services by their compose name. Services with a host-mode port are only
//! reachable through a private DNS name, so references to them are rewritten;
//! references to any other service are left alone with a warning.

use crate::compose::{normalize_service_name, Project};
use crate::warnings::Warnings;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Kind of value being rewritten; only changes diagnostic wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteTarget {
    BuildArgs,
    EnvironmentVars,
}

impl fmt::Display for RewriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteTarget::BuildArgs => write!(f, "build argument"),
            RewriteTarget::EnvironmentVars => write!(f, "environment variable"),
        }
    }
}

/// Supplies the private DNS name a service is reachable at
pub trait DnsNamer: Send + Sync {
    fn private_dns_name(&self, service: &str) -> String;
}

/// `<service>.<project>.internal`, both labels normalized
#[derive(Debug, Clone)]
pub struct InternalDnsNamer {
    project: String,
}

impl InternalDnsNamer {
    pub fn new(project: &str) -> Self {
        Self {
            project: normalize_service_name(project),
        }
    }
}

impl DnsNamer for InternalDnsNamer {
    fn private_dns_name(&self, service: &str) -> String {
        let name = normalize_service_name(service);
        if self.project.is_empty() {
            format!("{}.internal", name)
        } else {
            format!("{}.{}.internal", name, self.project)
        }
    }
}

/// Matches any of a fixed set of service names as a standalone reference
#[derive(Debug, Clone)]
struct NameSet {
    regex: Regex,
}

impl NameSet {
    fn new(names: &[String]) -> Option<Self> {
        if names.is_empty() {
            return None;
        }
        let mut sorted: Vec<&String> = names.iter().collect();
        // Longest first so `api-v2` wins over `api` at the same position
        sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = sorted
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!("(?:{})", alternation)).expect("escaped names form a valid regex");
        Some(Self { regex })
    }

    /// Byte ranges of every standalone reference in `value`
    fn find_all(&self, value: &str) -> Vec<(usize, usize)> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos <= value.len() {
            let Some(m) = self.regex.find_at(value, pos) else {
                break;
            };
            if is_reference(value, m.start(), m.end()) {
                found.push((m.start(), m.end()));
                pos = m.end();
            } else {
                pos = m.start() + value[m.start()..].chars().next().map_or(1, char::len_utf8);
            }
        }
        found
    }

    fn is_match(&self, value: &str) -> bool {
        !self.find_all(value).is_empty()
    }
}

/// The name must not continue a longer word or DNS label before it, and must be
/// followed by a path, a `:port`, or the end of the value.
fn is_reference(value: &str, start: usize, end: usize) -> bool {
    let preceded_ok = value[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '-'));
    if !preceded_ok {
        return false;
    }
    let rest = &value[end..];
    rest.is_empty()
        || rest.starts_with('/')
        || rest
            .strip_prefix(':')
            .is_some_and(|port| port.starts_with(|c: char| c.is_ascii_digit()))
}

/// Built once per project and shared read-only by every service fixup
#[derive(Debug, Clone)]
pub struct ServiceNameResolver {
    private: Option<NameSet>,
    others: Option<NameSet>,
    dns_names: HashMap<String, String>,
}

impl ServiceNameResolver {
    /// Partitions the project's services into privately resolvable ones (at
    /// least one host-mode port) and the rest.
    pub fn new(project: &Project, namer: &dyn DnsNamer) -> Self {
        let mut private = Vec::new();
        let mut others = Vec::new();
        let mut dns_names = HashMap::new();
        for service in &project.services {
            if service.has_host_port() {
                dns_names.insert(service.name.clone(), namer.private_dns_name(&service.name));
                private.push(service.name.clone());
            } else {
                others.push(service.name.clone());
            }
        }
        debug!(
            private = private.len(),
            others = others.len(),
            "Compiled service name resolver"
        );
        Self {
            private: NameSet::new(&private),
            others: NameSet::new(&others),
            dns_names,
        }
    }

    /// Replaces every reference to a private service in `value` with its DNS name.
    pub fn rewrite(
        &self,
        service: &str,
        key: &str,
        value: &str,
        target: RewriteTarget,
        warnings: &mut Warnings,
    ) -> String {
        let rewritten = self.replace_private(value);

        if rewritten != value {
            debug!(service, key, value = %rewritten, "Service name was adjusted in {}", target);
        } else if let Some(others) = &self.others {
            if let Some(&(start, end)) = others.find_all(value).first() {
                warnings.service(
                    service,
                    format!(
                        "service name {:?} in the {} {:?} was not adjusted; only references to other services with port mode set to 'host' will be fixed-up",
                        &value[start..end],
                        target,
                        key
                    ),
                );
            }
        }
        rewritten
    }

    /// True when `value` references a privately resolvable service
    pub fn has_service_name(&self, value: &str) -> bool {
        self.private.as_ref().is_some_and(|set| set.is_match(value))
    }

    fn replace_private(&self, value: &str) -> String {
        let Some(private) = &self.private else {
            return value.to_string();
        };
        let mut out = String::with_capacity(value.len());
        let mut last = 0;
        for (start, end) in private.find_all(value) {
            let name = &value[start..end];
            let Some(dns) = self.dns_names.get(name) else {
                continue;
            };
            out.push_str(&value[last..start]);
            out.push_str(dns);
            last = end;
        }
        out.push_str(&value[last..]);
        out
    }
}
