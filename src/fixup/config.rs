//! Classification of environment variables against the external config store

use crate::compose::Project;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Display value for anything backed by the config store
pub const MASKED_VALUE: &str = "*****";

/// Lists the names registered in the external config store
#[async_trait]
pub trait ConfigLister: Send + Sync {
    async fn list_config_names(&self, project: &str) -> anyhow::Result<Vec<String>>;
}

/// A fixed list of config names, for offline use and tests
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLister {
    names: Vec<String>,
}

impl StaticConfigLister {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ConfigLister for StaticConfigLister {
    async fn list_config_names(&self, _project: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.names.clone())
    }
}

/// Sorted snapshot of registered config names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRegistry {
    names: Vec<String>,
}

impl ConfigRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Loads the registry; a failing lister degrades to an empty registry.
    pub async fn load(lister: &dyn ConfigLister, project: &str) -> Self {
        match lister.list_config_names(project).await {
            Ok(names) => Self::new(names),
            Err(e) => {
                debug!(error = %e, "Failed to load config names; assuming none are registered");
                Self::default()
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .binary_search_by(|probe| probe.as_str().cmp(name))
            .is_ok()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Where the effective value of an environment variable comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// A literal (or unset) value in the project file
    ComposeFile,
    /// The config store
    Config,
    /// A literal that interpolates one or more config values
    Mixed,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigSource::ComposeFile => "compose_file",
            ConfigSource::Config => "config",
            ConfigSource::Mixed => "compose_file and config",
        };
        write!(f, "{}", s)
    }
}

/// Classification of a single environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub source: ConfigSource,
    /// Value safe to show to the user
    pub display: String,
}

fn interpolation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\$(\$)|\$(?:\{([^}]+)\}|([_a-z][_a-z0-9]*))|([^$]+)").expect("valid regex")
    })
}

/// Names referenced by `${NAME}` or `$NAME`; `$$` is an escaped dollar.
///
/// Default/required modifiers are stripped, so `${DB:-x}` yields `DB`.
pub fn interpolation_references(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in interpolation_regex().captures_iter(value) {
        if let Some(braced) = caps.get(2) {
            let name = braced
                .as_str()
                .split([':', '-', '?', '+'])
                .next()
                .unwrap_or_default()
                .trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        } else if let Some(bare) = caps.get(3) {
            names.push(bare.as_str().to_string());
        }
    }
    names
}

/// Classifies environment variables against a registry snapshot
#[derive(Debug, Clone, Copy)]
pub struct ConfigClassifier<'a> {
    registry: &'a ConfigRegistry,
}

impl<'a> ConfigClassifier<'a> {
    pub fn new(registry: &'a ConfigRegistry) -> Self {
        Self { registry }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// A registered key always wins over whatever literal the file contains.
    pub fn classify(&self, name: &str, value: Option<&str>) -> Classification {
        if self.registry.contains(name) {
            return Classification {
                source: ConfigSource::Config,
                display: MASKED_VALUE.to_string(),
            };
        }
        let Some(value) = value else {
            return Classification {
                source: ConfigSource::ComposeFile,
                display: String::new(),
            };
        };
        let source = if interpolation_references(value)
            .iter()
            .any(|reference| self.registry.contains(reference))
        {
            ConfigSource::Mixed
        } else {
            ConfigSource::ComposeFile
        };
        Classification {
            source,
            display: value.to_string(),
        }
    }
}

/// Config names the project needs but the registry does not have.
///
/// Covers unset environment values and every interpolation reference; the
/// result is sorted and deduplicated.
pub fn missing_configs(project: &Project, registry: &ConfigRegistry) -> Vec<String> {
    let mut names = Vec::new();
    for service in &project.services {
        for (key, value) in &service.environment {
            match value {
                None => names.push(key.clone()),
                Some(value) => names.extend(interpolation_references(value)),
            }
        }
    }
    names.sort();
    names.dedup();
    names.retain(|name| !registry.contains(name));
    names
}
