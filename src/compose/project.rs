use super::service::Service;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read project file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// A compose project as handed over by the loader.
///
/// Service order is the declaration order and is preserved in every output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub working_dir: PathBuf,
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub networks: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub volumes: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, SecretDefinition>,
}

/// Top-level `secrets:` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub external: bool,
}

impl Project {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Resolves a build context path against the project working directory
    pub fn resolve_path(&self, context: &str) -> PathBuf {
        let path = Path::new(context);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let base = if self.working_dir.is_absolute() {
            self.working_dir.clone()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&self.working_dir))
                .unwrap_or_else(|_| self.working_dir.clone())
        };
        base.join(path)
    }

    /// Reads a serialized project (JSON, or YAML for `.yaml`/`.yml` files).
    ///
    /// A relative or missing `working_dir` is taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let mut project: Project = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| LoadError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| LoadError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };

        if !project.working_dir.is_absolute() {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            project.working_dir = dir.join(&project.working_dir);
        }
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_path() {
        let project = Project::new("p", "/work");
        assert_eq!(project.resolve_path("app"), PathBuf::from("/work/app"));
        assert_eq!(project.resolve_path("/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_from_file_yaml_preserves_service_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project.yaml");
        fs::write(
            &path,
            "name: demo\nservices:\n  - name: zeta\n    image: nginx\n  - name: alpha\n    image: redis\n",
        )
        .unwrap();

        let project = Project::from_file(&path).unwrap();
        assert_eq!(project.name, "demo");
        let names: Vec<_> = project.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(project.working_dir, temp_dir.path().join(""));
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("project.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Project::from_file(&path),
            Err(LoadError::Parse { .. })
        ));
    }
}
