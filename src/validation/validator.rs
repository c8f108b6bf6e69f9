use crate::compose::{normalize_service_name, Project};
use crate::validation::rules::{
    BuildDirectivesRule, DeployRule, ExtensionsRule, HealthCheckRule, ImageOrBuildRule, PortsRule,
    SecretsRule, ServiceDirectivesRule, ServiceNameRule, ValidationRule,
};
use crate::warnings::Warnings;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// One structural violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service {service:?}: [{rule}] {message}")]
pub struct ValidationError {
    pub service: String,
    pub rule: &'static str,
    pub message: String,
}

/// Every violation found in a project, sorted by service name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    fn new(mut errors: Vec<ValidationError>) -> Self {
        errors.sort_by(|a, b| a.service.cmp(&b.service));
        Self(errors)
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first_service(&self) -> Option<&str> {
        self.0.first().map(|e| e.service.as_str())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub struct ProjectValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ProjectValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Runs every rule on every service and reports all violations together.
    ///
    /// Services are visited in name order so warnings and errors are stable
    /// regardless of declaration order.
    pub fn validate(&self, project: &Project) -> Result<Warnings, ValidationErrors> {
        let mut services: Vec<_> = project.services.iter().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));

        let mut warnings = Warnings::new();
        let mut errors = Vec::new();
        let mut normalized: HashMap<String, &str> = HashMap::new();

        for service in services {
            if !service.name.is_empty() {
                let key = normalize_service_name(&service.name);
                if let Some(other) = normalized.insert(key, &service.name) {
                    errors.push(ValidationError {
                        service: service.name.clone(),
                        rule: "UniqueNames",
                        message: format!(
                            "the service names {:?} and {:?} normalize to the same value",
                            other, service.name
                        ),
                    });
                }
            }

            for rule in &self.rules {
                if let Err(e) = rule.validate(service, project, &mut warnings) {
                    errors.push(ValidationError {
                        service: service.name.clone(),
                        rule: rule.name(),
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(
            services = project.services.len(),
            errors = errors.len(),
            warnings = warnings.len(),
            "Validated project"
        );
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ValidationErrors::new(errors))
        }
    }
}

impl Default for ProjectValidator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(ServiceNameRule),
                Box::new(ImageOrBuildRule),
                Box::new(BuildDirectivesRule),
                Box::new(ServiceDirectivesRule),
                Box::new(SecretsRule),
                Box::new(PortsRule),
                Box::new(HealthCheckRule),
                Box::new(DeployRule),
                Box::new(ExtensionsRule),
            ],
        }
    }
}
