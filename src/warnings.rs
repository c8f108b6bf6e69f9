//! Advisory diagnostics collected during a run
//!
//! Components never log advisories directly. They push them into a
//! [`Warnings`] value owned by the caller, which renders them once at the end.
//! Per-service collectors are merged in service declaration order so output
//! never depends on scheduling.

use serde::Serialize;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(service) => write!(f, "service {:?}: {}", service, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an advisory about a specific service
    pub fn service(&mut self, service: &str, message: impl Into<String>) {
        self.0.push(Warning {
            service: Some(service.to_string()),
            message: message.into(),
        });
    }

    /// Records an advisory that is not tied to a service
    pub fn global(&mut self, message: impl Into<String>) {
        self.0.push(Warning {
            service: None,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter()
    }

    /// Number of warnings whose message contains `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.0.iter().filter(|w| w.message.contains(needle)).count()
    }

    /// Emits every collected warning through `tracing`, in order
    pub fn log(&self) {
        for warning in &self.0 {
            warn!("{}", warning);
        }
    }
}

impl IntoIterator for Warnings {
    type Item = Warning;
    type IntoIter = std::vec::IntoIter<Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_preserve_order() {
        let mut first = Warnings::new();
        first.service("api", "one");
        let mut second = Warnings::new();
        second.global("two");
        second.service("web", "three");
        first.extend(second);

        let rendered: Vec<String> = first.iter().map(|w| w.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["service \"api\": one", "two", "service \"web\": three"]
        );
    }

    #[test]
    fn test_count_containing() {
        let mut warnings = Warnings::new();
        warnings.service("a", "use an ignore file");
        warnings.service("b", "something else");
        assert_eq!(warnings.count_containing("ignore file"), 1);
        assert_eq!(warnings.len(), 2);
        assert!(!warnings.is_empty());
    }
}
