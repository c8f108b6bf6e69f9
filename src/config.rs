//! Configuration management for shipbox
//!
//! Settings are loaded from environment variables with sensible defaults. The
//! core never reads the environment itself; the CLI derives [`ArchiveLimits`]
//! and [`FixupOptions`] from a [`ShipboxConfig`] and passes them in.
//!
//! # Environment Variables
//!
//! - `SHIPBOX_BUILD_CONTEXT_LIMIT`: Hard compressed size of a build context
//!   (`100MiB`, `512KB`, `1GiB` or plain bytes) - default: "100MiB"
//! - `SHIPBOX_CONTEXT_SOFT_LIMIT`: Compressed size that triggers an advisory - default: "10MiB"
//! - `SHIPBOX_CONTEXT_FILE_LIMIT`: File count that triggers an advisory - default: "100"
//! - `SHIPBOX_CONCURRENCY`: Services fixed up at once - default: "4"
//! - `SHIPBOX_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use shipbox::ShipboxConfig;
//!
//! let config = ShipboxConfig::default();
//! config.validate().expect("Invalid configuration");
//! let limits = config.archive_limits();
//! ```

use crate::context::archive::{
    DEFAULT_FILE_LIMIT, DEFAULT_HARD_SIZE_LIMIT, DEFAULT_SOFT_SIZE_LIMIT,
};
use crate::context::{ArchiveLimits, UploadMode};
use crate::fixup::pipeline::DEFAULT_CONCURRENCY;
use crate::fixup::{FixupOptions, ProviderKind};
use std::env;
use std::fmt;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Parses a human-readable size such as `100MiB`, `512KB`, `1.5GiB` or `1024`.
///
/// Decimal suffixes (`KB`, `MB`, `GB`) are powers of 1000, binary ones
/// (`KiB`, `MiB`, `GiB`) powers of 1024. Suffixes are case-insensitive.
pub fn parse_size(value: &str) -> Result<u64, ConfigError> {
    let parse_error = |error: &str| ConfigError::ParseError {
        field: "size".to_string(),
        error: format!("{:?}: {}", value, error),
    };

    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(parse_error("missing number"));
    }

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "kib" => 1 << 10,
        "m" | "mb" => 1_000_000,
        "mib" => 1 << 20,
        "g" | "gb" => 1_000_000_000,
        "gib" => 1 << 30,
        other => return Err(parse_error(&format!("unknown unit {:?}", other))),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| parse_error("size overflows"));
    }
    let fractional: f64 = number.parse().map_err(|_| parse_error("invalid number"))?;
    let bytes = fractional * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(parse_error("size overflows"));
    }
    Ok(bytes as u64)
}

/// Runtime configuration for shipbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipboxConfig {
    /// Compressed build context size above which packaging fails
    pub build_context_limit: u64,

    /// Compressed size above which a single advisory is emitted
    pub context_soft_limit: u64,

    /// Regular-file count above which a single advisory is emitted
    pub context_file_limit: usize,

    /// Upper bound on services fixed up concurrently
    pub concurrency: usize,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ShipboxConfig {
    /// Loads from `SHIPBOX_*` environment variables; unparseable values fall
    /// back to the defaults.
    fn default() -> Self {
        let build_context_limit = env::var("SHIPBOX_BUILD_CONTEXT_LIMIT")
            .ok()
            .and_then(|v| parse_size(&v).ok())
            .unwrap_or(DEFAULT_HARD_SIZE_LIMIT);

        let context_soft_limit = env::var("SHIPBOX_CONTEXT_SOFT_LIMIT")
            .ok()
            .and_then(|v| parse_size(&v).ok())
            .unwrap_or(DEFAULT_SOFT_SIZE_LIMIT);

        let context_file_limit = env::var("SHIPBOX_CONTEXT_FILE_LIMIT")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_FILE_LIMIT);

        let concurrency = env::var("SHIPBOX_CONCURRENCY")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_CONCURRENCY);

        let log_level = env::var("SHIPBOX_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            build_context_limit,
            context_soft_limit,
            context_file_limit,
            concurrency,
            log_level,
        }
    }
}

impl ShipboxConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_context_limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "Build context limit must be positive".to_string(),
            ));
        }
        if self.context_soft_limit > self.build_context_limit {
            return Err(ConfigError::ValidationFailed(format!(
                "Soft context limit ({} bytes) cannot exceed the build context limit ({} bytes)",
                self.context_soft_limit, self.build_context_limit
            )));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn archive_limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_files: self.context_file_limit,
            soft_size: self.context_soft_limit,
            hard_size: self.build_context_limit,
        }
    }

    pub fn fixup_options(&self, upload_mode: UploadMode, provider: ProviderKind) -> FixupOptions {
        FixupOptions {
            upload_mode,
            provider,
            concurrency: self.concurrency,
            limits: self.archive_limits(),
        }
    }
}

impl fmt::Display for ShipboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shipbox Configuration:")?;
        writeln!(f, "  Build Context Limit: {} bytes", self.build_context_limit)?;
        writeln!(f, "  Context Soft Limit: {} bytes", self.context_soft_limit)?;
        writeln!(f, "  Context File Limit: {}", self.context_file_limit)?;
        writeln!(f, "  Concurrency: {}", self.concurrency)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use yare::parameterized;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[parameterized(
        bytes = { "1024", 1024 },
        bytes_suffix = { "512B", 512 },
        kilobytes = { "512KB", 512_000 },
        kibibytes = { "512KiB", 524_288 },
        mebibytes = { "100MiB", 104_857_600 },
        lowercase = { "100mib", 104_857_600 },
        gibibytes = { "1GiB", 1_073_741_824 },
        fractional = { "1.5MiB", 1_572_864 },
        spaced = { " 10 MB ", 10_000_000 },
    )]
    fn test_parse_size(input: &str, expected: u64) {
        assert_eq!(parse_size(input).unwrap(), expected);
    }

    #[parameterized(
        empty = { "" },
        unit_only = { "MiB" },
        unknown_unit = { "10parsecs" },
        overflow = { "99999999999999GiB" },
    )]
    fn test_parse_size_rejects(input: &str) {
        assert!(parse_size(input).is_err());
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::unset("SHIPBOX_BUILD_CONTEXT_LIMIT"),
            EnvGuard::unset("SHIPBOX_CONTEXT_SOFT_LIMIT"),
            EnvGuard::unset("SHIPBOX_CONTEXT_FILE_LIMIT"),
            EnvGuard::unset("SHIPBOX_CONCURRENCY"),
            EnvGuard::unset("SHIPBOX_LOG_LEVEL"),
        ];

        let config = ShipboxConfig::default();

        assert_eq!(config.build_context_limit, DEFAULT_HARD_SIZE_LIMIT);
        assert_eq!(config.context_soft_limit, DEFAULT_SOFT_SIZE_LIMIT);
        assert_eq!(config.context_file_limit, DEFAULT_FILE_LIMIT);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("SHIPBOX_BUILD_CONTEXT_LIMIT", "1GiB"),
            EnvGuard::set("SHIPBOX_CONTEXT_SOFT_LIMIT", "20MiB"),
            EnvGuard::set("SHIPBOX_CONTEXT_FILE_LIMIT", "500"),
            EnvGuard::set("SHIPBOX_CONCURRENCY", "8"),
            EnvGuard::set("SHIPBOX_LOG_LEVEL", "DEBUG"),
        ];

        let config = ShipboxConfig::default();

        assert_eq!(config.build_context_limit, 1 << 30);
        assert_eq!(config.context_soft_limit, 20 << 20);
        assert_eq!(config.context_file_limit, 500);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.log_level, "debug");

        let limits = config.archive_limits();
        assert_eq!(limits.hard_size, 1 << 30);
        assert_eq!(limits.max_files, 500);

        let options = config.fixup_options(UploadMode::Force, ProviderKind::Playground);
        assert_eq!(options.concurrency, 8);
        assert_eq!(options.upload_mode, UploadMode::Force);
    }

    #[test]
    #[serial]
    fn test_unparseable_limit_falls_back_to_default() {
        let _guard = EnvGuard::set("SHIPBOX_BUILD_CONTEXT_LIMIT", "lots");
        assert_eq!(
            ShipboxConfig::default().build_context_limit,
            DEFAULT_HARD_SIZE_LIMIT
        );
    }

    #[test]
    fn test_configuration_validation() {
        let valid = ShipboxConfig {
            build_context_limit: 100,
            context_soft_limit: 10,
            context_file_limit: 1,
            concurrency: 1,
            log_level: "info".to_string(),
        };
        assert!(valid.validate().is_ok());

        let mut config = valid.clone();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = valid.clone();
        config.context_soft_limit = 1000;
        assert!(config.validate().is_err());

        let mut config = valid;
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_display() {
        let config = ShipboxConfig {
            build_context_limit: 100,
            context_soft_limit: 10,
            context_file_limit: 1,
            concurrency: 2,
            log_level: "warn".to_string(),
        };
        let display = format!("{}", config);
        assert!(display.contains("Shipbox Configuration:"));
        assert!(display.contains("Concurrency: 2"));
    }
}
