//! Output formatting for multiple formats
//!
//! Reports are rendered as JSON, YAML or human-readable text. Machine formats
//! serialize the report structs as-is; the human format draws a short tree per
//! service.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::fixup::FixupOutput;
use crate::validation::ValidationErrors;
use crate::warnings::{Warning, Warnings};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Outcome of `shipbox package`
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub digest: String,
    pub file_count: usize,
    pub size: usize,
    pub dockerfile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_file: Option<String>,
    pub warnings: Warnings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationEntry {
    pub service: String,
    pub rule: String,
    pub message: String,
}

/// Outcome of `shipbox validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ViolationEntry>,
    pub warnings: Warnings,
}

impl ValidationReport {
    pub fn new(result: &std::result::Result<Warnings, ValidationErrors>) -> Self {
        match result {
            Ok(warnings) => Self {
                valid: true,
                errors: Vec::new(),
                warnings: warnings.clone(),
            },
            Err(errors) => Self {
                valid: false,
                errors: errors
                    .errors()
                    .iter()
                    .map(|e| ViolationEntry {
                        service: e.service.clone(),
                        rule: e.rule.to_string(),
                        message: e.message.clone(),
                    })
                    .collect(),
                warnings: Warnings::new(),
            },
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_package(&self, report: &PackageReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Yaml => to_yaml(report),
            OutputFormat::Human => Ok(self.format_package_human(report)),
        }
    }

    pub fn format_validation(&self, report: &ValidationReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Yaml => to_yaml(report),
            OutputFormat::Human => Ok(self.format_validation_human(report)),
        }
    }

    pub fn format_fixup(&self, output: &FixupOutput) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(output),
            OutputFormat::Yaml => to_yaml(output),
            OutputFormat::Human => Ok(self.format_fixup_human(output)),
        }
    }

    fn format_package_human(&self, report: &PackageReport) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", report.digest));
        output.push_str(&format!(
            "\u{251C}\u{2500} Files:       {}\n",
            report.file_count
        ));
        output.push_str(&format!("\u{251C}\u{2500} Size:        {} bytes\n", report.size));
        output.push_str(&format!(
            "\u{251C}\u{2500} Dockerfile:  {}\n",
            report.dockerfile
        ));
        output.push_str(&format!(
            "\u{2514}\u{2500} Ignore file: {}\n",
            report.ignore_file.as_deref().unwrap_or("(built-in defaults)")
        ));
        push_warnings(&mut output, report.warnings.iter());
        output
    }

    fn format_validation_human(&self, report: &ValidationReport) -> String {
        let mut output = String::new();
        if report.valid {
            output.push_str("\u{2713} Project is valid\n");
        } else {
            output.push_str(&format!(
                "\u{2717} Project has {} error(s)\n",
                report.errors.len()
            ));
        }
        output.push_str(RULE);
        output.push('\n');

        for (i, error) in report.errors.iter().enumerate() {
            let connector = if i + 1 == report.errors.len() {
                "\u{2514}"
            } else {
                "\u{251C}"
            };
            output.push_str(&format!(
                "{}\u{2500} {} [{}] {}\n",
                connector, error.service, error.rule, error.message
            ));
        }
        push_warnings(&mut output, report.warnings.iter());
        output
    }

    fn format_fixup_human(&self, fixup: &FixupOutput) -> String {
        let mut output = String::new();
        output.push_str(&format!("\u{2713} Project {}\n", fixup.project));
        output.push_str(RULE);
        output.push_str("\n\n");

        for fixed in &fixup.services {
            output.push_str(&format!("{}\n", fixed.service.name));
            match &fixed.build_context {
                Some(context) => {
                    output.push_str(&format!("\u{251C}\u{2500} Context:  {}\n", context.url));
                    if let Some(digest) = &context.digest {
                        output.push_str(&format!("\u{251C}\u{2500} Digest:   {}\n", digest));
                    }
                }
                None => output.push_str(&format!(
                    "\u{251C}\u{2500} Image:    {}\n",
                    fixed.service.image()
                )),
            }
            let ports: Vec<String> = fixed
                .service
                .ports
                .iter()
                .map(|p| format!("{}/{}", p.target, p.effective_mode()))
                .collect();
            output.push_str(&format!(
                "\u{2514}\u{2500} Ports:    {}\n\n",
                if ports.is_empty() {
                    "(none)".to_string()
                } else {
                    ports.join(", ")
                }
            ));
        }

        let rows = fixup.config_summary();
        if !rows.is_empty() {
            output.push_str("Environment:\n");
            let name_width = rows.iter().map(|r| r.service.len() + r.name.len() + 1).max().unwrap_or(0);
            for row in &rows {
                let key = format!("{}.{}", row.service, row.name);
                output.push_str(&format!(
                    "  {:<width$}  {:<24}  {}\n",
                    key,
                    row.source.to_string(),
                    row.value,
                    width = name_width
                ));
            }
        }

        push_warnings(&mut output, fixup.warnings.iter());
        output
    }
}

fn push_warnings<'a>(output: &mut String, warnings: impl Iterator<Item = &'a Warning>) {
    let warnings: Vec<&Warning> = warnings.collect();
    if warnings.is_empty() {
        return;
    }
    output.push_str("\nWarnings:\n");
    for warning in warnings {
        output.push_str(&format!("  \u{26A0} {}\n", warning));
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report to JSON")
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).context("Failed to serialize report to YAML")
}
