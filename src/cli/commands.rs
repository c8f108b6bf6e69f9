use crate::context::UploadMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Validates compose-style projects and packages their build contexts
#[derive(Parser, Debug)]
#[command(
    name = "shipbox",
    about = "Validate compose-style projects and package their build contexts",
    version,
    author,
    long_about = "shipbox checks a multi-service project for directives the deployment \
                  target cannot honour, packages every build context into a reproducible, \
                  content-addressed archive and rewrites cross-service references to \
                  private DNS names."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Package one build context into an archive",
        long_about = "Builds the reproducible gzip'd tar archive for a build context, \
                      honouring .dockerignore rules, and prints its digest.\n\n\
                      Examples:\n  \
                      shipbox package .\n  \
                      shipbox package ./api --dockerfile docker/api.Dockerfile\n  \
                      shipbox package . --output context.tar.gz"
    )]
    Package(PackageArgs),

    #[command(
        about = "Validate a project",
        long_about = "Reports every structural problem in a project file at once.\n\n\
                      Examples:\n  \
                      shipbox validate project.yaml"
    )]
    Validate(ValidateArgs),

    #[command(
        about = "Validate, package and fix up every service of a project",
        long_about = "Runs validation, then packages each build context, classifies \
                      environment variables and rewrites service references.\n\n\
                      Examples:\n  \
                      shipbox fixup project.yaml\n  \
                      shipbox fixup project.json --upload-mode preview --store /tmp/contexts\n  \
                      shipbox fixup project.yaml --config DB_PASSWORD --format json"
    )]
    Fixup(FixupArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct PackageArgs {
    #[arg(
        value_name = "CONTEXT",
        default_value = ".",
        help = "Build context directory"
    )]
    pub context: PathBuf,

    #[arg(
        short = 'd',
        long,
        value_name = "FILE",
        default_value = "Dockerfile",
        help = "Dockerfile path relative to the context"
    )]
    pub dockerfile: String,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write the archive to a file"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(value_name = "PROJECT", help = "Project file (.json, .yaml or .yml)")]
    pub project: PathBuf,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct FixupArgs {
    #[arg(value_name = "PROJECT", help = "Project file (.json, .yaml or .yml)")]
    pub project: PathBuf,

    #[arg(
        short = 'm',
        long,
        value_enum,
        default_value = "digest",
        help = "How build contexts are packaged and uploaded"
    )]
    pub upload_mode: UploadModeArg,

    #[arg(
        short = 's',
        long,
        value_name = "DIR",
        help = "Directory archives are stored in (defaults to .shipbox next to the project)"
    )]
    pub store: Option<PathBuf>,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "NAME",
        help = "Name registered in the config store (repeatable)"
    )]
    pub configs: Vec<String>,

    #[arg(long, help = "Target the shared playground backend")]
    pub playground: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadModeArg {
    Digest,
    Force,
    Ignore,
    Preview,
    Estimate,
}

impl From<UploadModeArg> for UploadMode {
    fn from(arg: UploadModeArg) -> Self {
        match arg {
            UploadModeArg::Digest => UploadMode::Digest,
            UploadModeArg::Force => UploadMode::Force,
            UploadModeArg::Ignore => UploadMode::Ignore,
            UploadModeArg::Preview => UploadMode::Preview,
            UploadModeArg::Estimate => UploadMode::Estimate,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
