pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, FixupArgs, PackageArgs, ValidateArgs};
pub use output::{OutputFormat, OutputFormatter};
