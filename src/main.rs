use shipbox::cli::commands::{CliArgs, Commands};
use shipbox::cli::handlers::{handle_fixup, handle_package, handle_validate};
use shipbox::util::logging::{init_logging, parse_level, LoggingConfig};
use shipbox::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("shipbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Package(package_args) => handle_package(package_args, args.quiet).await,
        Commands::Validate(validate_args) => handle_validate(validate_args).await,
        Commands::Fixup(fixup_args) => handle_fixup(fixup_args).await,
    };

    std::process::exit(exit_code);
}

/// Command-line flags take precedence over `SHIPBOX_LOG_LEVEL`
fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}
