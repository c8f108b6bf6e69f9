//! Process-level helpers shared by the binary and tests

pub mod logging;

pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
