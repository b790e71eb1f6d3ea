//! tspdbg-config: configuration loading, log files and user paths.

pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod merge;
pub mod paths;
pub mod validate;

pub use config::{Config, DebuggerConfig, LogConfig, LogLevel};
pub use error::ConfigError;
pub use load::{load_config, load_file};
