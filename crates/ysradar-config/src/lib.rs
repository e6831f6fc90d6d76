//! Configuration for the radar client.
//!
//! Settings persist to disk as `config.ron` in the platform config directory.
//! Command-line arguments override file values, and a changed file can be
//! picked up again with [`Config::reload`].

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE_NAME, Config, DebugConfig, KNOWN_VERSIONS, RadarConfig, ServerConfig,
    default_config_dir,
};
pub use error::ConfigError;
