use crate::types::RetryDurationUs;
use clap::Parser;
use std::path::PathBuf;

/// Options shared by every binary built on the engine, merged with a
/// config file by [`EngineConfig::load_merge_with_opts`](crate::config::EngineConfig::load_merge_with_opts).
#[derive(Parser, Debug, Clone, Default)]
pub struct EngineOpts {
    /// Use the provided configuration file instead of the default or
    /// the environment variable value
    #[clap(
        long = "config",
        name = "config file",
        help_heading = "CONFIGURATION"
    )]
    pub config_file: Option<PathBuf>,

    /// When the graph needs to retry running later, retry in
    /// retry-duration-us microseconds
    #[clap(long, name = "retry-duration-us", help_heading = "CONFIGURATION")]
    pub retry_duration_us: Option<RetryDurationUs>,
}
