use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Create the feature group if needed and ingest the first rows of a CSV file
    Save {
        /// CSV file with a header row
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
    },
    /// Run the configured query against the offline store
    Load {
        /// Write the result as CSV to this file instead of stdout
        #[arg(short = 'o', long = "output", default_value = None)]
        output: Option<PathBuf>,
    },
    /// Show the feature group and its current status
    Describe,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliOptions {
    /// Switch to a different directory before resolving the config file.
    #[arg(short = 'c', long = "chdir", env = "FEATURE_GROUP_REPO_DIR", default_value = None)]
    pub chdir: Option<PathBuf>,
    /// The logging level. Case-insensitive.
    #[arg(
        value_enum,
        long = "log-level",
        ignore_case = true,
        default_value = "info"
    )]
    pub log_level: LogLevel,
    /// Path of the feature group config, relative to the working directory.
    #[arg(
        short = 'f',
        long = "config",
        env = "FEATURE_GROUP_CONFIG_PATH",
        default_value = "feature_group.yaml"
    )]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: CliCommand,
}
