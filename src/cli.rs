//! CLI arguments and subcommands for herakles-jvmtop.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Instance ordering in the overview
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortBy {
    /// Highest CPU load first
    Cpu,
    /// Smallest heap usage first
    Heap,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-jvmtop",
    about = "Top-like console monitor for managed runtime instances",
    long_about = "Top-like console monitor for managed runtime instances.\n\n\
                  Shows heap, non-heap, CPU and GC load, thread counts and deadlock \
                  markers of every visible instance, or a detail view with the busiest \
                  threads of a single instance.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-jvmtop | More info: https://www.herakles.now | Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Instance to show in detail mode
    #[arg(value_name = "PID", conflicts_with = "pid")]
    pub pid_arg: Option<u32>,

    /// Instance to show in detail mode
    #[arg(short = 'p', long)]
    pub pid: Option<u32>,

    /// Delay between each output iteration in seconds
    #[arg(short = 'd', long)]
    pub delay: Option<f64>,

    /// Exit after N output iterations
    #[arg(short = 'n', long, visible_alias = "iteration")]
    pub iterations: Option<i64>,

    /// Start the one-line stat view for the given instance
    #[arg(long)]
    pub stat: bool,

    /// Number of displayed threads in detail mode
    #[arg(long = "threadlimit")]
    pub thread_limit: Option<usize>,

    /// Display all threads in detail mode
    #[arg(long = "disable-threadlimit")]
    pub disable_thread_limit: bool,

    /// Displayed thread name length in detail mode
    #[arg(long = "threadnamewidth")]
    pub thread_name_width: Option<usize>,

    /// Scan for new instances every N iterations
    #[arg(long)]
    pub scan_interval: Option<u32>,

    /// Instance ordering in the overview
    #[arg(long, value_enum)]
    pub sort_by: Option<SortBy>,

    /// Scenario file (YAML/JSON) replayed as monitored instances
    #[arg(short = 's', long)]
    pub scenario: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Verbose mode (debug logging)
    #[arg(long)]
    pub verbose: bool,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

impl Args {
    /// PID given either positionally or with `--pid`.
    pub fn target_pid(&self) -> Option<u32> {
        self.pid.or(self.pid_arg)
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a synthetic scenario file
    GenerateScenario {
        /// Output file path
        #[arg(short = 'o', long, default_value = "scenario.yaml")]
        output: PathBuf,

        /// Number of instances to generate
        #[arg(long, default_value_t = 5)]
        instances: usize,

        /// Number of samples (cycles) per instance
        #[arg(long, default_value_t = 30)]
        samples: usize,

        /// Number of threads per instance
        #[arg(long, default_value_t = 12)]
        threads: usize,
    },

    /// Print host information shown in the top bar
    Sysinfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_pid() {
        let args = Args::parse_from(["herakles-jvmtop", "4711"]);
        assert_eq!(args.target_pid(), Some(4711));

        let args = Args::parse_from(["herakles-jvmtop", "--pid", "42", "--stat"]);
        assert_eq!(args.target_pid(), Some(42));
        assert!(args.stat);
    }

    #[test]
    fn test_legacy_flag_names() {
        let args = Args::parse_from([
            "herakles-jvmtop",
            "--threadlimit",
            "5",
            "--threadnamewidth",
            "20",
            "--disable-threadlimit",
            "-d",
            "0.5",
            "-n",
            "3",
        ]);
        assert_eq!(args.thread_limit, Some(5));
        assert_eq!(args.thread_name_width, Some(20));
        assert!(args.disable_thread_limit);
        assert_eq!(args.delay, Some(0.5));
        assert_eq!(args.iterations, Some(3));
    }

    #[test]
    fn test_subcommand() {
        let args = Args::parse_from(["herakles-jvmtop", "generate-scenario", "--instances", "2"]);
        assert!(matches!(
            args.command,
            Some(Commands::GenerateScenario { instances: 2, .. })
        ));
    }
}
