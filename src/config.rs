//! Configuration management for herakles-jvmtop.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, SortBy};
use herakles_jvmtop::SortOrder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_DELAY_SECS: f64 = 1.0;
pub const MIN_DELAY_SECS: f64 = 0.1;
pub const MAX_DELAY_SECS: f64 = 86_400.0;
pub const DEFAULT_THREAD_LIMIT: usize = 30;
pub const DEFAULT_THREAD_NAME_WIDTH: usize = 65;
pub const DEFAULT_SCAN_INTERVAL: u32 = 1;

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Pacing
    /// Delay between iterations in seconds
    #[serde(alias = "delay")]
    pub delay_secs: Option<f64>,
    /// Iterations before exit, -1 runs forever
    #[serde(alias = "iteration")]
    pub iterations: Option<i64>,

    // View selection
    pub pid: Option<u32>,
    #[serde(alias = "stat")]
    pub stat_view: Option<bool>,

    // Detail view
    #[serde(alias = "threadlimit")]
    pub thread_limit: Option<usize>,
    #[serde(alias = "threadlimit-enabled")]
    pub thread_limit_enabled: Option<bool>,
    #[serde(alias = "threadnamewidth")]
    pub thread_name_width: Option<usize>,

    // Overview
    #[serde(alias = "scan-interval")]
    pub scan_interval: Option<u32>,
    #[serde(alias = "sort-by")]
    pub sort_by: Option<SortOrder>,

    // Backend
    #[serde(alias = "scenario")]
    pub scenario_file: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay_secs: Some(DEFAULT_DELAY_SECS),
            iterations: Some(-1),
            pid: None,
            stat_view: Some(false),
            thread_limit: Some(DEFAULT_THREAD_LIMIT),
            thread_limit_enabled: Some(true),
            thread_name_width: Some(DEFAULT_THREAD_NAME_WIDTH),
            scan_interval: Some(DEFAULT_SCAN_INTERVAL),
            sort_by: Some(SortOrder::Cpu),
            scenario_file: None,
            log_level: Some("warn".into()),
        }
    }
}

impl Config {
    pub fn delay_secs(&self) -> f64 {
        self.delay_secs.unwrap_or(DEFAULT_DELAY_SECS)
    }

    pub fn iterations(&self) -> i64 {
        self.iterations.unwrap_or(-1)
    }

    /// Thread limit of the detail view, `None` when disabled.
    pub fn effective_thread_limit(&self) -> Option<usize> {
        if self.thread_limit_enabled.unwrap_or(true) {
            Some(self.thread_limit.unwrap_or(DEFAULT_THREAD_LIMIT))
        } else {
            None
        }
    }

    pub fn thread_name_width(&self) -> usize {
        self.thread_name_width.unwrap_or(DEFAULT_THREAD_NAME_WIDTH)
    }

    pub fn scan_interval(&self) -> u32 {
        self.scan_interval.unwrap_or(DEFAULT_SCAN_INTERVAL)
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_by.unwrap_or_default()
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let delay = cfg.delay_secs();
    if !delay.is_finite() || delay < MIN_DELAY_SECS {
        return Err(format!("Delay cannot be set below {MIN_DELAY_SECS}").into());
    }
    if delay > MAX_DELAY_SECS {
        return Err(format!("Delay cannot be set above {MAX_DELAY_SECS}").into());
    }

    let iterations = cfg.iterations();
    if iterations == 0 || iterations < -1 {
        return Err(format!(
            "Invalid iterations {iterations}, expected a positive count or -1"
        )
        .into());
    }

    if cfg.thread_limit_enabled.unwrap_or(true) && cfg.thread_limit == Some(0) {
        return Err("thread_limit must be at least 1 (or disable the limit)".into());
    }

    if cfg.thread_name_width == Some(0) {
        return Err("thread_name_width must be at least 1".into());
    }

    if cfg.scan_interval == Some(0) {
        return Err("scan_interval must be at least 1".into());
    }

    if cfg.stat_view.unwrap_or(false) && cfg.pid.is_none() {
        return Err("The stat view requires a pid".into());
    }

    if let Some(path) = &cfg.scenario_file {
        if !path.exists() {
            return Err(format!("Scenario file not found: {}", path.display()).into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level.to_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!("Invalid log_level '{}'", other).into());
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if let Some(delay) = args.delay {
        config.delay_secs = Some(delay);
    }
    if let Some(iterations) = args.iterations {
        config.iterations = Some(iterations);
    }

    if let Some(pid) = args.target_pid() {
        config.pid = Some(pid);
    }
    if args.stat {
        config.stat_view = Some(true);
    }

    if let Some(limit) = args.thread_limit {
        config.thread_limit = Some(limit);
    }
    if args.disable_thread_limit {
        config.thread_limit_enabled = Some(false);
    }
    if let Some(width) = args.thread_name_width {
        config.thread_name_width = Some(width);
    }

    if let Some(interval) = args.scan_interval {
        config.scan_interval = Some(interval);
    }
    if let Some(sort_by) = args.sort_by {
        config.sort_by = Some(match sort_by {
            SortBy::Cpu => SortOrder::Cpu,
            SortBy::Heap => SortOrder::Heap,
        });
    }

    // Scenario file: CLI wins if provided
    if let Some(scenario) = &args.scenario {
        config.scenario_file = Some(scenario.clone());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/jvmtop.yaml",
            "/etc/herakles/jvmtop.yml",
            "/etc/herakles/jvmtop.json",
            "./herakles-jvmtop.yaml",
            "./herakles-jvmtop.yml",
            "./herakles-jvmtop.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
