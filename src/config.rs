//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.siteauditor.toml` files.

use crate::audit::SchedulerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".siteauditor.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Scoring service settings.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Reachability probe settings.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Access gate settings.
    #[serde(default)]
    pub access: AccessConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of concurrent page analyses.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "site_audit_report.md".to_string()
}

fn default_concurrency() -> usize {
    2
}

/// Scoring service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Base URL of the scoring service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-page analysis timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// How long an analysis may take to stop after cancellation.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout(),
            cancel_grace_ms: default_cancel_grace(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8787".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_cancel_grace() -> u64 {
    2000
}

/// Reachability probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,

    /// User-Agent header sent with probes.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_probe_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("siteauditor/{}", env!("CARGO_PKG_VERSION"))
}

/// Access gate settings.
///
/// A single shared secret; this is a coarse gate, not authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.siteauditor.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(timeout) = args.timeout {
            self.analyzer.timeout_seconds = timeout;
        }

        if let Some(ref endpoint) = args.analyzer_url {
            self.analyzer.endpoint = endpoint.clone();
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(ref secret) = args.access_key {
            self.access.shared_secret = Some(secret.clone());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.general.concurrency.max(1),
            page_timeout: Duration::from_secs(self.analyzer.timeout_seconds),
            cancel_grace: Duration::from_millis(self.analyzer.cancel_grace_ms),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
