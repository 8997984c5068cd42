//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// SiteAuditor - multi-page visibility audit for one domain
///
/// Checks that every requested page is reachable, scores each page through
/// the configured scoring service and reports per-page and domain-level
/// results.
///
/// Examples:
///   siteauditor --domain https://example.com --paths /,/about,/pricing
///   siteauditor --domain https://example.com --paths /blog --validate-only
///   siteauditor --domain https://example.com --paths / --format json -o audit.json
///   siteauditor --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Domain origin to audit (e.g. https://example.com)
    #[arg(short, long, value_name = "URL", required_unless_present = "init_config")]
    pub domain: Option<String>,

    /// Page paths to audit, comma-separated (1 to 5)
    ///
    /// Example: --paths /,/about,/pricing
    #[arg(
        short,
        long,
        value_name = "PATHS",
        value_delimiter = ',',
        required_unless_present = "init_config"
    )]
    pub paths: Vec<String>,

    /// Access key required to start an analysis
    #[arg(long, env = "SITEAUDITOR_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// Shared secret the access key is checked against
    ///
    /// Overrides [access].shared_secret from the config file.
    #[arg(long, env = "SITEAUDITOR_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Scoring service base URL
    #[arg(long, value_name = "URL", env = "SITEAUDITOR_ANALYZER_URL")]
    pub analyzer_url: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .siteauditor.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Number of pages analyzed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Per-page analysis timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Only check that every page is reachable, then exit
    #[arg(long)]
    pub validate_only: bool,

    /// Generate a default .siteauditor.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The domain argument, empty if not set (validated first).
    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    ///
    /// Domain and path structure are checked by the run controller.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(concurrency) = self.concurrency {
            if concurrency == 0 {
                return Err("Concurrency must be at least 1".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref url) = self.analyzer_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Analyzer URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general].verbose` from the config file; the
    /// `--quiet` flag still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
