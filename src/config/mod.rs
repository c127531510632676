pub mod args;
pub mod instance_tags;

use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

use crate::types::S3Credentials;

/// Application name attached to every forwarded audit record.
pub const AUDIT_APP_NAME: &str = "cleanupBucket";

/// Main configuration for a bucket cleanup run.
///
/// Built once by the configuration loader ([`Config::from_sources`]) and
/// read-only afterwards; the drain engine and the entry point only borrow it.
///
/// ```
/// use cleanup_bucket::Config;
///
/// let config = Config::for_bucket("my-bucket");
/// assert_eq!(config.batch_size, 100);
/// assert!(!config.delete_bucket);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub delete_bucket: bool,
    pub batch_size: u16,
    pub max_keys: i32,
    pub repair_mode: RepairMode,
    pub verify_after_drain: bool,
    pub rate_limit_objects: Option<u32>,
    pub logging_level: LoggingLevel,
    pub audit_config: AuditLogConfig,
    pub tracing_config: TracingConfig,
    pub target_client_config: Option<ClientConfig>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with the CLI defaults for the given bucket.
    pub fn for_bucket(bucket: &str) -> Self {
        Config {
            bucket: bucket.to_string(),
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bucket: String::new(),
            delete_bucket: false,
            batch_size: 100,
            max_keys: 1000,
            repair_mode: RepairMode::FailedOnly,
            verify_after_drain: true,
            rate_limit_objects: None,
            logging_level: LoggingLevel::Info,
            audit_config: AuditLogConfig::default(),
            tracing_config: TracingConfig::from_level(LoggingLevel::Info),
            target_client_config: None,
            auto_complete_shell: None,
        }
    }
}

/// Logging level names accepted from env vars, tags and flags.
///
/// Matching is case-insensitive. `CRITICAL` has no `tracing` counterpart
/// and collapses to `ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LoggingLevel {
    Debug,
    Info,
    #[value(alias = "WARN")]
    Warning,
    Error,
    Critical,
}

impl LoggingLevel {
    pub fn to_log_level(self) -> log::Level {
        match self {
            LoggingLevel::Debug => log::Level::Debug,
            LoggingLevel::Info => log::Level::Info,
            LoggingLevel::Warning => log::Level::Warn,
            LoggingLevel::Error | LoggingLevel::Critical => log::Level::Error,
        }
    }
}

impl FromStr for LoggingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s.trim(), true).map_err(|_| {
            format!("Invalid logging level '{s}' (expected DEBUG, INFO, WARNING, ERROR or CRITICAL).")
        })
    }
}

/// Which refs the sequential strategy revisits after the bulk pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairMode {
    /// Only refs the bulk pass reported as failed.
    FailedOnly,
    /// Every enumerated ref, whether or not the bulk pass succeeded.
    All,
    /// Skip the sequential pass.
    #[value(name = "none")]
    #[serde(rename = "none")]
    Disabled,
}

impl FromStr for RepairMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| format!("Invalid repair mode '{s}' (expected failed-only, all or none)."))
    }
}

/// Values treated as enabled for boolean settings such as `delete_bucket`.
pub const TRUTHY_VALUES: [&str; 5] = ["true", "1", "yes", "y", "on"];
/// Values treated as disabled for boolean settings.
pub const FALSY_VALUES: [&str; 6] = ["false", "0", "no", "n", "off", ""];

/// Parse a boolean setting against the truthy/falsy sets, ignoring case
/// and surrounding whitespace.
///
/// ```
/// use cleanup_bucket::config::parse_flag;
///
/// assert_eq!(parse_flag("True"), Ok(true));
/// assert_eq!(parse_flag("true"), Ok(true));
/// assert_eq!(parse_flag("off"), Ok(false));
/// assert!(parse_flag("maybe").is_err());
/// ```
pub fn parse_flag(value: &str) -> Result<bool, String> {
    let normalized = value.trim().to_ascii_lowercase();
    if TRUTHY_VALUES.contains(&normalized.as_str()) {
        Ok(true)
    } else if FALSY_VALUES.contains(&normalized.as_str()) {
        Ok(false)
    } else {
        Err(format!(
            "Invalid boolean value '{value}' (expected one of {} or {}).",
            TRUTHY_VALUES.join("/"),
            FALSY_VALUES[..5].join("/")
        ))
    }
}

/// Settings of the remote audit log sink.
///
/// Forwarding is enabled only when `es_host` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogConfig {
    pub es_host: Option<String>,
    pub es_index_name: String,
    pub environment: String,
}

impl AuditLogConfig {
    pub fn is_enabled(&self) -> bool {
        self.es_host.is_some()
    }
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        AuditLogConfig {
            es_host: None,
            es_index_name: "python_logger_cleanupbucket".to_string(),
            environment: "Dev".to_string(),
        }
    }
}

/// AWS S3 client configuration.
///
/// Credential loading, region, endpoint, retry and timeout settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

impl TracingConfig {
    pub fn from_level(level: LoggingLevel) -> Self {
        TracingConfig {
            tracing_level: level.to_log_level(),
            json_tracing: false,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
        }
    }
}
