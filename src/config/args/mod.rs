use crate::config::instance_tags::{
    InstanceTags, TAG_BUCKET_NAME, TAG_DELETE_BUCKET, TAG_ENVIRONMENT, TAG_ES_HOST,
    TAG_ES_INDEX_NAME, TAG_LOGGING_LEVEL,
};
use crate::config::{
    AuditLogConfig, CLITimeoutConfig, ClientConfig, Config, LoggingLevel, RepairMode, RetryConfig,
    TracingConfig, parse_flag,
};
use crate::types::{AccessKeys, S3Credentials};
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use serde::Deserialize;
use std::ffi::OsString;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_BATCH_SIZE: u16 = 100;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_REPAIR_MODE: &str = "failed-only";
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_DISABLE_INSTANCE_TAGS: bool = false;
const DEFAULT_SKIP_VERIFY: bool = false;

const MAX_BATCH_SIZE: u16 = 1000;
const MAX_KEYS_LIMIT: i32 = 1000;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_MISSING_BUCKET: &str = "Bucket name is required (--bucket-name, BUCKET_NAME env var or the bucketName instance tag).";
const ERROR_MESSAGE_BATCH_SIZE_ZERO: &str = "Batch size must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE: &str = "Batch size must be at most 1000 (S3 API limit).";
const ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE: &str = "Max keys must be between 1 and 1000.";
const ERROR_MESSAGE_RATE_LIMIT_TOO_SMALL: &str =
    "Rate limit (objects per second) must be at least the batch size.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// cleanup-bucket - Empty (and optionally delete) a versioned Amazon S3 bucket.
///
/// Every object version and delete marker is enumerated and removed with
/// batched DeleteObjects requests, followed by a sequential repair pass.
///
/// Example:
///   cleanup-bucket --bucket-name my-bucket
///   cleanup-bucket --bucket-name my-bucket --delete-bucket true
///   BUCKET_NAME=my-bucket DELETE_BUCKET=True LOGGING_LEVEL=DEBUG cleanup-bucket
#[derive(Parser, Clone, Debug)]
#[command(name = "cleanup-bucket", version, about, long_about = None)]
pub struct CLIArgs {
    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Name of the bucket to drain.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "General")]
    pub bucket_name: Option<String>,

    /// Delete the bucket once it is empty (true/1/yes/y/on, case-insensitive).
    #[arg(
        long,
        env,
        value_parser = parse_flag,
        action = clap::ArgAction::Set,
        help_heading = "General"
    )]
    pub delete_bucket: Option<bool>,

    /// Do not read configuration overrides from the instance's tags.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_INSTANCE_TAGS, help_heading = "General")]
    pub disable_instance_tags: bool,

    // -----------------------------------------------------------------------
    // Deletion options
    // -----------------------------------------------------------------------
    /// Number of refs per DeleteObjects request (1-1000). Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_BATCH_SIZE, help_heading = "Deletion")]
    pub batch_size: u16,

    /// Which refs the sequential DeleteObject pass revisits after the bulk pass.
    #[arg(long, env, value_enum, ignore_case = true, default_value = DEFAULT_REPAIR_MODE, help_heading = "Deletion")]
    pub repair_mode: RepairMode,

    /// Skip re-listing the bucket after the drain.
    #[arg(long, env, default_value_t = DEFAULT_SKIP_VERIFY, help_heading = "Deletion")]
    pub skip_verify: bool,

    /// Max keys per ListObjectVersions request. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, help_heading = "Deletion")]
    pub max_keys: i32,

    /// Maximum objects per second for rate limiting.
    #[arg(long, env, help_heading = "Deletion")]
    pub rate_limit_objects: Option<u32>,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Logging level: DEBUG, INFO, WARNING, ERROR or CRITICAL. Default: INFO.
    #[arg(long, env, value_enum, ignore_case = true, help_heading = "Logging")]
    pub logging_level: Option<LoggingLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Audit log options
    // -----------------------------------------------------------------------
    /// Hostname of the search service receiving audit log records.
    /// Forwarding is disabled when not set.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Audit")]
    pub es_host: Option<String>,

    /// Index receiving audit log records. Default: python_logger_cleanupbucket.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Audit")]
    pub es_index_name: Option<String>,

    /// Environment tag attached to audit log records. Default: Dev.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Audit")]
    pub environment: Option<String>,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS profile. If not set, the default credential chain is used.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_profile: Option<String>,

    /// AWS access key ID.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_secret_key: Option<String>,

    /// AWS session token.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_session_token: Option<String>,

    /// AWS region. If not set, the default region chain is used.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_region: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO).
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS")]
    pub target_force_path_style: bool,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// Invocation overrides (serverless event payload)
// ---------------------------------------------------------------------------

/// A boolean setting given either as a JSON boolean or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Text(String),
}

impl FlagValue {
    pub fn to_bool(&self) -> Result<bool, String> {
        match self {
            FlagValue::Bool(value) => Ok(*value),
            FlagValue::Text(text) => parse_flag(text),
        }
    }
}

/// Per-invocation settings carried by an event payload.
///
/// These take precedence over every other configuration source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, alias = "bucketName")]
    pub bucket_name: Option<String>,
    #[serde(default, alias = "deleteBucket")]
    pub delete_bucket: Option<FlagValue>,
    #[serde(default, alias = "batchSize")]
    pub batch_size: Option<u16>,
    #[serde(default, alias = "repairMode")]
    pub repair_mode: Option<RepairMode>,
}

// ---------------------------------------------------------------------------
// Lower-precedence sources: legacy environment variable names and tags
// ---------------------------------------------------------------------------

/// Environment variable names read after the flag's own upper-case variable,
/// in order, for each tag-backed setting.
const LEGACY_ENV_NAMES: [(&str, &[&str]); 6] = [
    (TAG_BUCKET_NAME, &["bucket_name", "bucketName"]),
    (TAG_DELETE_BUCKET, &["delete_bucket", "deleteBucket"]),
    (TAG_LOGGING_LEVEL, &["logging_level", "loggingLevel"]),
    (TAG_ES_HOST, &["es_host"]),
    (TAG_ES_INDEX_NAME, &["es_index_name"]),
    (TAG_ENVIRONMENT, &["environment"]),
];

/// Collect the legacy-named environment variables, keyed like instance tags.
pub fn legacy_env_settings<F>(lookup: F) -> InstanceTags
where
    F: Fn(&str) -> Option<String>,
{
    LEGACY_ENV_NAMES
        .iter()
        .filter_map(|(tag_key, names)| {
            names
                .iter()
                .find_map(|name| lookup(name))
                .map(|value| (*tag_key, value))
        })
        .collect()
}

/// Settings that apply when neither a flag nor its upper-case environment
/// variable is set: legacy environment variable names first, then tags.
struct FallbackSettings<'a> {
    env: InstanceTags,
    tags: &'a InstanceTags,
}

impl<'a> FallbackSettings<'a> {
    fn new(tags: &'a InstanceTags) -> Self {
        Self::with_env(legacy_env_settings(|name| std::env::var(name).ok()), tags)
    }

    fn with_env(env: InstanceTags, tags: &'a InstanceTags) -> Self {
        Self { env, tags }
    }

    /// The value and the name of the source it came from.
    fn get(&self, tag_key: &str) -> Option<(&str, &'static str)> {
        self.env
            .get(tag_key)
            .map(|value| (value, "env"))
            .or_else(|| self.tags.get(tag_key).map(|value| (value, "tag")))
    }

    fn value(&self, tag_key: &str) -> Option<String> {
        self.get(tag_key).map(|(value, _)| value.to_string())
    }
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// ```
/// use cleanup_bucket::config::args::parse_from_args;
///
/// let args = vec!["cleanup-bucket", "--bucket-name", "my-bucket"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert_eq!(cli_args.bucket_name.as_deref(), Some("my-bucket"));
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step, without instance tags.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_ZERO.to_string());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE.to_string());
        }
        if !(1..=MAX_KEYS_LIMIT).contains(&self.max_keys) {
            return Err(ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE.to_string());
        }
        Ok(())
    }

    pub fn build_client_config(&self) -> ClientConfig {
        let credential = if let Some(ref profile) = self.target_profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.target_access_key {
            let secret_key = self.target_secret_key.clone().unwrap_or_default();
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: secret_key,
                    session_token: self.target_session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        ClientConfig {
            credential,
            region: self.target_region.clone(),
            endpoint_url: self.target_endpoint_url.clone(),
            force_path_style: self.target_force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
        }
    }

    /// Logging level from the flag/env var, else legacy env names and the
    /// `loggingLevel` tag.
    pub fn logging_level(&self, tags: &InstanceTags) -> Result<LoggingLevel, String> {
        self.resolve_logging_level(&FallbackSettings::new(tags))
    }

    fn resolve_logging_level(&self, fallback: &FallbackSettings) -> Result<LoggingLevel, String> {
        match self.logging_level {
            Some(level) => Ok(level),
            None => match fallback.get(TAG_LOGGING_LEVEL) {
                Some((value, source)) => value
                    .parse()
                    .map_err(|e| format!("{TAG_LOGGING_LEVEL} ({source}): {e}")),
                None => Ok(LoggingLevel::Info),
            },
        }
    }

    pub fn tracing_config(&self, tags: &InstanceTags) -> Result<TracingConfig, String> {
        Ok(self.build_tracing_config(self.logging_level(tags)?))
    }

    /// Audit sink settings from flags/env vars, else legacy env names and
    /// tags, else defaults.
    pub fn audit_log_config(&self, tags: &InstanceTags) -> AuditLogConfig {
        self.resolve_audit_log_config(&FallbackSettings::new(tags))
    }

    fn resolve_audit_log_config(&self, fallback: &FallbackSettings) -> AuditLogConfig {
        let defaults = AuditLogConfig::default();
        AuditLogConfig {
            es_host: self
                .es_host
                .clone()
                .or_else(|| fallback.value(TAG_ES_HOST)),
            es_index_name: self
                .es_index_name
                .clone()
                .or_else(|| fallback.value(TAG_ES_INDEX_NAME))
                .unwrap_or(defaults.es_index_name),
            environment: self
                .environment
                .clone()
                .or_else(|| fallback.value(TAG_ENVIRONMENT))
                .unwrap_or(defaults.environment),
        }
    }

    fn build_tracing_config(&self, logging_level: LoggingLevel) -> TracingConfig {
        TracingConfig {
            tracing_level: logging_level.to_log_level(),
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        }
    }
}

impl Config {
    /// Resolve the configuration from every source.
    ///
    /// Precedence, lowest to highest: built-in defaults, instance tags,
    /// legacy-named environment variables (`bucket_name`/`bucketName`, ...),
    /// upper-case environment variables and flags (`args`), invocation
    /// `overrides`.
    pub fn from_sources(
        args: CLIArgs,
        tags: &InstanceTags,
        overrides: &ConfigOverrides,
    ) -> Result<Config, String> {
        Config::resolve(args, &FallbackSettings::new(tags), overrides)
    }

    fn resolve(
        args: CLIArgs,
        fallback: &FallbackSettings,
        overrides: &ConfigOverrides,
    ) -> Result<Config, String> {
        args.validate()?;

        let defaults = Config::default();

        let bucket = overrides
            .bucket_name
            .clone()
            .or_else(|| args.bucket_name.clone())
            .or_else(|| fallback.value(TAG_BUCKET_NAME))
            .filter(|bucket| !bucket.trim().is_empty());
        let bucket = match bucket {
            Some(bucket) => bucket,
            None if args.auto_complete_shell.is_some() => String::new(),
            None => return Err(ERROR_MESSAGE_MISSING_BUCKET.to_string()),
        };

        let delete_bucket = match (&overrides.delete_bucket, args.delete_bucket) {
            (Some(flag), _) => flag
                .to_bool()
                .map_err(|e| format!("delete_bucket (event): {e}"))?,
            (None, Some(flag)) => flag,
            (None, None) => match fallback.get(TAG_DELETE_BUCKET) {
                Some((value, source)) => parse_flag(value)
                    .map_err(|e| format!("{TAG_DELETE_BUCKET} ({source}): {e}"))?,
                None => defaults.delete_bucket,
            },
        };

        let logging_level = args.resolve_logging_level(fallback)?;
        let audit_config = args.resolve_audit_log_config(fallback);

        let batch_size = overrides.batch_size.unwrap_or(args.batch_size);
        if batch_size == 0 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_ZERO.to_string());
        }
        if batch_size > MAX_BATCH_SIZE {
            return Err(ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE.to_string());
        }
        if let Some(rate_limit) = args.rate_limit_objects {
            if rate_limit < u32::from(batch_size) {
                return Err(ERROR_MESSAGE_RATE_LIMIT_TOO_SMALL.to_string());
            }
        }

        Ok(Config {
            bucket,
            delete_bucket,
            batch_size,
            max_keys: args.max_keys,
            repair_mode: overrides.repair_mode.unwrap_or(args.repair_mode),
            verify_after_drain: !args.skip_verify,
            rate_limit_objects: args.rate_limit_objects,
            logging_level,
            audit_config,
            tracing_config: args.build_tracing_config(logging_level),
            target_client_config: Some(args.build_client_config()),
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        Config::from_sources(args, &InstanceTags::default(), &ConfigOverrides::default())
    }
}
