use std::sync::Arc;

use anyhow::{Result, anyhow};
use aws_config::SdkConfig;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, info, trace, warn};

use cleanup_bucket::audit::{AuditHandle, start_audit_sink};
use cleanup_bucket::config::instance_tags::{ImdsTagSource, InstanceTagSource, InstanceTags};
use cleanup_bucket::tracing_init::init_tracing;
use cleanup_bucket::types::error::CleanupError;
use cleanup_bucket::{
    BucketCleanup, CLIArgs, CleanupReport, Config, ConfigOverrides, create_storage,
    exit_code_from_error,
};

const EXIT_CODE_WARNING: i32 = 3;

/// cleanup-bucket - Empty (and optionally delete) a versioned Amazon S3 bucket.
///
/// This binary is a thin wrapper over the cleanup_bucket library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let args = CLIArgs::parse();

    if let Some(shell) = args.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "cleanup-bucket",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    let (tags, tag_error) = load_instance_tags(&args).await;
    let config = load_config_exit_if_err(args, &tags);

    let Some(client_config) = config.target_client_config.clone() else {
        return Err(anyhow!("AWS client configuration is missing."));
    };
    let sdk_config = client_config.load_sdk_config().await;

    let (audit_layer, audit_handle, audit_error) =
        match start_audit_sink(&config.audit_config, &sdk_config) {
            Ok(Some((layer, handle))) => (Some(layer), Some(handle), None),
            Ok(None) => (None, None, None),
            Err(e) => (None, None, Some(e)),
        };

    init_tracing(&config.tracing_config, audit_layer);

    if let Some(e) = tag_error {
        warn!(error = %e, "instance tags could not be read; continuing without them.");
    }
    if let Some(e) = audit_error {
        warn!(error = format!("{e:#}"), "audit log forwarding is disabled.");
    }

    trace!("config = {:?}", config);

    let result = run(config, &sdk_config).await;

    shutdown_audit_sink(audit_handle).await;

    match result {
        Ok(report) if report.has_residuals() => std::process::exit(EXIT_CODE_WARNING),
        Ok(_) => Ok(()),
        Err(e) => {
            error!(error = format!("{e:#}"), "cleanup-bucket failed.");
            std::process::exit(exit_code_from_error(&e));
        }
    }
}

/// Read the instance's tags unless disabled. A failed lookup is returned
/// for logging once tracing is up.
async fn load_instance_tags(args: &CLIArgs) -> (InstanceTags, Option<CleanupError>) {
    if args.disable_instance_tags {
        return (InstanceTags::default(), None);
    }

    match ImdsTagSource::new().fetch_tags().await {
        Ok(tags) => (tags, None),
        Err(e) => (InstanceTags::default(), Some(e)),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err(args: CLIArgs, tags: &InstanceTags) -> Config {
    match Config::from_sources(args, tags, &ConfigOverrides::default()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

async fn run(config: Config, sdk_config: &SdkConfig) -> Result<CleanupReport> {
    let client = match config.target_client_config.as_ref() {
        Some(client_config) => Arc::new(client_config.create_client_from_sdk_config(sdk_config)),
        None => Arc::new(aws_sdk_s3::Client::new(sdk_config)),
    };
    let storage = create_storage(&config, client);

    let start_time = tokio::time::Instant::now();
    debug!("cleanup start.");

    let report = BucketCleanup::new(config, storage).run().await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    info!(
        duration_sec = duration_sec,
        report = serde_json::to_string(&report).unwrap_or_default(),
        "cleanup-bucket has been completed."
    );

    Ok(report)
}

async fn shutdown_audit_sink(audit_handle: Option<AuditHandle>) {
    if let Some(handle) = audit_handle {
        handle.shutdown().await;
    }
}
