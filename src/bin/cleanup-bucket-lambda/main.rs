use std::sync::Arc;

use aws_config::SdkConfig;
use clap::Parser;
use lambda_runtime::{Error, LambdaEvent, service_fn};
use tracing::{error, info, warn};

use cleanup_bucket::audit::{AuditHandle, start_audit_sink};
use cleanup_bucket::config::instance_tags::InstanceTags;
use cleanup_bucket::tracing_init::init_tracing;
use cleanup_bucket::{
    BucketCleanup, CLIArgs, CleanupError, CleanupReport, Config, ConfigOverrides, create_storage,
};

/// State shared by every invocation of one execution environment.
struct Runtime {
    args: CLIArgs,
    sdk_config: SdkConfig,
    audit_handle: Option<AuditHandle>,
}

/// cleanup-bucket-lambda - serverless entry point.
///
/// Settings come from the function's environment variables; fields of the
/// JSON event override them per invocation.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<(), Error> {
    // environment variables only
    let args = CLIArgs::try_parse_from(["cleanup-bucket-lambda"])?;
    let tags = InstanceTags::default();

    let tracing_config = args.tracing_config(&tags)?;
    let sdk_config = args.build_client_config().load_sdk_config().await;

    let (audit_layer, audit_handle, audit_error) =
        match start_audit_sink(&args.audit_log_config(&tags), &sdk_config) {
            Ok(Some((layer, handle))) => (Some(layer), Some(handle), None),
            Ok(None) => (None, None, None),
            Err(e) => (None, None, Some(e)),
        };
    init_tracing(&tracing_config, audit_layer);
    if let Some(e) = audit_error {
        warn!(error = format!("{e:#}"), "audit log forwarding is disabled.");
    }

    let runtime = Runtime {
        args,
        sdk_config,
        audit_handle,
    };
    let shared_runtime = &runtime;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<ConfigOverrides>| async move {
        handle_invocation(shared_runtime, event).await
    }))
    .await
}

async fn handle_invocation(
    runtime: &Runtime,
    event: LambdaEvent<ConfigOverrides>,
) -> Result<CleanupReport, Error> {
    info!(request_id = event.context.request_id, "invocation started.");

    let result = invoke(runtime, &event.payload).await;
    if let Err(e) = &result {
        error!(error = format!("{e:#}"), "cleanup-bucket failed.");
    }

    if let Some(handle) = &runtime.audit_handle {
        handle.flush().await;
    }

    result.map_err(Error::from)
}

async fn invoke(runtime: &Runtime, overrides: &ConfigOverrides) -> anyhow::Result<CleanupReport> {
    let config = Config::from_sources(runtime.args.clone(), &InstanceTags::default(), overrides)
        .map_err(CleanupError::InvalidConfig)?;

    let client = match config.target_client_config.as_ref() {
        Some(client_config) => client_config.create_client_from_sdk_config(&runtime.sdk_config),
        None => aws_sdk_s3::Client::new(&runtime.sdk_config),
    };
    let storage = create_storage(&config, Arc::new(client));

    BucketCleanup::new(config, storage).run().await
}
