//! Tracing subscriber setup shared by the binaries.
//!
//! Events go to a compact (or JSON) stdout formatter. When an audit layer is
//! given it is stacked onto the same subscriber, so the forwarded records
//! pass the same level filter as the ones printed.

use std::env;
use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::audit::AuditLayer;
use crate::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

/// Install the global subscriber. Panics if one is already installed.
pub fn init_tracing(config: &TracingConfig, audit_layer: Option<AuditLayer>) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (event_filter, show_target) = event_filter(config);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .compact()
        .with_ansi(!config.disable_color_tracing && std::io::stdout().is_terminal())
        .with_span_events(fmt_span)
        .with_target(show_target);

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::new(event_filter))
        .with(audit_layer);

    if config.json_tracing {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }
}

/// Filter directives and whether targets are worth printing.
fn event_filter(config: &TracingConfig) -> (String, bool) {
    let tracing_level = config.tracing_level;
    if config.aws_sdk_tracing {
        (
            format!(
                "cleanup_bucket={tracing_level},cleanup_bucket_lambda={tracing_level},aws_smithy_runtime={tracing_level},aws_config={tracing_level},aws_sigv4={tracing_level}"
            ),
            true,
        )
    } else if let Ok(filter) = env::var(EVENT_FILTER_ENV_VAR) {
        (filter, true)
    } else {
        (
            format!("cleanup_bucket={tracing_level},cleanup_bucket_lambda={tracing_level}"),
            false,
        )
    }
}
