//! Audit log sink.
//!
//! [`AuditLayer`] is a `tracing_subscriber` layer that turns the crate's own
//! log events into [`AuditRecord`]s tagged with the application name and the
//! configured environment. Records are queued on a channel and a background
//! task ships them to the search service's `_bulk` API over HTTPS, signing
//! each request with SigV4 (service `es`). Shipping failures are logged
//! locally and never reach the cleanup run.

mod record;
mod shipper;

pub use record::{AuditRecord, build_bulk_body, daily_index_name};
pub use shipper::{AuditShipper, RequestSigner, bulk_endpoint};

use std::time::Duration;

use anyhow::Result;
use async_channel::{Receiver, Sender};
use aws_config::SdkConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Event, Subscriber, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::config::{AUDIT_APP_NAME, AuditLogConfig};

/// Queue capacity between the layer and the shipper. Records arriving while
/// the queue is full are dropped.
const AUDIT_QUEUE_SIZE: usize = 10_000;
/// Upper bound of records per `_bulk` request.
pub const MAX_RECORDS_PER_REQUEST: usize = 500;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

const FORWARDED_TARGET_PREFIX: &str = "cleanup_bucket";
const AUDIT_TARGET_PREFIX: &str = "cleanup_bucket::audit";

pub(crate) enum AuditMessage {
    Record(AuditRecord),
    Flush(oneshot::Sender<()>),
}

/// Whether events of `target` are forwarded.
///
/// Only this crate's own events are shipped. The sink's own events are
/// excluded so a shipping failure cannot feed itself.
pub fn is_forwarded_target(target: &str) -> bool {
    target.starts_with(FORWARDED_TARGET_PREFIX) && !target.starts_with(AUDIT_TARGET_PREFIX)
}

/// Layer capturing forwarded events into the audit queue.
pub struct AuditLayer {
    sender: Sender<AuditMessage>,
    app: String,
    environment: String,
}

impl<S: Subscriber> Layer<S> for AuditLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !is_forwarded_target(event.metadata().target()) {
            return;
        }
        let record = AuditRecord::from_event(event, &self.app, &self.environment);
        let _ = self.sender.try_send(AuditMessage::Record(record));
    }
}

/// Control handle of the background shipper.
pub struct AuditHandle {
    sender: Sender<AuditMessage>,
    task: JoinHandle<()>,
}

impl AuditHandle {
    /// Wait until every record queued so far has been shipped.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(AuditMessage::Flush(tx)).await.is_err() {
            return;
        }
        if tokio::time::timeout(FLUSH_TIMEOUT, rx).await.is_err() {
            warn!("audit log flush timed out.");
        }
    }

    /// Ship what is queued and stop the shipper.
    pub async fn shutdown(self) {
        self.flush().await;
        self.sender.close();
        if tokio::time::timeout(FLUSH_TIMEOUT, self.task).await.is_err() {
            warn!("audit log shipper did not stop in time.");
        }
    }
}

/// Build the layer and start its shipper.
///
/// Must be called inside a Tokio runtime. The caller stacks the layer onto
/// its subscriber and keeps the handle to flush on exit.
pub fn start_audit_sink(
    config: &AuditLogConfig,
    sdk_config: &SdkConfig,
) -> Result<Option<(AuditLayer, AuditHandle)>> {
    let Some(es_host) = config.es_host.as_deref() else {
        return Ok(None);
    };

    let shipper = AuditShipper::new(
        bulk_endpoint(es_host),
        config.es_index_name.clone(),
        RequestSigner::from_sdk_config(sdk_config),
    )?;
    let (layer, handle) = spawn_sink(shipper, &config.environment);
    Ok(Some((layer, handle)))
}

pub(crate) fn spawn_sink(shipper: AuditShipper, environment: &str) -> (AuditLayer, AuditHandle) {
    let (sender, receiver) = async_channel::bounded(AUDIT_QUEUE_SIZE);
    let task = tokio::spawn(run_shipper(shipper, receiver));

    (
        AuditLayer {
            sender: sender.clone(),
            app: AUDIT_APP_NAME.to_string(),
            environment: environment.to_string(),
        },
        AuditHandle { sender, task },
    )
}

/// Reported on the first shipment rather than at start-up, because the sink
/// is created before the subscriber that would print it.
async fn run_shipper(shipper: AuditShipper, receiver: Receiver<AuditMessage>) {
    let mut unsigned_warning_pending = !shipper.is_signed();
    while let Ok(message) = receiver.recv().await {
        let mut records = Vec::new();
        let mut flush_waiters = Vec::new();
        let mut next = Some(message);

        while let Some(message) = next.take() {
            match message {
                AuditMessage::Record(record) => records.push(record),
                AuditMessage::Flush(waiter) => flush_waiters.push(waiter),
            }
            if records.len() >= MAX_RECORDS_PER_REQUEST {
                break;
            }
            next = receiver.try_recv().ok();
        }

        if !records.is_empty() {
            if unsigned_warning_pending {
                warn!(
                    endpoint = shipper.endpoint(),
                    "no AWS credentials or region resolved; audit log requests are sent unsigned."
                );
                unsigned_warning_pending = false;
            }
            if let Err(e) = shipper.ship(&records).await {
                warn!(
                    records = records.len(),
                    error = format!("{e:#}"),
                    "failed to ship audit log records."
                );
            }
        }
        for waiter in flush_waiters {
            let _ = waiter.send(());
        }
    }
}
