use std::fmt;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level};

/// One log record as indexed by the search service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub level: String,
    pub logger: String,
    pub message: String,
    #[serde(rename = "App")]
    pub app: String,
    #[serde(rename = "Environment")]
    pub environment: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AuditRecord {
    pub(crate) fn from_event(event: &Event<'_>, app: &str, environment: &str) -> Self {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        AuditRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: level_name(event.metadata().level()).to_string(),
            logger: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            app: app.to_string(),
            environment: environment.to_string(),
            fields: visitor.fields,
        }
    }
}

/// Level names as the indexed log records spell them.
fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        _ => "DEBUG",
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(message) => message,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}

/// Index receiving records written on `date`: `<base>-YYYY.MM.DD`.
pub fn daily_index_name(base: &str, date: NaiveDate) -> String {
    format!("{base}-{}", date.format("%Y.%m.%d"))
}

/// Build an NDJSON `_bulk` body indexing `records` into the daily index
/// derived from `index_base` and `now`.
pub fn build_bulk_body(
    index_base: &str,
    records: &[AuditRecord],
    now: DateTime<Utc>,
) -> Result<String> {
    let action = serde_json::json!({
        "index": { "_index": daily_index_name(index_base, now.date_naive()) }
    })
    .to_string();

    let mut body = String::new();
    for record in records {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    Ok(body)
}
