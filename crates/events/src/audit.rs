//! Fire-and-forget audit trail.
//!
//! Every state transition in the back office emits a structured audit record
//! to an external log collaborator. Auditing is non-blocking and non-fatal:
//! a sink must never return an error to the caller or panic, because a failed
//! audit write must not reject a valid business operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit entry: which operation touched which entity, and what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Operation name, e.g. "sales.order.approved".
    pub operation: String,
    /// Identifier of the touched entity (aggregate id or business id).
    pub entity_id: String,
    /// Human-readable summary for the audit screen.
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        operation: impl Into<String>,
        entity_id: impl Into<String>,
        message: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity_id: entity_id.into(),
            message: message.into(),
            occurred_at,
        }
    }
}

/// Audit log collaborator seam.
pub trait AuditSink: Send + Sync {
    /// Record an entry. Must not fail the caller.
    fn record(&self, record: AuditRecord);
}

/// Default sink: forwards records to `tracing` as structured info events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            operation = %record.operation,
            entity_id = %record.entity_id,
            occurred_at = %record.occurred_at,
            "{}",
            record.message
        );
    }
}

/// Sink that drops everything (tests, tools that bring their own logging).
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collecting sink used to assert on emitted records.
    #[derive(Default)]
    struct CollectingSink {
        records: std::sync::Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for CollectingSink {
        fn record(&self, record: AuditRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    #[test]
    fn records_carry_operation_entity_and_message() {
        let sink = CollectingSink::default();
        sink.record(AuditRecord::new(
            "sales.order.approved",
            "ORD-1",
            "order approved",
            Utc::now(),
        ));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "sales.order.approved");
        assert_eq!(records[0].entity_id, "ORD-1");
    }
}
