//! Dealer statement projection.
//!
//! Rolls invoice events up into a per-dealer statement: total invoiced, total
//! paid, and the open balance still owed. Estimates never reach the
//! statement; only committed invoices move balances.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use dealerdesk_core::{AggregateId, Money};
use dealerdesk_events::EventEnvelope;
use dealerdesk_invoicing::{InvoiceEvent, InvoiceKind, InvoiceStatus};
use dealerdesk_parties::DealerId;

use crate::services::aggregate_types;

/// Read model: one dealer's position across all their invoices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealerStatement {
    pub dealer_id: DealerId,
    pub dealer_name: String,
    pub invoiced_total: Money,
    pub paid_total: Money,
    pub open_balance: Money,
    pub open_invoice_count: u32,
}

impl DealerStatement {
    fn new(dealer_id: DealerId, dealer_name: String) -> Self {
        Self {
            dealer_id,
            dealer_name,
            invoiced_total: Money::ZERO,
            paid_total: Money::ZERO,
            open_balance: Money::ZERO,
            open_invoice_count: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize invoice event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Invoice stream → dealer linkage, kept so later payment events can find
/// the statement to credit.
#[derive(Debug, Clone)]
struct InvoiceMeta {
    dealer_id: DealerId,
    is_estimate: bool,
    grand_total: Money,
}

/// Aggregates invoice events into per-dealer statements.
///
/// Rebuildable from the stream; re-delivered envelopes are skipped via the
/// per-stream cursor.
#[derive(Debug, Default)]
pub struct DealerStatementProjection {
    statements: RwLock<HashMap<DealerId, DealerStatement>>,
    invoices: RwLock<HashMap<AggregateId, InvoiceMeta>>,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl DealerStatementProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dealer_id: DealerId) -> Option<DealerStatement> {
        self.statements
            .read()
            .ok()
            .and_then(|s| s.get(&dealer_id).cloned())
    }

    /// Dealers that still owe something.
    pub fn list_with_open_balance(&self) -> Vec<DealerStatement> {
        match self.statements.read() {
            Ok(statements) => {
                let mut open: Vec<DealerStatement> = statements
                    .values()
                    .filter(|s| !s.open_balance.is_zero())
                    .cloned()
                    .collect();
                open.sort_by(|a, b| a.dealer_name.cmp(&b.dealer_name));
                open
            }
            Err(_) => Vec::new(),
        }
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors.get(&aggregate_id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn advance_cursor(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, sequence_number);
        }
    }

    /// Apply one committed envelope. Non-invoice streams and already-seen
    /// sequence numbers are no-ops; gaps are an error.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::INVOICE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursor(aggregate_id);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: InvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match ev {
            InvoiceEvent::InvoiceIssued(e) => {
                let is_estimate = e.kind == InvoiceKind::Estimate;
                if let Ok(mut invoices) = self.invoices.write() {
                    invoices.insert(
                        aggregate_id,
                        InvoiceMeta {
                            dealer_id: e.dealer.dealer_id,
                            is_estimate,
                            grand_total: e.totals.grand_total,
                        },
                    );
                }

                if !is_estimate {
                    self.with_statement(e.dealer.dealer_id, &e.dealer.name, |s| {
                        s.invoiced_total = add(s.invoiced_total, e.totals.grand_total);
                        s.open_balance = add(s.open_balance, e.totals.grand_total);
                        s.open_invoice_count += 1;
                    });
                }
            }
            InvoiceEvent::InvoiceLinesEdited(e) => {
                // Edits happen only while unpaid, so the whole delta is open.
                let meta = self
                    .invoices
                    .read()
                    .ok()
                    .and_then(|m| m.get(&aggregate_id).cloned());
                if let Some(meta) = meta {
                    if !meta.is_estimate {
                        let delta = sub(e.totals.grand_total, meta.grand_total);
                        self.with_existing_statement(meta.dealer_id, |s| {
                            s.invoiced_total = add(s.invoiced_total, delta);
                            s.open_balance = add(s.open_balance, delta);
                        });
                    }
                    if let Ok(mut invoices) = self.invoices.write() {
                        if let Some(m) = invoices.get_mut(&aggregate_id) {
                            m.grand_total = e.totals.grand_total;
                        }
                    }
                }
            }
            InvoiceEvent::PaymentApplied(e) => {
                let meta = self
                    .invoices
                    .read()
                    .ok()
                    .and_then(|m| m.get(&aggregate_id).cloned());
                if let Some(meta) = meta {
                    self.with_existing_statement(meta.dealer_id, |s| {
                        s.paid_total = add(s.paid_total, e.amount);
                        s.open_balance = sub(s.open_balance, e.amount);
                        if e.status == InvoiceStatus::FullyPaid {
                            s.open_invoice_count = s.open_invoice_count.saturating_sub(1);
                        }
                    });
                }
            }
        }

        self.advance_cursor(aggregate_id, seq);
        Ok(())
    }

    fn with_statement(
        &self,
        dealer_id: DealerId,
        dealer_name: &str,
        f: impl FnOnce(&mut DealerStatement),
    ) {
        if let Ok(mut statements) = self.statements.write() {
            let statement = statements
                .entry(dealer_id)
                .or_insert_with(|| DealerStatement::new(dealer_id, dealer_name.to_string()));
            f(statement);
        }
    }

    fn with_existing_statement(&self, dealer_id: DealerId, f: impl FnOnce(&mut DealerStatement)) {
        if let Ok(mut statements) = self.statements.write() {
            if let Some(statement) = statements.get_mut(&dealer_id) {
                f(statement);
            }
        }
    }
}

fn add(a: Money, b: Money) -> Money {
    Money::from_cents(a.cents().saturating_add(b.cents()))
}

fn sub(a: Money, b: Money) -> Money {
    Money::from_cents(a.cents().saturating_sub(b.cents()))
}
