use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use dealerdesk_events::{AuditSink, EventBus, EventEnvelope};
use dealerdesk_inventory::{
    ReceiveStock, RecordDamage, ReleaseBooking, StockKey, StockRow, StockRowCommand, StockRowId,
    StockStatus, StockThresholds,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::services::{ServiceError, aggregate_types, audit_committed};

/// Warehouse stock intake and adjustments.
///
/// Order-driven movements (booking, release on rejection, fulfillment) run
/// inside `OrderService` batches; this service covers the movements that
/// happen without an order: receipts, damage write-downs and manual releases.
pub struct InventoryService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    audit: Arc<dyn AuditSink>,
}

impl<S, B> InventoryService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            audit,
        }
    }

    /// Receive stock into a row. The first receipt opens the row under `key`;
    /// later receipts must carry the same key.
    pub fn receive_stock(
        &self,
        row_id: StockRowId,
        key: StockKey,
        quantity: i64,
    ) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            row_id.0,
            aggregate_types::STOCK_ROW,
            StockRowCommand::ReceiveStock(ReceiveStock {
                row_id,
                key,
                quantity,
                occurred_at: Utc::now(),
            }),
            |id| StockRow::empty(StockRowId::new(id)),
        )?;

        tracing::info!(row = %row_id, quantity, "stock received");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Write damaged units out of unbooked stock.
    pub fn record_damage(
        &self,
        row_id: StockRowId,
        quantity: i64,
        comment: &str,
    ) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            row_id.0,
            aggregate_types::STOCK_ROW,
            StockRowCommand::RecordDamage(RecordDamage {
                row_id,
                quantity,
                comment: comment.to_string(),
                occurred_at: Utc::now(),
            }),
            |id| StockRow::empty(StockRowId::new(id)),
        )?;

        tracing::warn!(row = %row_id, quantity, comment, "damage recorded");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Manually hand a booking back, e.g. after an order's lines shrink.
    pub fn release_booking(&self, row_id: StockRowId, quantity: i64) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            row_id.0,
            aggregate_types::STOCK_ROW,
            StockRowCommand::ReleaseBooking(ReleaseBooking {
                row_id,
                quantity,
                occurred_at: Utc::now(),
            }),
            |id| StockRow::empty(StockRowId::new(id)),
        )?;

        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Load the current row state (read-only).
    pub fn load_row(&self, row_id: StockRowId) -> Result<StockRow, ServiceError> {
        let (row, _) = self
            .dispatcher
            .load(row_id.0, |id| StockRow::empty(StockRowId::new(id)))?;
        Ok(row)
    }

    /// Derived availability band for a row under the given thresholds.
    pub fn stock_status(
        &self,
        row_id: StockRowId,
        thresholds: StockThresholds,
    ) -> Result<StockStatus, ServiceError> {
        let row = self.load_row(row_id)?;
        Ok(row.status(thresholds))
    }
}
