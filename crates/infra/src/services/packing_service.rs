use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use dealerdesk_core::DomainError;
use dealerdesk_events::{AuditSink, EventBus, EventEnvelope};
use dealerdesk_fulfillment::{
    CompleteSlip, FinalizeSlip, NewPackingLine, OpenDraft, PackingSlip, PackingSlipCommand,
    PackingSlipId, ScanLine,
};
use dealerdesk_parties::{Dealer, DealerId};
use dealerdesk_sales::{Order, OrderId, OrderPhase};
use dealerdesk_sequence::{IdKind, Identifier, IdentifierAllocator};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::services::{ServiceError, aggregate_types, audit_committed};

/// Warehouse-side packing flow.
pub struct PackingService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    allocator: Arc<IdentifierAllocator>,
    audit: Arc<dyn AuditSink>,
}

impl<S, B> PackingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, allocator: Arc<IdentifierAllocator>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            allocator,
            audit,
        }
    }

    /// Open a packing draft for an approved order, snapshotting the dealer
    /// name, PO and lines as the packer will see them.
    pub fn open_draft(
        &self,
        slip_id: PackingSlipId,
        order_id: OrderId,
    ) -> Result<Identifier, ServiceError> {
        let (order, _) = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if order.phase() != OrderPhase::Approved || order.status().is_terminal() {
            return Err(ServiceError::Domain(DomainError::invalid_transition(
                format!("order {order_id} is not ready for packing"),
            )));
        }
        let dealer_id = order
            .dealer_id()
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
        let (dealer, _) = self
            .dispatcher
            .load(dealer_id.0, |id| Dealer::empty(DealerId::new(id)))?;

        let packing_id = self.allocator.allocate(IdKind::PackingId)?;
        let lines = order
            .lines()
            .iter()
            .map(|l| NewPackingLine {
                child_sku: l.child_sku,
                quantity: l.quantity,
                description: l.description.clone(),
            })
            .collect();

        let result = self.dispatcher.dispatch(
            slip_id.0,
            aggregate_types::PACKING_SLIP,
            PackingSlipCommand::OpenDraft(OpenDraft {
                slip_id,
                packing_id,
                order_id,
                dealer_name: dealer.name().to_string(),
                po_number: order.po_number().to_string(),
                lines,
                occurred_at: Utc::now(),
            }),
            |id| PackingSlip::empty(PackingSlipId::new(id)),
        );

        match result {
            Ok(committed) => {
                tracing::info!(slip = %slip_id, order = %order_id, %packing_id, "packing draft opened");
                audit_committed(self.audit.as_ref(), &committed);
                Ok(packing_id)
            }
            Err(err) => {
                // The PKG number goes back to the gap pool on failure.
                let _ = self.allocator.release(packing_id);
                Err(err.into())
            }
        }
    }

    pub fn finalize(&self, slip_id: PackingSlipId) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            slip_id.0,
            aggregate_types::PACKING_SLIP,
            PackingSlipCommand::FinalizeSlip(FinalizeSlip {
                slip_id,
                occurred_at: Utc::now(),
            }),
            |id| PackingSlip::empty(PackingSlipId::new(id)),
        )?;

        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Check a line off by SKU. Re-scans are no-ops and commit nothing.
    pub fn scan(&self, slip_id: PackingSlipId, sku: Identifier) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            slip_id.0,
            aggregate_types::PACKING_SLIP,
            PackingSlipCommand::ScanLine(ScanLine {
                slip_id,
                sku,
                occurred_at: Utc::now(),
            }),
            |id| PackingSlip::empty(PackingSlipId::new(id)),
        )?;

        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    pub fn complete(
        &self,
        slip_id: PackingSlipId,
        signature: &str,
        confirm_partial: bool,
    ) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            slip_id.0,
            aggregate_types::PACKING_SLIP,
            PackingSlipCommand::CompleteSlip(CompleteSlip {
                slip_id,
                signature: signature.to_string(),
                confirm_partial,
                occurred_at: Utc::now(),
            }),
            |id| PackingSlip::empty(PackingSlipId::new(id)),
        )?;

        tracing::info!(slip = %slip_id, "packing slip completed");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Load the current slip state (read-only).
    pub fn load_slip(&self, slip_id: PackingSlipId) -> Result<PackingSlip, ServiceError> {
        let (slip, _) = self
            .dispatcher
            .load(slip_id.0, |id| PackingSlip::empty(PackingSlipId::new(id)))?;
        Ok(slip)
    }
}
