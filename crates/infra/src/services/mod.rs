//! Orchestration services.
//!
//! Services own the cross-aggregate flows: they load whatever aggregates a
//! use case touches, let each one decide its events, and commit everything
//! through one atomic batch append. Aggregates stay pure; coordination,
//! identifier allocation and audit emission live here.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use dealerdesk_core::DomainError;
use dealerdesk_events::{AuditRecord, AuditSink};
use dealerdesk_parties::{TaxSlab, TaxSlabId};
use dealerdesk_pricing::TaxRates;

use crate::command_dispatcher::DispatchError;
use crate::event_store::StoredEvent;

mod dealer_service;
mod inventory_service;
mod invoice_service;
mod order_service;
mod packing_service;
mod settlement_service;

pub use dealer_service::DealerService;
pub use inventory_service::InventoryService;
pub use invoice_service::InvoiceService;
pub use order_service::{OrderLineSpec, OrderService};
pub use packing_service::PackingService;
pub use settlement_service::SettlementService;

/// Aggregate type tags used as stream metadata.
pub mod aggregate_types {
    pub const DEALER: &str = "parties.dealer";
    pub const ORDER: &str = "sales.order";
    pub const PACKING_SLIP: &str = "fulfillment.packing_slip";
    pub const INVOICE: &str = "invoicing.invoice";
    pub const PAYMENT: &str = "settlement.payment";
    pub const CREDIT_MEMO: &str = "settlement.credit_memo";
    pub const STOCK_ROW: &str = "inventory.stock_row";
}

/// Service-level error: either the domain said no, or the pipeline failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Dispatch(DispatchError),
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        // Domain rejections keep their own shape so callers can match on them.
        match value {
            DispatchError::Domain(err) => ServiceError::Domain(err),
            other => ServiceError::Dispatch(other),
        }
    }
}

/// Shared reference data: tax slabs by id.
///
/// Slabs are plain entities, not event-sourced; documents snapshot their
/// rates by value, so this directory is only consulted at decision time.
#[derive(Debug, Default)]
pub struct TaxSlabDirectory {
    slabs: RwLock<HashMap<TaxSlabId, TaxSlab>>,
}

impl TaxSlabDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, slab: TaxSlab) {
        if let Ok(mut slabs) = self.slabs.write() {
            slabs.insert(*dealerdesk_core::Entity::id(&slab), slab);
        }
    }

    /// Rates for an active slab; retired slabs cannot back new documents.
    pub fn rates(&self, id: TaxSlabId) -> Result<TaxRates, DomainError> {
        let slabs = self
            .slabs
            .read()
            .map_err(|_| DomainError::conflict("tax slab directory lock poisoned"))?;
        let slab = slabs
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("tax slab {id}")))?;
        if !slab.is_active() {
            return Err(DomainError::invalid_transition(format!(
                "tax slab {id} is retired"
            )));
        }
        Ok(slab.rates())
    }

    pub fn retire(&self, id: TaxSlabId) -> Result<(), DomainError> {
        let mut slabs = self
            .slabs
            .write()
            .map_err(|_| DomainError::conflict("tax slab directory lock poisoned"))?;
        let slab = slabs
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("tax slab {id}")))?;
        slab.retire();
        Ok(())
    }
}

/// Emit one audit record per committed event.
pub(crate) fn audit_committed(audit: &dyn AuditSink, committed: &[StoredEvent]) {
    for stored in committed {
        audit.record(AuditRecord::new(
            stored.event_type.clone(),
            stored.aggregate_id.to_string(),
            format!("{} (seq {})", stored.event_type, stored.sequence_number),
            stored.occurred_at,
        ));
    }
}
