use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use dealerdesk_core::{DomainError, Rate};
use dealerdesk_events::{AuditSink, EventBus, EventEnvelope};
use dealerdesk_parties::{
    Dealer, DealerCommand, DealerId, DeleteDealer, RegisterDealer, TaxSlabId,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::services::{ServiceError, TaxSlabDirectory, aggregate_types, audit_committed};

/// Dealer onboarding and removal.
pub struct DealerService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    slabs: Arc<TaxSlabDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl<S, B> DealerService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, slabs: Arc<TaxSlabDirectory>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            slabs,
            audit,
        }
    }

    pub fn register_dealer(
        &self,
        dealer_id: DealerId,
        name: &str,
        address: &str,
        discount: Rate,
        tax_slab: TaxSlabId,
    ) -> Result<(), ServiceError> {
        // The slab must exist and be active before a dealer can point at it.
        self.slabs.rates(tax_slab)?;

        let committed = self.dispatcher.dispatch(
            dealer_id.0,
            aggregate_types::DEALER,
            DealerCommand::RegisterDealer(RegisterDealer {
                dealer_id,
                name: name.to_string(),
                address: address.to_string(),
                discount,
                tax_slab,
                occurred_at: Utc::now(),
            }),
            |id| Dealer::empty(DealerId::new(id)),
        )?;

        tracing::info!(dealer = %dealer_id, %name, "dealer registered");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    pub fn delete_dealer(&self, dealer_id: DealerId) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            dealer_id.0,
            aggregate_types::DEALER,
            DealerCommand::DeleteDealer(DeleteDealer {
                dealer_id,
                occurred_at: Utc::now(),
            }),
            |id| Dealer::empty(DealerId::new(id)),
        )?;

        tracing::info!(dealer = %dealer_id, "dealer deleted");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Load the current dealer state (read-only).
    pub fn load_dealer(&self, dealer_id: DealerId) -> Result<Dealer, ServiceError> {
        let (dealer, _) = self
            .dispatcher
            .load(dealer_id.0, |id| Dealer::empty(DealerId::new(id)))?;
        if !dealer.can_transact() {
            return Err(ServiceError::Domain(DomainError::not_found(format!(
                "dealer {dealer_id}"
            ))));
        }
        Ok(dealer)
    }
}
