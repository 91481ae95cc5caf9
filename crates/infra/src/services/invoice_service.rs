use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use dealerdesk_core::{Aggregate, DomainError, Money};
use dealerdesk_events::{AuditSink, EventBus, EventEnvelope};
use dealerdesk_invoicing::{
    DealerSnapshot, EditInvoiceLines, Invoice, InvoiceCommand, InvoiceDocId, InvoiceEvent,
    InvoiceKind, IssueInvoice, NewInvoiceLine,
};
use dealerdesk_parties::{
    Dealer, DealerCommand, DealerId, RecordInvoiceExposure,
};
use dealerdesk_sales::{MarkInvoiced, Order, OrderCommand, OrderId};
use dealerdesk_sequence::{IdKind, Identifier, IdentifierAllocator};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::services::{ServiceError, TaxSlabDirectory, aggregate_types, audit_committed};

/// Invoice issue and editing.
///
/// Issuing consolidates one or more approved orders: the invoice stream, a
/// `MarkInvoiced` on every source order, and the dealer's open-balance
/// exposure all land in one atomic batch. Estimates produce only the
/// document; they lock no orders and move no balances.
pub struct InvoiceService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    allocator: Arc<IdentifierAllocator>,
    slabs: Arc<TaxSlabDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl<S, B> InvoiceService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        store: S,
        bus: B,
        allocator: Arc<IdentifierAllocator>,
        slabs: Arc<TaxSlabDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            allocator,
            slabs,
            audit,
        }
    }

    pub fn issue_invoice(
        &self,
        invoice_id: InvoiceDocId,
        kind: InvoiceKind,
        dealer_id: DealerId,
        order_ids: &[OrderId],
        transportation: Money,
    ) -> Result<Identifier, ServiceError> {
        let invoice_number = self.allocator.allocate(IdKind::InvoiceNumber)?;

        let result =
            self.issue_inner(invoice_id, invoice_number, kind, dealer_id, order_ids, transportation);
        if result.is_err() {
            // The INV number goes back to the gap pool on failure.
            let _ = self.allocator.release(invoice_number);
        }
        result?;
        Ok(invoice_number)
    }

    fn issue_inner(
        &self,
        invoice_id: InvoiceDocId,
        invoice_number: Identifier,
        kind: InvoiceKind,
        dealer_id: DealerId,
        order_ids: &[OrderId],
        transportation: Money,
    ) -> Result<(), ServiceError> {
        let (dealer, dealer_version) = self
            .dispatcher
            .load(dealer_id.0, |id| Dealer::empty(DealerId::new(id)))?;
        if !dealer.can_transact() {
            return Err(ServiceError::Domain(DomainError::invalid_transition(
                format!("dealer {dealer_id} cannot be invoiced"),
            )));
        }
        let slab_id = dealer
            .tax_slab()
            .ok_or_else(|| DomainError::validation("dealer has no tax slab"))?;
        let tax_rates = self.slabs.rates(slab_id)?;

        // Load every source order; each must be approved, un-invoiced and
        // owned by this dealer. Lines aggregate across orders.
        let mut lines: Vec<NewInvoiceLine> = Vec::new();
        let mut orders: Vec<(Order, u64)> = Vec::new();
        for &order_id in order_ids {
            let (order, version) = self
                .dispatcher
                .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
            if order.dealer_id() != Some(dealer_id) {
                return Err(ServiceError::Domain(DomainError::validation(format!(
                    "order {order_id} belongs to another dealer"
                ))));
            }
            if !order.is_invoiceable() {
                return Err(ServiceError::Domain(DomainError::invalid_transition(
                    format!("order {order_id} is not eligible for invoicing"),
                )));
            }
            for l in order.lines() {
                lines.push(NewInvoiceLine {
                    order_id,
                    product_id: l.product_id,
                    child_sku: l.child_sku,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    description: l.description.clone(),
                });
            }
            orders.push((order, version));
        }

        let (invoice, invoice_version) = self
            .dispatcher
            .load(invoice_id.0, |id| Invoice::empty(InvoiceDocId::new(id)))?;
        let invoice_events = invoice.handle(&InvoiceCommand::IssueInvoice(IssueInvoice {
            invoice_id,
            invoice_number,
            kind,
            dealer: DealerSnapshot {
                dealer_id,
                name: dealer.name().to_string(),
                address: dealer.address().to_string(),
            },
            order_ids: order_ids.to_vec(),
            lines,
            discount: dealer.discount(),
            tax_rates,
            transportation,
            occurred_at: Utc::now(),
        }))?;
        let grand_total = invoice_events
            .iter()
            .find_map(|ev| match ev {
                InvoiceEvent::InvoiceIssued(e) => Some(e.totals.grand_total),
                _ => None,
            })
            .ok_or_else(|| DomainError::conflict("issue decided no InvoiceIssued event"))?;

        let mut batch = vec![CommandDispatcher::<S, B>::stage::<Invoice>(
            invoice_id.0,
            aggregate_types::INVOICE,
            invoice_version,
            &invoice_events,
        )?];

        if kind == InvoiceKind::Invoice {
            for (order, version) in &orders {
                let order_id = order.id_typed();
                let events = order.handle(&OrderCommand::MarkInvoiced(MarkInvoiced {
                    order_id,
                    occurred_at: Utc::now(),
                }))?;
                batch.push(CommandDispatcher::<S, B>::stage::<Order>(
                    order_id.0,
                    aggregate_types::ORDER,
                    *version,
                    &events,
                )?);
            }

            let exposure = dealer.handle(&DealerCommand::RecordInvoiceExposure(
                RecordInvoiceExposure {
                    dealer_id,
                    amount: grand_total,
                    occurred_at: Utc::now(),
                },
            ))?;
            batch.push(CommandDispatcher::<S, B>::stage::<Dealer>(
                dealer_id.0,
                aggregate_types::DEALER,
                dealer_version,
                &exposure,
            )?);
        }

        let committed = self.dispatcher.commit(batch)?;

        tracing::info!(
            invoice = %invoice_id,
            number = %invoice_number,
            dealer = %dealer_id,
            orders = order_ids.len(),
            total = %grand_total,
            "invoice issued"
        );
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Rework the lines of an unpaid document.
    pub fn edit_lines(
        &self,
        invoice_id: InvoiceDocId,
        lines: Vec<NewInvoiceLine>,
    ) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            invoice_id.0,
            aggregate_types::INVOICE,
            InvoiceCommand::EditInvoiceLines(EditInvoiceLines {
                invoice_id,
                lines,
                occurred_at: Utc::now(),
            }),
            |id| Invoice::empty(InvoiceDocId::new(id)),
        )?;

        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Load the current invoice state (read-only).
    pub fn load_invoice(&self, invoice_id: InvoiceDocId) -> Result<Invoice, ServiceError> {
        let (invoice, _) = self
            .dispatcher
            .load(invoice_id.0, |id| Invoice::empty(InvoiceDocId::new(id)))?;
        Ok(invoice)
    }
}
