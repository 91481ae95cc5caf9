use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;

use dealerdesk_core::{ActorId, Aggregate, DomainError, Money};
use dealerdesk_events::{AuditSink, EventBus, EventEnvelope};
use dealerdesk_inventory::{
    BookStock, FulfillShipment, ReleaseBooking, StockRow, StockRowCommand, StockRowId,
};
use dealerdesk_invoicing::{Invoice, InvoiceDocId};
use dealerdesk_parties::{Dealer, DealerId};
use dealerdesk_sales::{
    ApproveOrder, CreateOrder, NewOrderLine, Order, OrderCommand, OrderId, OrderStatus, SetStatus,
    SoftDeleteOrder, StockBooking, UpdateLines,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, StreamAppend};
use crate::services::{ServiceError, TaxSlabDirectory, aggregate_types, audit_committed};

/// One order line plus the stock row it draws from.
#[derive(Debug, Clone)]
pub struct OrderLineSpec {
    pub line: NewOrderLine,
    pub stock_row: StockRowId,
}

/// Order lifecycle orchestration.
///
/// Creating an order books inventory in the same atomic batch; rejection and
/// deletion release what is still booked, and fulfillment consumes it. The
/// reservations ride on the order stream itself, so any instance over the
/// same store can unwind them.
pub struct OrderService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    slabs: Arc<TaxSlabDirectory>,
    audit: Arc<dyn AuditSink>,
    /// PO numbers are dealer-supplied; uniqueness is enforced here.
    po_index: Mutex<HashMap<String, OrderId>>,
}

impl<S, B> OrderService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, slabs: Arc<TaxSlabDirectory>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            slabs,
            audit,
            po_index: Mutex::new(HashMap::new()),
        }
    }

    /// Create an order for an active dealer and book every line's stock in
    /// the same commit. If any row lacks stock, nothing is written.
    pub fn create_order(
        &self,
        order_id: OrderId,
        dealer_id: DealerId,
        po_number: &str,
        lines: Vec<OrderLineSpec>,
        transportation: Money,
        agent: Option<ActorId>,
    ) -> Result<(), ServiceError> {
        self.claim_po(po_number, order_id)?;

        let result = self.create_order_inner(
            order_id,
            dealer_id,
            po_number,
            lines,
            transportation,
            agent,
        );
        if result.is_err() {
            self.release_po(po_number);
        }
        result
    }

    fn create_order_inner(
        &self,
        order_id: OrderId,
        dealer_id: DealerId,
        po_number: &str,
        lines: Vec<OrderLineSpec>,
        transportation: Money,
        agent: Option<ActorId>,
    ) -> Result<(), ServiceError> {
        let dealer = self.load_active_dealer(dealer_id)?;
        let slab_id = dealer
            .tax_slab()
            .ok_or_else(|| DomainError::validation("dealer has no tax slab"))?;
        let tax_rates = self.slabs.rates(slab_id)?;

        // Book per stock row, merging quantities for lines that share a row.
        let mut per_row: HashMap<StockRowId, i64> = HashMap::new();
        for spec in &lines {
            *per_row.entry(spec.stock_row).or_insert(0) += spec.line.quantity;
        }
        let bookings: Vec<StockBooking> = per_row
            .into_iter()
            .map(|(row_id, quantity)| StockBooking {
                stock_row: row_id.0,
                quantity,
            })
            .collect();

        let (order, order_version) = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        let order_events = order.handle(&OrderCommand::CreateOrder(CreateOrder {
            order_id,
            dealer_id,
            po_number: po_number.to_string(),
            lines: lines.iter().map(|spec| spec.line.clone()).collect(),
            bookings: bookings.clone(),
            discount: dealer.discount(),
            tax_rates,
            transportation,
            agent,
            occurred_at: Utc::now(),
        }))?;

        let mut batch = vec![CommandDispatcher::<S, B>::stage::<Order>(
            order_id.0,
            aggregate_types::ORDER,
            order_version,
            &order_events,
        )?];
        for booking in &bookings {
            let row_id = StockRowId::new(booking.stock_row);
            batch.push(self.stage_stock_command(
                row_id,
                StockRowCommand::BookStock(BookStock {
                    row_id,
                    quantity: booking.quantity,
                    occurred_at: Utc::now(),
                }),
            )?);
        }

        let committed = self.dispatcher.commit(batch)?;

        tracing::info!(order = %order_id, dealer = %dealer_id, po = po_number, "order created");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    pub fn approve_order(&self, order_id: OrderId) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            order_id.0,
            aggregate_types::ORDER,
            OrderCommand::ApproveOrder(ApproveOrder {
                order_id,
                occurred_at: Utc::now(),
            }),
            |id| Order::empty(OrderId::new(id)),
        )?;

        tracing::info!(order = %order_id, "order approved");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Replace the order's lines. Inventory bookings are not rebalanced here;
    /// the operator releases or rebooks stock explicitly.
    pub fn update_lines(
        &self,
        order_id: OrderId,
        lines: Vec<NewOrderLine>,
    ) -> Result<(), ServiceError> {
        let committed = self.dispatcher.dispatch(
            order_id.0,
            aggregate_types::ORDER,
            OrderCommand::UpdateLines(UpdateLines {
                order_id,
                lines,
                occurred_at: Utc::now(),
            }),
            |id| Order::empty(OrderId::new(id)),
        )?;

        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Advance the fulfillment status. `Reject` releases the order's
    /// remaining stock bookings in the same commit; `Fulfilled` consumes
    /// them as shipped goods.
    pub fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<(), ServiceError> {
        let (order, order_version) = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        let order_events = order.handle(&OrderCommand::SetStatus(SetStatus {
            order_id,
            status,
            occurred_at: Utc::now(),
        }))?;

        let mut batch = vec![CommandDispatcher::<S, B>::stage::<Order>(
            order_id.0,
            aggregate_types::ORDER,
            order_version,
            &order_events,
        )?];

        if matches!(status, OrderStatus::Reject | OrderStatus::Fulfilled) {
            for booking in order.bookings() {
                let row_id = StockRowId::new(booking.stock_row);
                let cmd = match status {
                    OrderStatus::Reject => StockRowCommand::ReleaseBooking(ReleaseBooking {
                        row_id,
                        quantity: booking.quantity,
                        occurred_at: Utc::now(),
                    }),
                    _ => StockRowCommand::FulfillShipment(FulfillShipment {
                        row_id,
                        quantity: booking.quantity,
                        occurred_at: Utc::now(),
                    }),
                };
                batch.push(self.stage_stock_command(row_id, cmd)?);
            }
        }

        let committed = self.dispatcher.commit(batch)?;

        tracing::info!(order = %order_id, ?status, "order status changed");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Soft delete. When the order is invoiced, the caller names the invoice
    /// so its settlement state can gate the deletion; outstanding stock
    /// bookings are released in the same commit.
    pub fn soft_delete_order(
        &self,
        order_id: OrderId,
        invoice: Option<InvoiceDocId>,
    ) -> Result<(), ServiceError> {
        let invoice_settled = match invoice {
            Some(invoice_id) => {
                let (invoice, _) = self
                    .dispatcher
                    .load(invoice_id.0, |id| Invoice::empty(InvoiceDocId::new(id)))?;
                invoice.is_settled()
            }
            None => false,
        };

        let (order, order_version) = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        let order_events = order.handle(&OrderCommand::SoftDeleteOrder(SoftDeleteOrder {
            order_id,
            invoice_settled,
            occurred_at: Utc::now(),
        }))?;

        let mut batch = vec![CommandDispatcher::<S, B>::stage::<Order>(
            order_id.0,
            aggregate_types::ORDER,
            order_version,
            &order_events,
        )?];
        for booking in order.bookings() {
            let row_id = StockRowId::new(booking.stock_row);
            batch.push(self.stage_stock_command(
                row_id,
                StockRowCommand::ReleaseBooking(ReleaseBooking {
                    row_id,
                    quantity: booking.quantity,
                    occurred_at: Utc::now(),
                }),
            )?);
        }

        let committed = self.dispatcher.commit(batch)?;

        tracing::info!(order = %order_id, "order soft-deleted");
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Load the current order state (read-only).
    pub fn load_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let (order, _) = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        Ok(order)
    }

    fn load_active_dealer(&self, dealer_id: DealerId) -> Result<Dealer, ServiceError> {
        let (dealer, _) = self
            .dispatcher
            .load(dealer_id.0, |id| Dealer::empty(DealerId::new(id)))?;
        if !dealer.can_transact() {
            return Err(ServiceError::Domain(DomainError::invalid_transition(
                format!("dealer {dealer_id} cannot place orders"),
            )));
        }
        Ok(dealer)
    }

    fn stage_stock_command(
        &self,
        row_id: StockRowId,
        command: StockRowCommand,
    ) -> Result<StreamAppend, ServiceError> {
        let (row, version) = self
            .dispatcher
            .load(row_id.0, |id| StockRow::empty(StockRowId::new(id)))?;
        let events = row.handle(&command)?;
        Ok(CommandDispatcher::<S, B>::stage::<StockRow>(
            row_id.0,
            aggregate_types::STOCK_ROW,
            version,
            &events,
        )?)
    }

    fn claim_po(&self, po_number: &str, order_id: OrderId) -> Result<(), ServiceError> {
        let mut index = self
            .po_index
            .lock()
            .map_err(|_| DomainError::conflict("po index lock poisoned"))?;
        if index.contains_key(po_number) {
            return Err(ServiceError::Domain(DomainError::conflict(format!(
                "PO number {po_number} is already in use"
            ))));
        }
        index.insert(po_number.to_string(), order_id);
        Ok(())
    }

    fn release_po(&self, po_number: &str) {
        if let Ok(mut index) = self.po_index.lock() {
            index.remove(po_number);
        }
    }
}
