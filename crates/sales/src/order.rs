use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, Money, ProductId, Rate,
};
use dealerdesk_events::Event;
use dealerdesk_parties::DealerId;
use dealerdesk_pricing::{PriceLine, PricingBreakdown, TaxRates, price};
use dealerdesk_sequence::Identifier;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Approval gate: one-way, Pending → Approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPhase {
    Pending,
    Approved,
}

/// Fulfillment lifecycle, independent of the approval gate.
///
/// Forward-only along Approved → Ready → Shipped → Fulfilled; Reject is
/// reachable from Approved/Ready; Deleted only via soft delete. Reject and
/// Deleted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Approved,
    Ready,
    Reject,
    Shipped,
    Fulfilled,
    Deleted,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Reject | OrderStatus::Deleted)
    }

    /// Legal forward moves on the fulfillment axis.
    fn can_advance_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Approved, Ready) | (Ready, Shipped) | (Shipped, Fulfilled) | (Approved, Reject) | (Ready, Reject)
        )
    }
}

/// Whether an invoice references this order yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderInvoiceStatus {
    Pending,
    Invoiced,
}

/// Order line: product, child SKU, quantity, list price, description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub child_sku: Identifier,
    pub quantity: i64,
    /// Undiscounted list price in cents; the dealer discount is applied
    /// during pricing, never baked into the stored line.
    pub unit_price: Money,
    pub description: String,
}

/// Line input before line numbers are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub child_sku: Identifier,
    pub quantity: i64,
    pub unit_price: Money,
    pub description: String,
}

/// Stock reserved for this order, keyed by the inventory row's stream id.
///
/// Recorded on the order stream so that any process rehydrating the order
/// can release or consume the reservation without out-of-band state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBooking {
    pub stock_row: AggregateId,
    pub quantity: i64,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    dealer_id: Option<DealerId>,
    po_number: String,
    agent: Option<ActorId>,
    lines: Vec<OrderLine>,
    bookings: Vec<StockBooking>,
    discount: Rate,
    tax_rates: TaxRates,
    transportation: Money,
    totals: PricingBreakdown,
    phase: OrderPhase,
    status: OrderStatus,
    invoice_status: OrderInvoiceStatus,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            dealer_id: None,
            po_number: String::new(),
            agent: None,
            lines: Vec::new(),
            bookings: Vec::new(),
            discount: Rate::ZERO,
            tax_rates: TaxRates::exempt(),
            transportation: Money::ZERO,
            totals: PricingBreakdown::default(),
            phase: OrderPhase::Pending,
            status: OrderStatus::Approved,
            invoice_status: OrderInvoiceStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn dealer_id(&self) -> Option<DealerId> {
        self.dealer_id
    }

    pub fn po_number(&self) -> &str {
        &self.po_number
    }

    pub fn agent(&self) -> Option<ActorId> {
        self.agent
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Stock reservations still outstanding. Empty once the order reaches a
    /// terminal state, at which point the rows have been released or shipped.
    pub fn bookings(&self) -> &[StockBooking] {
        &self.bookings
    }

    pub fn discount(&self) -> Rate {
        self.discount
    }

    pub fn tax_rates(&self) -> TaxRates {
        self.tax_rates
    }

    pub fn totals(&self) -> PricingBreakdown {
        self.totals
    }

    pub fn phase(&self) -> OrderPhase {
        self.phase
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn invoice_status(&self) -> OrderInvoiceStatus {
        self.invoice_status
    }

    /// Lines may change only while no invoice references the order and the
    /// fulfillment lifecycle has not left the warehouse.
    pub fn is_modifiable(&self) -> bool {
        self.invoice_status == OrderInvoiceStatus::Pending
            && matches!(self.status, OrderStatus::Approved | OrderStatus::Ready)
    }

    /// Approved, un-invoiced, not rejected/deleted: eligible for invoicing.
    pub fn is_invoiceable(&self) -> bool {
        self.phase == OrderPhase::Approved
            && self.invoice_status == OrderInvoiceStatus::Pending
            && !self.status.is_terminal()
    }

    fn priced(lines: &[NewOrderLine], discount: Rate, tax_rates: &TaxRates, transportation: Money)
    -> Result<(Vec<OrderLine>, PricingBreakdown), DomainError> {
        for (idx, line) in lines.iter().enumerate() {
            if line.description.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "line {}: description cannot be empty",
                    idx + 1
                )));
            }
        }

        let price_lines: Vec<PriceLine> = lines
            .iter()
            .map(|l| PriceLine {
                quantity: l.quantity,
                list_price: l.unit_price,
            })
            .collect();
        let totals = price(&price_lines, discount, tax_rates, transportation)?;

        let numbered = lines
            .iter()
            .enumerate()
            .map(|(idx, l)| OrderLine {
                line_no: (idx as u32) + 1,
                product_id: l.product_id,
                child_sku: l.child_sku,
                quantity: l.quantity,
                unit_price: l.unit_price,
                description: l.description.clone(),
            })
            .collect();

        Ok((numbered, totals))
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub dealer_id: DealerId,
    /// Unique purchase-order reference; uniqueness is enforced by the store.
    pub po_number: String,
    pub lines: Vec<NewOrderLine>,
    /// Per-row reservations backing the lines, released or consumed later.
    pub bookings: Vec<StockBooking>,
    /// Dealer discount and tax slab, snapshotted at creation time.
    pub discount: Rate,
    pub tax_rates: TaxRates,
    pub transportation: Money,
    pub agent: Option<ActorId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder (phase gate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLines {
    pub order_id: OrderId,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInvoiced (idempotent; sent by the invoice ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiced {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStatus (fulfillment axis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteOrder {
    pub order_id: OrderId,
    /// Whether the referencing invoice (if any) is fully paid or voided;
    /// supplied by the orchestrator from the invoice aggregate.
    pub invoice_settled: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    ApproveOrder(ApproveOrder),
    UpdateLines(UpdateLines),
    MarkInvoiced(MarkInvoiced),
    SetStatus(SetStatus),
    SoftDeleteOrder(SoftDeleteOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub dealer_id: DealerId,
    pub po_number: String,
    pub lines: Vec<OrderLine>,
    pub bookings: Vec<StockBooking>,
    pub discount: Rate,
    pub tax_rates: TaxRates,
    pub transportation: Money,
    pub totals: PricingBreakdown,
    pub agent: Option<ActorId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderLinesUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLinesUpdated {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub totals: PricingBreakdown,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInvoiced {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderApproved(OrderApproved),
    OrderLinesUpdated(OrderLinesUpdated),
    OrderInvoiced(OrderInvoiced),
    OrderStatusChanged(OrderStatusChanged),
    OrderDeleted(OrderDeleted),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "sales.order.created",
            OrderEvent::OrderApproved(_) => "sales.order.approved",
            OrderEvent::OrderLinesUpdated(_) => "sales.order.lines_updated",
            OrderEvent::OrderInvoiced(_) => "sales.order.invoiced",
            OrderEvent::OrderStatusChanged(_) => "sales.order.status_changed",
            OrderEvent::OrderDeleted(_) => "sales.order.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderApproved(e) => e.occurred_at,
            OrderEvent::OrderLinesUpdated(e) => e.occurred_at,
            OrderEvent::OrderInvoiced(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
            OrderEvent::OrderDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.dealer_id = Some(e.dealer_id);
                self.po_number = e.po_number.clone();
                self.agent = e.agent;
                self.lines = e.lines.clone();
                self.bookings = e.bookings.clone();
                self.discount = e.discount;
                self.tax_rates = e.tax_rates;
                self.transportation = e.transportation;
                self.totals = e.totals;
                self.phase = OrderPhase::Pending;
                self.status = OrderStatus::Approved;
                self.invoice_status = OrderInvoiceStatus::Pending;
                self.created = true;
            }
            OrderEvent::OrderApproved(_) => {
                self.phase = OrderPhase::Approved;
            }
            OrderEvent::OrderLinesUpdated(e) => {
                self.lines = e.lines.clone();
                self.totals = e.totals;
            }
            OrderEvent::OrderInvoiced(_) => {
                self.invoice_status = OrderInvoiceStatus::Invoiced;
            }
            OrderEvent::OrderStatusChanged(e) => {
                self.status = e.status;
                // Reject releases the rows, Fulfilled ships them; either way
                // nothing remains reserved for this order.
                if e.status.is_terminal() || e.status == OrderStatus::Fulfilled {
                    self.bookings.clear();
                }
            }
            OrderEvent::OrderDeleted(_) => {
                self.status = OrderStatus::Deleted;
                self.bookings.clear();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::ApproveOrder(cmd) => self.handle_approve(cmd),
            OrderCommand::UpdateLines(cmd) => self.handle_update_lines(cmd),
            OrderCommand::MarkInvoiced(cmd) => self.handle_mark_invoiced(cmd),
            OrderCommand::SetStatus(cmd) => self.handle_set_status(cmd),
            OrderCommand::SoftDeleteOrder(cmd) => self.handle_soft_delete(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::validation("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.po_number.trim().is_empty() {
            return Err(DomainError::validation("po_number cannot be empty"));
        }
        if cmd.bookings.iter().any(|b| b.quantity <= 0) {
            return Err(DomainError::validation("booking quantity must be positive"));
        }

        let (lines, totals) =
            Self::priced(&cmd.lines, cmd.discount, &cmd.tax_rates, cmd.transportation)?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            dealer_id: cmd.dealer_id,
            po_number: cmd.po_number.clone(),
            lines,
            bookings: cmd.bookings.clone(),
            discount: cmd.discount,
            tax_rates: cmd.tax_rates,
            transportation: cmd.transportation,
            totals,
            agent: cmd.agent,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.phase == OrderPhase::Approved {
            return Err(DomainError::invalid_transition(format!(
                "order {} is already approved; the approval gate is one-way",
                cmd.order_id
            )));
        }
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "order {} is {:?}",
                cmd.order_id, self.status
            )));
        }

        Ok(vec![OrderEvent::OrderApproved(OrderApproved {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_lines(&self, cmd: &UpdateLines) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.invoice_status == OrderInvoiceStatus::Invoiced {
            return Err(DomainError::conflict(format!(
                "OrderLocked: order {} is referenced by an invoice",
                cmd.order_id
            )));
        }
        if !self.is_modifiable() {
            return Err(DomainError::invalid_transition(format!(
                "order {} lines cannot change in status {:?}",
                cmd.order_id, self.status
            )));
        }

        let (lines, totals) =
            Self::priced(&cmd.lines, self.discount, &self.tax_rates, self.transportation)?;

        Ok(vec![OrderEvent::OrderLinesUpdated(OrderLinesUpdated {
            order_id: cmd.order_id,
            lines,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_invoiced(&self, cmd: &MarkInvoiced) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        // Idempotent: marking an already invoiced order is a no-op.
        if self.invoice_status == OrderInvoiceStatus::Invoiced {
            return Ok(vec![]);
        }
        if !self.is_invoiceable() {
            return Err(DomainError::invalid_transition(format!(
                "order {} is not eligible for invoicing (phase {:?}, status {:?})",
                cmd.order_id, self.phase, self.status
            )));
        }

        Ok(vec![OrderEvent::OrderInvoiced(OrderInvoiced {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_status(&self, cmd: &SetStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.phase != OrderPhase::Approved {
            return Err(DomainError::invalid_transition(format!(
                "order {} must be approved before its fulfillment status changes",
                cmd.order_id
            )));
        }
        if cmd.status == OrderStatus::Deleted {
            return Err(DomainError::validation(
                "orders are deleted through soft delete, not SetStatus",
            ));
        }
        if !self.status.can_advance_to(cmd.status) {
            return Err(DomainError::invalid_transition(format!(
                "order {} cannot move {:?} -> {:?}",
                cmd.order_id, self.status, cmd.status
            )));
        }

        Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: cmd.order_id,
            status: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_soft_delete(&self, cmd: &SoftDeleteOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status == OrderStatus::Deleted {
            return Err(DomainError::invalid_transition("order is already deleted"));
        }
        if self.invoice_status == OrderInvoiceStatus::Invoiced && !cmd.invoice_settled {
            return Err(DomainError::conflict(format!(
                "OrderHasActiveInvoice: order {} is invoiced and the invoice is not settled",
                cmd.order_id
            )));
        }

        Ok(vec![OrderEvent::OrderDeleted(OrderDeleted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
