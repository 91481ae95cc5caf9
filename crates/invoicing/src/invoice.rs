use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, ProductId, Rate};
use dealerdesk_events::Event;
use dealerdesk_parties::DealerId;
use dealerdesk_pricing::{PriceLine, PricingBreakdown, TaxRates, price};
use dealerdesk_sales::OrderId;
use dealerdesk_sequence::Identifier;

/// Invoice document identifier (the stream id, not the INV number).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceDocId(pub AggregateId);

impl InvoiceDocId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceDocId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Estimates are quotes: same document shape, no payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceKind {
    Estimate,
    Invoice,
}

/// Settlement status, monotonic: Unpaid → PartiallyPaid → FullyPaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    FullyPaid,
}

/// Dealer fields frozen at issue time; later dealer edits never touch
/// an issued document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerSnapshot {
    pub dealer_id: DealerId,
    pub name: String,
    pub address: String,
}

/// Invoice line: keeps the source order so consolidated documents stay
/// traceable line by line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub child_sku: Identifier,
    pub quantity: i64,
    pub unit_price: Money,
    pub description: String,
}

/// Line input before line numbers are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub child_sku: Identifier,
    pub quantity: i64,
    pub unit_price: Money,
    pub description: String,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceDocId,
    invoice_number: Option<Identifier>,
    kind: InvoiceKind,
    dealer: Option<DealerSnapshot>,
    order_ids: Vec<OrderId>,
    lines: Vec<InvoiceLine>,
    discount: Rate,
    tax_rates: TaxRates,
    transportation: Money,
    totals: PricingBreakdown,
    paid: Money,
    due: Money,
    status: InvoiceStatus,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceDocId) -> Self {
        Self {
            id,
            invoice_number: None,
            kind: InvoiceKind::Invoice,
            dealer: None,
            order_ids: Vec::new(),
            lines: Vec::new(),
            discount: Rate::ZERO,
            tax_rates: TaxRates::exempt(),
            transportation: Money::ZERO,
            totals: PricingBreakdown::default(),
            paid: Money::ZERO,
            due: Money::ZERO,
            status: InvoiceStatus::Unpaid,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceDocId {
        self.id
    }

    pub fn invoice_number(&self) -> Option<Identifier> {
        self.invoice_number
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    pub fn dealer(&self) -> Option<&DealerSnapshot> {
        self.dealer.as_ref()
    }

    pub fn order_ids(&self) -> &[OrderId] {
        &self.order_ids
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn totals(&self) -> PricingBreakdown {
        self.totals
    }

    pub fn paid(&self) -> Money {
        self.paid
    }

    pub fn due(&self) -> Money {
        self.due
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    /// Settled means nothing is owed against the document.
    pub fn is_settled(&self) -> bool {
        self.status == InvoiceStatus::FullyPaid
    }

    fn priced(
        lines: &[NewInvoiceLine],
        discount: Rate,
        tax_rates: &TaxRates,
        transportation: Money,
    ) -> Result<(Vec<InvoiceLine>, PricingBreakdown), DomainError> {
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
            .map(|(idx, l)| InvoiceLine {
                line_no: (idx as u32) + 1,
                order_id: l.order_id,
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

impl AggregateRoot for Invoice {
    type Id = InvoiceDocId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub invoice_id: InvoiceDocId,
    /// INV-prefixed identifier from the allocator.
    pub invoice_number: Identifier,
    pub kind: InvoiceKind,
    pub dealer: DealerSnapshot,
    /// Orders consolidated under this document; each must already be
    /// approved and un-invoiced (the orchestrator checks, then marks them).
    pub order_ids: Vec<OrderId>,
    pub lines: Vec<NewInvoiceLine>,
    pub discount: Rate,
    pub tax_rates: TaxRates,
    pub transportation: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditInvoiceLines (Unpaid documents only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInvoiceLines {
    pub invoice_id: InvoiceDocId,
    pub lines: Vec<NewInvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub invoice_id: InvoiceDocId,
    /// Allocation amount; the payment aggregate holds the instrument.
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    EditInvoiceLines(EditInvoiceLines),
    ApplyPayment(ApplyPayment),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_id: InvoiceDocId,
    pub invoice_number: Identifier,
    pub kind: InvoiceKind,
    pub dealer: DealerSnapshot,
    pub order_ids: Vec<OrderId>,
    pub lines: Vec<InvoiceLine>,
    pub discount: Rate,
    pub tax_rates: TaxRates,
    pub transportation: Money,
    pub totals: PricingBreakdown,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceLinesEdited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLinesEdited {
    pub invoice_id: InvoiceDocId,
    pub lines: Vec<InvoiceLine>,
    pub totals: PricingBreakdown,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub invoice_id: InvoiceDocId,
    pub amount: Money,
    pub paid: Money,
    pub due: Money,
    pub status: InvoiceStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    InvoiceLinesEdited(InvoiceLinesEdited),
    PaymentApplied(PaymentApplied),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::InvoiceLinesEdited(_) => "invoicing.invoice.lines_edited",
            InvoiceEvent::PaymentApplied(_) => "invoicing.invoice.payment_applied",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::InvoiceLinesEdited(e) => e.occurred_at,
            InvoiceEvent::PaymentApplied(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.invoice_number = Some(e.invoice_number);
                self.kind = e.kind;
                self.dealer = Some(e.dealer.clone());
                self.order_ids = e.order_ids.clone();
                self.lines = e.lines.clone();
                self.discount = e.discount;
                self.tax_rates = e.tax_rates;
                self.transportation = e.transportation;
                self.totals = e.totals;
                self.paid = Money::ZERO;
                self.due = e.totals.grand_total;
                self.status = InvoiceStatus::Unpaid;
                self.created = true;
            }
            InvoiceEvent::InvoiceLinesEdited(e) => {
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.due = e.totals.grand_total;
            }
            InvoiceEvent::PaymentApplied(e) => {
                self.paid = e.paid;
                self.due = e.due;
                self.status = e.status;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::EditInvoiceLines(cmd) => self.handle_edit_lines(cmd),
            InvoiceCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
        }
    }
}

impl Invoice {
    fn ensure_exists(&self, invoice_id: InvoiceDocId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("invoice {invoice_id}")));
        }
        if self.id != invoice_id {
            return Err(DomainError::validation("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.order_ids.is_empty() {
            return Err(DomainError::validation(
                "an invoice must reference at least one order",
            ));
        }
        for line in &cmd.lines {
            if !cmd.order_ids.contains(&line.order_id) {
                return Err(DomainError::validation(format!(
                    "line for {} names an order the invoice does not reference",
                    line.child_sku
                )));
            }
        }

        let (lines, totals) =
            Self::priced(&cmd.lines, cmd.discount, &cmd.tax_rates, cmd.transportation)?;

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number,
            kind: cmd.kind,
            dealer: cmd.dealer.clone(),
            order_ids: cmd.order_ids.clone(),
            lines,
            discount: cmd.discount,
            tax_rates: cmd.tax_rates,
            transportation: cmd.transportation,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit_lines(&self, cmd: &EditInvoiceLines) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;

        // Once money has landed the document is frozen.
        if self.status != InvoiceStatus::Unpaid {
            return Err(DomainError::conflict(format!(
                "invoice {} is {:?}; only unpaid documents can be edited",
                cmd.invoice_id, self.status
            )));
        }
        for line in &cmd.lines {
            if !self.order_ids.contains(&line.order_id) {
                return Err(DomainError::validation(format!(
                    "line for {} names an order the invoice does not reference",
                    line.child_sku
                )));
            }
        }

        let (lines, totals) =
            Self::priced(&cmd.lines, self.discount, &self.tax_rates, self.transportation)?;

        Ok(vec![InvoiceEvent::InvoiceLinesEdited(InvoiceLinesEdited {
            invoice_id: cmd.invoice_id,
            lines,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_payment(&self, cmd: &ApplyPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;

        if self.kind == InvoiceKind::Estimate {
            return Err(DomainError::invalid_transition(format!(
                "estimate {} cannot take payments; convert it to an invoice first",
                cmd.invoice_id
            )));
        }
        if cmd.amount.cents() <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if self.status == InvoiceStatus::FullyPaid {
            return Err(DomainError::conflict(format!(
                "OverPayment: invoice {} is already fully paid",
                cmd.invoice_id
            )));
        }
        if cmd.amount.cents() > self.due.cents() {
            return Err(DomainError::conflict(format!(
                "OverPayment: {} exceeds the {} due on invoice {}",
                cmd.amount, self.due, cmd.invoice_id
            )));
        }

        let paid = self.paid.checked_add(cmd.amount)?;
        let due = self.due.checked_sub(cmd.amount)?;
        let status = if due.is_zero() {
            InvoiceStatus::FullyPaid
        } else {
            InvoiceStatus::PartiallyPaid
        };

        Ok(vec![InvoiceEvent::PaymentApplied(PaymentApplied {
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            paid,
            due,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerdesk_events::execute;
    use dealerdesk_sequence::IdKind;
    use proptest::prelude::*;

    fn test_invoice_id() -> InvoiceDocId {
        InvoiceDocId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn sku(n: u32) -> Identifier {
        Identifier::new(IdKind::Sku, n).unwrap()
    }

    fn inv(n: u32) -> Identifier {
        Identifier::new(IdKind::InvoiceNumber, n).unwrap()
    }

    fn snapshot() -> DealerSnapshot {
        DealerSnapshot {
            dealer_id: DealerId::new(AggregateId::new()),
            name: "Northway Cabinets".to_string(),
            address: "14 Mill Rd, Barrie ON".to_string(),
        }
    }

    fn lines_for(order_id: OrderId) -> Vec<NewInvoiceLine> {
        vec![
            NewInvoiceLine {
                order_id,
                product_id: ProductId::new(),
                child_sku: sku(1),
                quantity: 3,
                unit_price: Money::from_cents(1000),
                description: "maple blank".to_string(),
            },
            NewInvoiceLine {
                order_id,
                product_id: ProductId::new(),
                child_sku: sku(2),
                quantity: 1,
                unit_price: Money::from_cents(5000),
                description: "walnut blank".to_string(),
            },
        ]
    }

    fn issue_cmd(invoice_id: InvoiceDocId, kind: InvoiceKind) -> InvoiceCommand {
        let order_id = OrderId::new(AggregateId::new());
        InvoiceCommand::IssueInvoice(IssueInvoice {
            invoice_id,
            invoice_number: inv(301),
            kind,
            dealer: snapshot(),
            order_ids: vec![order_id],
            lines: lines_for(order_id),
            discount: Rate::percent(10),
            tax_rates: TaxRates::new(Rate::percent(5), Rate::percent(8), Rate::ZERO, Rate::ZERO),
            transportation: Money::ZERO,
            occurred_at: test_time(),
        })
    }

    fn issued_invoice() -> (Invoice, InvoiceDocId) {
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        execute(&mut invoice, &issue_cmd(invoice_id, InvoiceKind::Invoice)).unwrap();
        (invoice, invoice_id)
    }

    #[test]
    fn issue_opens_the_full_grand_total_as_due() {
        let (invoice, _) = issued_invoice();
        assert_eq!(invoice.status(), InvoiceStatus::Unpaid);
        assert_eq!(invoice.totals().grand_total, Money::from_cents(8136));
        assert_eq!(invoice.due(), Money::from_cents(8136));
        assert_eq!(invoice.paid(), Money::ZERO);
    }

    #[test]
    fn partial_then_full_payment_walks_the_status_forward() {
        let (mut invoice, invoice_id) = issued_invoice();
        execute(
            &mut invoice,
            &InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: Money::from_cents(5000),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.due(), Money::from_cents(3136));

        execute(
            &mut invoice,
            &InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: Money::from_cents(3136),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::FullyPaid);
        assert!(invoice.is_settled());
        assert_eq!(invoice.paid(), invoice.totals().grand_total);
    }

    #[test]
    fn overpayment_is_rejected() {
        let (invoice, invoice_id) = issued_invoice();
        let err = invoice
            .handle(&InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: Money::from_cents(9000),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("OverPayment") => {}
            other => panic!("expected OverPayment conflict, got {other:?}"),
        }
    }

    #[test]
    fn fully_paid_invoice_rejects_further_payments() {
        let (mut invoice, invoice_id) = issued_invoice();
        let due = invoice.due();
        execute(
            &mut invoice,
            &InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: due,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = invoice
            .handle(&InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: Money::from_cents(1),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn estimates_never_take_payments() {
        let invoice_id = test_invoice_id();
        let mut estimate = Invoice::empty(invoice_id);
        execute(&mut estimate, &issue_cmd(invoice_id, InvoiceKind::Estimate)).unwrap();

        let err = estimate
            .handle(&InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: Money::from_cents(100),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn edits_are_limited_to_unpaid_documents() {
        let (mut invoice, invoice_id) = issued_invoice();
        let order_id = invoice.order_ids()[0];

        execute(
            &mut invoice,
            &InvoiceCommand::EditInvoiceLines(EditInvoiceLines {
                invoice_id,
                lines: vec![NewInvoiceLine {
                    order_id,
                    product_id: ProductId::new(),
                    child_sku: sku(3),
                    quantity: 1,
                    unit_price: Money::from_cents(2000),
                    description: "oak blank".to_string(),
                }],
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(invoice.lines().len(), 1);
        assert_eq!(invoice.due(), invoice.totals().grand_total);

        execute(
            &mut invoice,
            &InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id,
                amount: Money::from_cents(100),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = invoice
            .handle(&InvoiceCommand::EditInvoiceLines(EditInvoiceLines {
                invoice_id,
                lines: lines_for(order_id),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn lines_must_name_a_referenced_order() {
        let invoice_id = test_invoice_id();
        let invoice = Invoice::empty(invoice_id);
        let order_id = OrderId::new(AggregateId::new());
        let stray = OrderId::new(AggregateId::new());

        let err = invoice
            .handle(&InvoiceCommand::IssueInvoice(IssueInvoice {
                invoice_id,
                invoice_number: inv(302),
                kind: InvoiceKind::Invoice,
                dealer: snapshot(),
                order_ids: vec![order_id],
                lines: lines_for(stray),
                discount: Rate::ZERO,
                tax_rates: TaxRates::exempt(),
                transportation: Money::ZERO,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        // Any accepted payment sequence preserves paid + due == grand_total.
        #[test]
        fn paid_plus_due_always_equals_the_grand_total(amounts in proptest::collection::vec(1i64..3000, 1..12)) {
            let (mut invoice, invoice_id) = issued_invoice();
            let total = invoice.totals().grand_total;

            for amount in amounts {
                let cmd = InvoiceCommand::ApplyPayment(ApplyPayment {
                    invoice_id,
                    amount: Money::from_cents(amount),
                    occurred_at: test_time(),
                });
                // Rejected payments must leave the ledger untouched.
                let _ = execute(&mut invoice, &cmd);
                prop_assert_eq!(invoice.paid().checked_add(invoice.due()).unwrap(), total);
            }
        }
    }
}
