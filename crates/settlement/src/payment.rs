use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use dealerdesk_events::Event;
use dealerdesk_invoicing::InvoiceDocId;
use dealerdesk_parties::DealerId;

use crate::credit_memo::CreditMemoId;
use crate::instrument::PaymentInstrument;

/// Payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Credit = money in from the dealer; Debit = money out (refund records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection {
    Credit,
    Debit,
}

/// How much of the payment lands on which invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub invoice_id: InvoiceDocId,
    pub amount: Money,
}

/// Aggregate root: Payment. A recorded payment never changes; reversal is
/// out of scope, so `RecordPayment` is the only command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    id: PaymentId,
    dealer_id: Option<DealerId>,
    total: Money,
    direction: PaymentDirection,
    instrument: Option<PaymentInstrument>,
    credit_memo: Option<CreditMemoId>,
    allocations: Vec<Allocation>,
    version: u64,
    created: bool,
}

impl Payment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            dealer_id: None,
            total: Money::ZERO,
            direction: PaymentDirection::Credit,
            instrument: None,
            credit_memo: None,
            allocations: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn dealer_id(&self) -> Option<DealerId> {
        self.dealer_id
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn direction(&self) -> PaymentDirection {
        self.direction
    }

    pub fn instrument(&self) -> Option<&PaymentInstrument> {
        self.instrument.as_ref()
    }

    pub fn credit_memo(&self) -> Option<CreditMemoId> {
        self.credit_memo
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Sum of all invoice allocations.
    pub fn allocated_total(&self) -> Result<Money, DomainError> {
        Self::sum_allocations(&self.allocations)
    }

    fn sum_allocations(allocations: &[Allocation]) -> Result<Money, DomainError> {
        allocations
            .iter()
            .try_fold(Money::ZERO, |acc, a| acc.checked_add(a.amount))
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub payment_id: PaymentId,
    pub dealer_id: DealerId,
    pub total: Money,
    pub direction: PaymentDirection,
    pub instrument: PaymentInstrument,
    /// Required when the instrument is `CreditMemo`; validated against the
    /// memo aggregate by the orchestration service.
    pub credit_memo: Option<CreditMemoId>,
    pub allocations: Vec<Allocation>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    RecordPayment(RecordPayment),
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub payment_id: PaymentId,
    pub dealer_id: DealerId,
    pub total: Money,
    pub direction: PaymentDirection,
    pub instrument: PaymentInstrument,
    pub credit_memo: Option<CreditMemoId>,
    pub allocations: Vec<Allocation>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    PaymentRecorded(PaymentRecorded),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentRecorded(_) => "settlement.payment.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::PaymentRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::PaymentRecorded(e) => {
                self.id = e.payment_id;
                self.dealer_id = Some(e.dealer_id);
                self.total = e.total;
                self.direction = e.direction;
                self.instrument = Some(e.instrument.clone());
                self.credit_memo = e.credit_memo;
                self.allocations = e.allocations.clone();
                self.created = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentCommand::RecordPayment(cmd) => self.handle_record(cmd),
        }
    }
}

impl Payment {
    fn handle_record(&self, cmd: &RecordPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already recorded"));
        }
        cmd.instrument.validate()?;
        if cmd.total.cents() <= 0 {
            return Err(DomainError::validation("payment total must be positive"));
        }
        if matches!(cmd.instrument, PaymentInstrument::CreditMemo) && cmd.credit_memo.is_none() {
            return Err(DomainError::validation(
                "IncompletePaymentDetails: credit memo payments need a memo reference",
            ));
        }
        for allocation in &cmd.allocations {
            if allocation.amount.cents() <= 0 {
                return Err(DomainError::validation(format!(
                    "allocation to invoice {} must be positive",
                    allocation.invoice_id
                )));
            }
        }

        let allocated = Self::sum_allocations(&cmd.allocations)?;
        if allocated.cents() > cmd.total.cents() {
            return Err(DomainError::conflict(format!(
                "AllocationExceedsPayment: {} allocated against a {} payment",
                allocated, cmd.total
            )));
        }

        Ok(vec![PaymentEvent::PaymentRecorded(PaymentRecorded {
            payment_id: cmd.payment_id,
            dealer_id: cmd.dealer_id,
            total: cmd.total,
            direction: cmd.direction,
            instrument: cmd.instrument.clone(),
            credit_memo: cmd.credit_memo,
            allocations: cmd.allocations.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerdesk_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn record_cmd(payment_id: PaymentId, total: i64, amounts: &[i64]) -> PaymentCommand {
        PaymentCommand::RecordPayment(RecordPayment {
            payment_id,
            dealer_id: DealerId::new(AggregateId::new()),
            total: Money::from_cents(total),
            direction: PaymentDirection::Credit,
            instrument: PaymentInstrument::Cash,
            credit_memo: None,
            allocations: amounts
                .iter()
                .map(|&amount| Allocation {
                    invoice_id: InvoiceDocId::new(AggregateId::new()),
                    amount: Money::from_cents(amount),
                })
                .collect(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn records_a_split_allocation() {
        let payment_id = PaymentId::new(AggregateId::new());
        let mut payment = Payment::empty(payment_id);
        execute(&mut payment, &record_cmd(payment_id, 10_000, &[6000, 3000])).unwrap();

        assert_eq!(payment.total(), Money::from_cents(10_000));
        assert_eq!(payment.allocated_total().unwrap(), Money::from_cents(9000));
        assert_eq!(payment.allocations().len(), 2);
    }

    #[test]
    fn allocations_cannot_exceed_the_total() {
        let payment_id = PaymentId::new(AggregateId::new());
        let payment = Payment::empty(payment_id);
        let err = payment
            .handle(&record_cmd(payment_id, 5000, &[4000, 2000]))
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("AllocationExceedsPayment") => {}
            other => panic!("expected AllocationExceedsPayment conflict, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_instrument_rejects_the_payment() {
        let payment_id = PaymentId::new(AggregateId::new());
        let payment = Payment::empty(payment_id);
        let err = payment
            .handle(&PaymentCommand::RecordPayment(RecordPayment {
                payment_id,
                dealer_id: DealerId::new(AggregateId::new()),
                total: Money::from_cents(5000),
                direction: PaymentDirection::Credit,
                instrument: PaymentInstrument::Online {
                    txn_id: String::new(),
                    link: "https://pay.example/t/91".to_string(),
                },
                credit_memo: None,
                allocations: vec![],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn memo_instrument_requires_a_memo_reference() {
        let payment_id = PaymentId::new(AggregateId::new());
        let payment = Payment::empty(payment_id);
        let err = payment
            .handle(&PaymentCommand::RecordPayment(RecordPayment {
                payment_id,
                dealer_id: DealerId::new(AggregateId::new()),
                total: Money::from_cents(2500),
                direction: PaymentDirection::Credit,
                instrument: PaymentInstrument::CreditMemo,
                credit_memo: None,
                allocations: vec![],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn a_recorded_payment_is_immutable() {
        let payment_id = PaymentId::new(AggregateId::new());
        let mut payment = Payment::empty(payment_id);
        execute(&mut payment, &record_cmd(payment_id, 1000, &[1000])).unwrap();

        let err = payment
            .handle(&record_cmd(payment_id, 2000, &[2000]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
