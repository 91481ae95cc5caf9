use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, Rate};
use dealerdesk_events::Event;

use crate::tax_slab::TaxSlabId;

/// Dealer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealerId(pub AggregateId);

impl DealerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DealerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Dealer status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealerStatus {
    Active,
    Deleted,
}

/// Running balances, maintained exclusively by invoicing/settlement flows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DealerBalances {
    /// Invoiced but not yet settled.
    pub total_open_balance: Money,
    /// Lifetime invoiced exposure.
    pub total_balance: Money,
    /// Lifetime payments received.
    pub paid_amount: Money,
}

/// Aggregate root: Dealer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dealer {
    id: DealerId,
    name: String,
    address: String,
    discount: Rate,
    tax_slab: Option<TaxSlabId>,
    balances: DealerBalances,
    status: DealerStatus,
    version: u64,
    created: bool,
}

impl Dealer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DealerId) -> Self {
        Self {
            id,
            name: String::new(),
            address: String::new(),
            discount: Rate::ZERO,
            tax_slab: None,
            balances: DealerBalances::default(),
            status: DealerStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DealerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn discount(&self) -> Rate {
        self.discount
    }

    pub fn tax_slab(&self) -> Option<TaxSlabId> {
        self.tax_slab
    }

    pub fn balances(&self) -> DealerBalances {
        self.balances
    }

    pub fn status(&self) -> DealerStatus {
        self.status
    }

    /// Invariant helper: deleted dealers cannot place orders or pay.
    pub fn can_transact(&self) -> bool {
        self.created && self.status == DealerStatus::Active
    }
}

impl AggregateRoot for Dealer {
    type Id = DealerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterDealer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDealer {
    pub dealer_id: DealerId,
    pub name: String,
    pub address: String,
    pub discount: Rate,
    pub tax_slab: TaxSlabId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvoiceExposure — invoicing adds to the open balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoiceExposure {
    pub dealer_id: DealerId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplySettlementTotals — settlement moves paid/open balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySettlementTotals {
    pub dealer_id: DealerId,
    /// Total payment received (adds to `paid_amount`).
    pub paid_delta: Money,
    /// Sum of invoice allocations (subtracts from `total_open_balance`).
    pub allocated: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteDealer (terminal soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDealer {
    pub dealer_id: DealerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealerCommand {
    RegisterDealer(RegisterDealer),
    RecordInvoiceExposure(RecordInvoiceExposure),
    ApplySettlementTotals(ApplySettlementTotals),
    DeleteDealer(DeleteDealer),
}

/// Event: DealerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerRegistered {
    pub dealer_id: DealerId,
    pub name: String,
    pub address: String,
    pub discount: Rate,
    pub tax_slab: TaxSlabId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceExposureRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceExposureRecorded {
    pub dealer_id: DealerId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SettlementTotalsApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotalsApplied {
    pub dealer_id: DealerId,
    pub paid_delta: Money,
    pub allocated: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DealerDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerDeleted {
    pub dealer_id: DealerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealerEvent {
    DealerRegistered(DealerRegistered),
    InvoiceExposureRecorded(InvoiceExposureRecorded),
    SettlementTotalsApplied(SettlementTotalsApplied),
    DealerDeleted(DealerDeleted),
}

impl Event for DealerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DealerEvent::DealerRegistered(_) => "parties.dealer.registered",
            DealerEvent::InvoiceExposureRecorded(_) => "parties.dealer.invoice_exposure_recorded",
            DealerEvent::SettlementTotalsApplied(_) => "parties.dealer.settlement_totals_applied",
            DealerEvent::DealerDeleted(_) => "parties.dealer.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DealerEvent::DealerRegistered(e) => e.occurred_at,
            DealerEvent::InvoiceExposureRecorded(e) => e.occurred_at,
            DealerEvent::SettlementTotalsApplied(e) => e.occurred_at,
            DealerEvent::DealerDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Dealer {
    type Command = DealerCommand;
    type Event = DealerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DealerEvent::DealerRegistered(e) => {
                self.id = e.dealer_id;
                self.name = e.name.clone();
                self.address = e.address.clone();
                self.discount = e.discount;
                self.tax_slab = Some(e.tax_slab);
                self.balances = DealerBalances::default();
                self.status = DealerStatus::Active;
                self.created = true;
            }
            DealerEvent::InvoiceExposureRecorded(e) => {
                // Guards in handle() keep these sums in range.
                self.balances.total_open_balance =
                    Money::from_cents(self.balances.total_open_balance.cents() + e.amount.cents());
                self.balances.total_balance =
                    Money::from_cents(self.balances.total_balance.cents() + e.amount.cents());
            }
            DealerEvent::SettlementTotalsApplied(e) => {
                self.balances.paid_amount =
                    Money::from_cents(self.balances.paid_amount.cents() + e.paid_delta.cents());
                self.balances.total_open_balance = Money::from_cents(
                    self.balances.total_open_balance.cents() - e.allocated.cents(),
                );
            }
            DealerEvent::DealerDeleted(_) => {
                self.status = DealerStatus::Deleted;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DealerCommand::RegisterDealer(cmd) => self.handle_register(cmd),
            DealerCommand::RecordInvoiceExposure(cmd) => self.handle_exposure(cmd),
            DealerCommand::ApplySettlementTotals(cmd) => self.handle_settlement_totals(cmd),
            DealerCommand::DeleteDealer(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Dealer {
    fn ensure_dealer_id(&self, dealer_id: DealerId) -> Result<(), DomainError> {
        if self.id != dealer_id {
            return Err(DomainError::validation("dealer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_transactable(&self, dealer_id: DealerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("dealer {dealer_id}")));
        }
        self.ensure_dealer_id(dealer_id)?;
        if !self.can_transact() {
            return Err(DomainError::invalid_transition(format!(
                "dealer {dealer_id} is deleted"
            )));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterDealer) -> Result<Vec<DealerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("dealer already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("dealer name cannot be empty"));
        }
        cmd.discount.ensure_discount()?;

        Ok(vec![DealerEvent::DealerRegistered(DealerRegistered {
            dealer_id: cmd.dealer_id,
            name: cmd.name.clone(),
            address: cmd.address.clone(),
            discount: cmd.discount,
            tax_slab: cmd.tax_slab,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_exposure(
        &self,
        cmd: &RecordInvoiceExposure,
    ) -> Result<Vec<DealerEvent>, DomainError> {
        self.ensure_transactable(cmd.dealer_id)?;
        if cmd.amount.is_negative() || cmd.amount.is_zero() {
            return Err(DomainError::validation("invoice exposure must be positive"));
        }
        self.balances.total_open_balance.checked_add(cmd.amount)?;
        self.balances.total_balance.checked_add(cmd.amount)?;

        Ok(vec![DealerEvent::InvoiceExposureRecorded(
            InvoiceExposureRecorded {
                dealer_id: cmd.dealer_id,
                amount: cmd.amount,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_settlement_totals(
        &self,
        cmd: &ApplySettlementTotals,
    ) -> Result<Vec<DealerEvent>, DomainError> {
        self.ensure_transactable(cmd.dealer_id)?;
        if cmd.paid_delta.is_negative() || cmd.allocated.is_negative() {
            return Err(DomainError::validation("settlement totals cannot be negative"));
        }
        if cmd.allocated.cents() > cmd.paid_delta.cents() {
            return Err(DomainError::conflict(
                "allocated amount exceeds the payment total",
            ));
        }
        self.balances.paid_amount.checked_add(cmd.paid_delta)?;
        if cmd.allocated.cents() > self.balances.total_open_balance.cents() {
            return Err(DomainError::conflict(format!(
                "allocation {} exceeds open balance {} for dealer {}",
                cmd.allocated, self.balances.total_open_balance, cmd.dealer_id
            )));
        }

        Ok(vec![DealerEvent::SettlementTotalsApplied(
            SettlementTotalsApplied {
                dealer_id: cmd.dealer_id,
                paid_delta: cmd.paid_delta,
                allocated: cmd.allocated,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_delete(&self, cmd: &DeleteDealer) -> Result<Vec<DealerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("dealer {}", cmd.dealer_id)));
        }
        self.ensure_dealer_id(cmd.dealer_id)?;
        if self.status == DealerStatus::Deleted {
            return Err(DomainError::invalid_transition("dealer is already deleted"));
        }

        Ok(vec![DealerEvent::DealerDeleted(DealerDeleted {
            dealer_id: cmd.dealer_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
