use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;

use dealerdesk_core::{Aggregate, DomainError, Money};
use dealerdesk_events::{AuditSink, EventBus, EventEnvelope};
use dealerdesk_invoicing::{ApplyPayment, Invoice, InvoiceCommand, InvoiceDocId};
use dealerdesk_parties::{ApplySettlementTotals, Dealer, DealerCommand, DealerId};
use dealerdesk_sequence::{IdKind, Identifier, IdentifierAllocator};
use dealerdesk_settlement::{
    Allocation, CreditMemo, CreditMemoCommand, CreditMemoId, IssueMemo, Payment, PaymentCommand,
    PaymentDirection, PaymentId, PaymentInstrument, RecordPayment, RedeemMemo,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::services::{ServiceError, aggregate_types, audit_committed};

/// Payment intake and credit-memo settlement.
///
/// `create_payment` decides everything first against loaded state, then
/// commits the payment record, every invoice allocation, the memo redemption
/// and the dealer balance move as one batch. Any rejection leaves no partial
/// state behind.
pub struct SettlementService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    allocator: Arc<IdentifierAllocator>,
    audit: Arc<dyn AuditSink>,
    /// CRM code → memo stream, for code-based lookups at the counter.
    memo_codes: Mutex<HashMap<Identifier, CreditMemoId>>,
}

impl<S, B> SettlementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, allocator: Arc<IdentifierAllocator>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            allocator,
            audit,
            memo_codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue_credit_memo(
        &self,
        memo_id: CreditMemoId,
        dealer_id: DealerId,
        amount: Money,
        reason: &str,
    ) -> Result<Identifier, ServiceError> {
        let (dealer, _) = self
            .dispatcher
            .load(dealer_id.0, |id| Dealer::empty(DealerId::new(id)))?;
        if !dealer.can_transact() {
            return Err(ServiceError::Domain(DomainError::invalid_transition(
                format!("dealer {dealer_id} cannot receive a credit memo"),
            )));
        }

        let code = self.allocator.allocate(IdKind::CreditMemoId)?;
        let result = self.dispatcher.dispatch(
            memo_id.0,
            aggregate_types::CREDIT_MEMO,
            CreditMemoCommand::IssueMemo(IssueMemo {
                memo_id,
                code,
                dealer_id,
                amount,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            }),
            |id| CreditMemo::empty(CreditMemoId::new(id)),
        );

        match result {
            Ok(committed) => {
                if let Ok(mut codes) = self.memo_codes.lock() {
                    codes.insert(code, memo_id);
                }
                tracing::info!(memo = %memo_id, %code, dealer = %dealer_id, %amount, "credit memo issued");
                audit_committed(self.audit.as_ref(), &committed);
                Ok(code)
            }
            Err(err) => {
                // The CRM number goes back to the gap pool on failure.
                let _ = self.allocator.release(code);
                Err(err.into())
            }
        }
    }

    /// Read-only check used by the payment screen: the memo must exist, be
    /// pending, and belong to the paying dealer. Returns its amount.
    pub fn validate_credit_memo(
        &self,
        code: Identifier,
        dealer_id: DealerId,
    ) -> Result<Money, ServiceError> {
        let memo_id = self.resolve_memo(code)?;
        let (memo, _) = self
            .dispatcher
            .load(memo_id.0, |id| CreditMemo::empty(CreditMemoId::new(id)))?;
        memo.check_redeemable(dealer_id)?;
        Ok(memo.amount())
    }

    /// Record a payment and settle it across invoices.
    ///
    /// Step order: instrument validation, memo checks, allocation-sum bound,
    /// invoice applications, memo redemption, dealer balances. All checks run
    /// before anything is appended.
    pub fn create_payment(
        &self,
        payment_id: PaymentId,
        dealer_id: DealerId,
        total: Money,
        direction: PaymentDirection,
        instrument: PaymentInstrument,
        memo_code: Option<Identifier>,
        allocations: Vec<Allocation>,
    ) -> Result<(), ServiceError> {
        let (dealer, dealer_version) = self
            .dispatcher
            .load(dealer_id.0, |id| Dealer::empty(DealerId::new(id)))?;
        if !dealer.can_transact() {
            return Err(ServiceError::Domain(DomainError::invalid_transition(
                format!("dealer {dealer_id} cannot make payments"),
            )));
        }

        // Memo checks happen up front so an incomplete payment never gets as
        // far as touching invoices.
        let memo = match memo_code {
            Some(code) => {
                let memo_id = self.resolve_memo(code)?;
                let (memo, version) = self
                    .dispatcher
                    .load(memo_id.0, |id| CreditMemo::empty(CreditMemoId::new(id)))?;
                memo.check_redeemable(dealer_id)?;
                Some((memo, version))
            }
            None => None,
        };

        let (payment, payment_version) = self
            .dispatcher
            .load(payment_id.0, |id| Payment::empty(PaymentId::new(id)))?;
        let payment_events = payment.handle(&PaymentCommand::RecordPayment(RecordPayment {
            payment_id,
            dealer_id,
            total,
            direction,
            instrument,
            credit_memo: memo.as_ref().map(|(m, _)| m.id_typed()),
            allocations: allocations.clone(),
            occurred_at: Utc::now(),
        }))?;

        let mut batch = vec![CommandDispatcher::<S, B>::stage::<Payment>(
            payment_id.0,
            aggregate_types::PAYMENT,
            payment_version,
            &payment_events,
        )?];

        let mut allocated = Money::ZERO;
        for allocation in &allocations {
            let (invoice, version) = self.dispatcher.load(allocation.invoice_id.0, |id| {
                Invoice::empty(InvoiceDocId::new(id))
            })?;
            if invoice.dealer().map(|d| d.dealer_id) != Some(dealer_id) {
                return Err(ServiceError::Domain(DomainError::validation(format!(
                    "invoice {} belongs to another dealer",
                    allocation.invoice_id
                ))));
            }
            let events = invoice.handle(&InvoiceCommand::ApplyPayment(ApplyPayment {
                invoice_id: allocation.invoice_id,
                amount: allocation.amount,
                occurred_at: Utc::now(),
            }))?;
            batch.push(CommandDispatcher::<S, B>::stage::<Invoice>(
                allocation.invoice_id.0,
                aggregate_types::INVOICE,
                version,
                &events,
            )?);
            allocated = allocated.checked_add(allocation.amount)?;
        }

        if let Some((memo, version)) = &memo {
            let memo_id = memo.id_typed();
            let events = memo.handle(&CreditMemoCommand::RedeemMemo(RedeemMemo {
                memo_id,
                dealer_id,
                payment_id,
                occurred_at: Utc::now(),
            }))?;
            batch.push(CommandDispatcher::<S, B>::stage::<CreditMemo>(
                memo_id.0,
                aggregate_types::CREDIT_MEMO,
                *version,
                &events,
            )?);
        }

        let dealer_events = dealer.handle(&DealerCommand::ApplySettlementTotals(
            ApplySettlementTotals {
                dealer_id,
                paid_delta: total,
                allocated,
                occurred_at: Utc::now(),
            },
        ))?;
        batch.push(CommandDispatcher::<S, B>::stage::<Dealer>(
            dealer_id.0,
            aggregate_types::DEALER,
            dealer_version,
            &dealer_events,
        )?);

        let committed = self.dispatcher.commit(batch)?;

        tracing::info!(
            payment = %payment_id,
            dealer = %dealer_id,
            %total,
            %allocated,
            invoices = allocations.len(),
            "payment recorded"
        );
        audit_committed(self.audit.as_ref(), &committed);
        Ok(())
    }

    /// Load the current memo state (read-only).
    pub fn load_memo(&self, memo_id: CreditMemoId) -> Result<CreditMemo, ServiceError> {
        let (memo, _) = self
            .dispatcher
            .load(memo_id.0, |id| CreditMemo::empty(CreditMemoId::new(id)))?;
        Ok(memo)
    }

    fn resolve_memo(&self, code: Identifier) -> Result<CreditMemoId, ServiceError> {
        let codes = self
            .memo_codes
            .lock()
            .map_err(|_| DomainError::conflict("memo code index lock poisoned"))?;
        codes.get(&code).copied().ok_or_else(|| {
            ServiceError::Domain(DomainError::not_found(format!(
                "MemoNotFound: no credit memo with code {code}"
            )))
        })
    }
}
