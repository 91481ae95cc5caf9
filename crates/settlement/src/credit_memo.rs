use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use dealerdesk_events::Event;
use dealerdesk_parties::DealerId;
use dealerdesk_sequence::Identifier;

use crate::payment::PaymentId;

/// Credit memo identifier (the stream id, not the CRM code).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreditMemoId(pub AggregateId);

impl CreditMemoId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CreditMemoId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One-way: a memo redeems exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditMemoStatus {
    Pending,
    Redeemed,
}

/// Aggregate root: CreditMemo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditMemo {
    id: CreditMemoId,
    code: Option<Identifier>,
    dealer_id: Option<DealerId>,
    amount: Money,
    reason: String,
    status: CreditMemoStatus,
    redeemed_by: Option<PaymentId>,
    version: u64,
    created: bool,
}

impl CreditMemo {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CreditMemoId) -> Self {
        Self {
            id,
            code: None,
            dealer_id: None,
            amount: Money::ZERO,
            reason: String::new(),
            status: CreditMemoStatus::Pending,
            redeemed_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CreditMemoId {
        self.id
    }

    pub fn code(&self) -> Option<Identifier> {
        self.code
    }

    pub fn dealer_id(&self) -> Option<DealerId> {
        self.dealer_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn status(&self) -> CreditMemoStatus {
        self.status
    }

    pub fn redeemed_by(&self) -> Option<PaymentId> {
        self.redeemed_by
    }

    /// Read-only redemption check: Pending and owned by the given dealer.
    pub fn check_redeemable(&self, dealer_id: DealerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!(
                "MemoNotFound: credit memo {}",
                self.id
            )));
        }
        if self.status == CreditMemoStatus::Redeemed {
            return Err(DomainError::conflict(format!(
                "MemoAlreadyRedeemed: credit memo {} was redeemed",
                self.id
            )));
        }
        if self.dealer_id != Some(dealer_id) {
            return Err(DomainError::conflict(format!(
                "MemoDealerMismatch: credit memo {} belongs to another dealer",
                self.id
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for CreditMemo {
    type Id = CreditMemoId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueMemo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMemo {
    pub memo_id: CreditMemoId,
    /// CRM-prefixed identifier from the allocator.
    pub code: Identifier,
    pub dealer_id: DealerId,
    pub amount: Money,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RedeemMemo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemMemo {
    pub memo_id: CreditMemoId,
    /// Dealer making the payment; must own the memo.
    pub dealer_id: DealerId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditMemoCommand {
    IssueMemo(IssueMemo),
    RedeemMemo(RedeemMemo),
}

/// Event: MemoIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoIssued {
    pub memo_id: CreditMemoId,
    pub code: Identifier,
    pub dealer_id: DealerId,
    pub amount: Money,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemoRedeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoRedeemed {
    pub memo_id: CreditMemoId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditMemoEvent {
    MemoIssued(MemoIssued),
    MemoRedeemed(MemoRedeemed),
}

impl Event for CreditMemoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CreditMemoEvent::MemoIssued(_) => "settlement.credit_memo.issued",
            CreditMemoEvent::MemoRedeemed(_) => "settlement.credit_memo.redeemed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CreditMemoEvent::MemoIssued(e) => e.occurred_at,
            CreditMemoEvent::MemoRedeemed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CreditMemo {
    type Command = CreditMemoCommand;
    type Event = CreditMemoEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CreditMemoEvent::MemoIssued(e) => {
                self.id = e.memo_id;
                self.code = Some(e.code);
                self.dealer_id = Some(e.dealer_id);
                self.amount = e.amount;
                self.reason = e.reason.clone();
                self.status = CreditMemoStatus::Pending;
                self.created = true;
            }
            CreditMemoEvent::MemoRedeemed(e) => {
                self.status = CreditMemoStatus::Redeemed;
                self.redeemed_by = Some(e.payment_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CreditMemoCommand::IssueMemo(cmd) => self.handle_issue(cmd),
            CreditMemoCommand::RedeemMemo(cmd) => self.handle_redeem(cmd),
        }
    }
}

impl CreditMemo {
    fn handle_issue(&self, cmd: &IssueMemo) -> Result<Vec<CreditMemoEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("credit memo already exists"));
        }
        if cmd.amount.cents() <= 0 {
            return Err(DomainError::validation("memo amount must be positive"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("memo reason cannot be empty"));
        }

        Ok(vec![CreditMemoEvent::MemoIssued(MemoIssued {
            memo_id: cmd.memo_id,
            code: cmd.code,
            dealer_id: cmd.dealer_id,
            amount: cmd.amount,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_redeem(&self, cmd: &RedeemMemo) -> Result<Vec<CreditMemoEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!(
                "MemoNotFound: credit memo {}",
                cmd.memo_id
            )));
        }
        if self.id != cmd.memo_id {
            return Err(DomainError::validation("memo_id mismatch"));
        }
        self.check_redeemable(cmd.dealer_id)?;

        Ok(vec![CreditMemoEvent::MemoRedeemed(MemoRedeemed {
            memo_id: cmd.memo_id,
            payment_id: cmd.payment_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerdesk_events::execute;
    use dealerdesk_sequence::IdKind;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn crm(n: u32) -> Identifier {
        Identifier::new(IdKind::CreditMemoId, n).unwrap()
    }

    fn issued_memo(dealer_id: DealerId) -> (CreditMemo, CreditMemoId) {
        let memo_id = CreditMemoId::new(AggregateId::new());
        let mut memo = CreditMemo::empty(memo_id);
        execute(
            &mut memo,
            &CreditMemoCommand::IssueMemo(IssueMemo {
                memo_id,
                code: crm(17),
                dealer_id,
                amount: Money::from_cents(2500),
                reason: "returned cracked blank".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (memo, memo_id)
    }

    #[test]
    fn a_memo_redeems_exactly_once() {
        let dealer_id = DealerId::new(AggregateId::new());
        let (mut memo, memo_id) = issued_memo(dealer_id);
        let payment_id = PaymentId::new(AggregateId::new());

        execute(
            &mut memo,
            &CreditMemoCommand::RedeemMemo(RedeemMemo {
                memo_id,
                dealer_id,
                payment_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(memo.status(), CreditMemoStatus::Redeemed);
        assert_eq!(memo.redeemed_by(), Some(payment_id));

        let err = memo
            .handle(&CreditMemoCommand::RedeemMemo(RedeemMemo {
                memo_id,
                dealer_id,
                payment_id: PaymentId::new(AggregateId::new()),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("MemoAlreadyRedeemed") => {}
            other => panic!("expected MemoAlreadyRedeemed conflict, got {other:?}"),
        }
    }

    #[test]
    fn another_dealers_memo_is_rejected() {
        let owner = DealerId::new(AggregateId::new());
        let (memo, memo_id) = issued_memo(owner);
        let stranger = DealerId::new(AggregateId::new());

        let err = memo
            .handle(&CreditMemoCommand::RedeemMemo(RedeemMemo {
                memo_id,
                dealer_id: stranger,
                payment_id: PaymentId::new(AggregateId::new()),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("MemoDealerMismatch") => {}
            other => panic!("expected MemoDealerMismatch conflict, got {other:?}"),
        }
    }

    #[test]
    fn unissued_memo_is_not_found() {
        let memo = CreditMemo::empty(CreditMemoId::new(AggregateId::new()));
        let err = memo
            .check_redeemable(DealerId::new(AggregateId::new()))
            .unwrap_err();
        match err {
            DomainError::NotFound(msg) if msg.contains("MemoNotFound") => {}
            other => panic!("expected MemoNotFound, got {other:?}"),
        }
    }

    #[test]
    fn issue_validates_amount_and_reason() {
        let memo_id = CreditMemoId::new(AggregateId::new());
        let memo = CreditMemo::empty(memo_id);
        let err = memo
            .handle(&CreditMemoCommand::IssueMemo(IssueMemo {
                memo_id,
                code: crm(18),
                dealer_id: DealerId::new(AggregateId::new()),
                amount: Money::ZERO,
                reason: "goodwill".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
