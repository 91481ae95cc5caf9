//! `dealerdesk-settlement` — payments and credit memos.
//!
//! A payment is immutable once recorded: instrument details, direction and
//! invoice allocations are captured in a single event and never amended.
//! Credit memos move Pending → Redeemed exactly once, linking the redeeming
//! payment. The cross-aggregate settlement flow (allocations through the
//! invoice ledger, memo redemption, dealer balances) lives in
//! `dealerdesk-infra`.

pub mod credit_memo;
pub mod instrument;
pub mod payment;

pub use credit_memo::{
    CreditMemo, CreditMemoCommand, CreditMemoEvent, CreditMemoId, CreditMemoStatus, IssueMemo,
    RedeemMemo,
};
pub use instrument::{CardKind, PaymentInstrument};
pub use payment::{
    Allocation, Payment, PaymentCommand, PaymentDirection, PaymentEvent, PaymentId, RecordPayment,
};
