use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use dealerdesk_core::{DomainError, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Credit,
    Debit,
}

/// How a payment was tendered. Each variant carries exactly the fields that
/// instrument needs, so a cheque without a number is unrepresentable at the
/// type level; emptiness of the carried strings is checked by `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentInstrument {
    Cash,
    CreditMemo,
    Online {
        txn_id: String,
        link: String,
    },
    Interac {
        sender_name: String,
        sender_email: String,
    },
    Finance {
        institution_name: String,
        finance_id: String,
    },
    Cheque {
        check_number: String,
        cheque_date: NaiveDate,
    },
    Card {
        kind: CardKind,
        card_number: String,
        card_holder_name: String,
        expiry: String,
    },
}

impl PaymentInstrument {
    /// Reject blank instrument fields before anything is recorded.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing: Option<&str> = match self {
            PaymentInstrument::Cash | PaymentInstrument::CreditMemo => None,
            PaymentInstrument::Online { txn_id, link } => {
                if txn_id.trim().is_empty() {
                    Some("txn_id")
                } else if link.trim().is_empty() {
                    Some("link")
                } else {
                    None
                }
            }
            PaymentInstrument::Interac {
                sender_name,
                sender_email,
            } => {
                if sender_name.trim().is_empty() {
                    Some("sender_name")
                } else if sender_email.trim().is_empty() {
                    Some("sender_email")
                } else {
                    None
                }
            }
            PaymentInstrument::Finance {
                institution_name,
                finance_id,
            } => {
                if institution_name.trim().is_empty() {
                    Some("institution_name")
                } else if finance_id.trim().is_empty() {
                    Some("finance_id")
                } else {
                    None
                }
            }
            PaymentInstrument::Cheque { check_number, .. } => {
                if check_number.trim().is_empty() {
                    Some("check_number")
                } else {
                    None
                }
            }
            PaymentInstrument::Card {
                card_number,
                card_holder_name,
                expiry,
                ..
            } => {
                if card_number.trim().is_empty() {
                    Some("card_number")
                } else if card_holder_name.trim().is_empty() {
                    Some("card_holder_name")
                } else if expiry.trim().is_empty() {
                    Some("expiry")
                } else {
                    None
                }
            }
        };

        match missing {
            Some(field) => Err(DomainError::validation(format!(
                "IncompletePaymentDetails: {field} is required for {}",
                self.method_name()
            ))),
            None => Ok(()),
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            PaymentInstrument::Cash => "cash",
            PaymentInstrument::CreditMemo => "credit_memo",
            PaymentInstrument::Online { .. } => "online",
            PaymentInstrument::Interac { .. } => "interac",
            PaymentInstrument::Finance { .. } => "finance",
            PaymentInstrument::Cheque { .. } => "cheque",
            PaymentInstrument::Card { .. } => "card",
        }
    }
}

impl ValueObject for PaymentInstrument {}
