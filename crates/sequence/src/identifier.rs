use core::str::FromStr;
use serde::{Deserialize, Serialize};

use dealerdesk_core::{DomainError, DomainResult, ValueObject};

/// The kinds of human-readable identifiers the back office mints.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Sku,
    InvoiceNumber,
    PackingId,
    CreditMemoId,
}

impl IdKind {
    /// Fixed alphabetic prefix for this kind.
    pub const fn prefix(&self) -> &'static str {
        match self {
            IdKind::Sku => "SKU",
            IdKind::InvoiceNumber => "INV",
            IdKind::PackingId => "PKG",
            IdKind::CreditMemoId => "CRM",
        }
    }

    pub const ALL: [IdKind; 4] = [
        IdKind::Sku,
        IdKind::InvoiceNumber,
        IdKind::PackingId,
        IdKind::CreditMemoId,
    ];
}

/// Minimum width of the numeric suffix; larger numbers print unpadded.
const SUFFIX_WIDTH: usize = 4;

/// A minted identifier: kind + sequence number, rendered as `SKU0001`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    kind: IdKind,
    number: u32,
}

impl Identifier {
    /// Construct from parts. Numbers start at 1; 0 is never issued.
    pub fn new(kind: IdKind, number: u32) -> DomainResult<Self> {
        if number == 0 {
            return Err(DomainError::invalid_id(format!(
                "{} sequence numbers start at 1",
                kind.prefix()
            )));
        }
        Ok(Self { kind, number })
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn number(&self) -> u32 {
        self.number
    }
}

impl core::fmt::Display for Identifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{:0width$}", self.kind.prefix(), self.number, width = SUFFIX_WIDTH)
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = IdKind::ALL
            .into_iter()
            .find(|k| s.starts_with(k.prefix()))
            .ok_or_else(|| DomainError::invalid_id(format!("unknown identifier prefix: {s}")))?;

        let digits = &s[kind.prefix().len()..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::invalid_id(format!(
                "identifier suffix must be numeric: {s}"
            )));
        }

        let number: u32 = digits
            .parse()
            .map_err(|_| DomainError::invalid_id(format!("identifier suffix out of range: {s}")))?;

        Identifier::new(kind, number)
    }
}

impl ValueObject for Identifier {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_zero_padded_suffix() {
        let id = Identifier::new(IdKind::Sku, 7).unwrap();
        assert_eq!(id.to_string(), "SKU0007");

        let wide = Identifier::new(IdKind::InvoiceNumber, 123_456).unwrap();
        assert_eq!(wide.to_string(), "INV123456");
    }

    #[test]
    fn parses_each_kind_back() {
        for kind in IdKind::ALL {
            let id = Identifier::new(kind, 42).unwrap();
            let parsed: Identifier = id.to_string().parse().unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn rejects_zero_unknown_prefix_and_garbage() {
        assert!(Identifier::new(IdKind::Sku, 0).is_err());
        assert!("XYZ0001".parse::<Identifier>().is_err());
        assert!("SKU00a1".parse::<Identifier>().is_err());
        assert!("SKU".parse::<Identifier>().is_err());
    }
}
