use serde::{Deserialize, Serialize};

use dealerdesk_core::{AggregateId, Entity};
use dealerdesk_pricing::TaxRates;

/// Tax slab identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxSlabId(pub AggregateId);

impl TaxSlabId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TaxSlabId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Tax slab status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxSlabStatus {
    Active,
    Retired,
}

/// A named bundle of jurisdictional tax rates.
///
/// Documents never reference a slab live: invoicing snapshots `rates()` by
/// value at creation, so retiring or re-rating a slab leaves settled
/// documents untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSlab {
    id: TaxSlabId,
    name: String,
    rates: TaxRates,
    status: TaxSlabStatus,
}

impl TaxSlab {
    pub fn new(id: TaxSlabId, name: impl Into<String>, rates: TaxRates) -> Self {
        Self {
            id,
            name: name.into(),
            rates,
            status: TaxSlabStatus::Active,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rates(&self) -> TaxRates {
        self.rates
    }

    pub fn status(&self) -> TaxSlabStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TaxSlabStatus::Active
    }

    /// Retired slabs cannot be attached to new dealers or documents.
    pub fn retire(&mut self) {
        self.status = TaxSlabStatus::Retired;
    }
}

impl Entity for TaxSlab {
    type Id = TaxSlabId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
