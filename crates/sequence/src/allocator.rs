//! Gap-reusing sequence allocator.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use dealerdesk_core::{DomainError, DomainResult};

use crate::identifier::{IdKind, Identifier};

/// Bound on candidate attempts before giving up with `AllocationExhausted`.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 8;

#[derive(Debug, Default)]
struct KindState {
    /// Highest number issued so far; the next fresh candidate is `high + 1`.
    high: u32,
    /// Retired numbers eligible for reuse, smallest first.
    gaps: BTreeSet<u32>,
}

impl KindState {
    /// Take the next candidate: smallest gap before extending the sequence.
    fn take_candidate(&mut self) -> DomainResult<u32> {
        if let Some(&n) = self.gaps.iter().next() {
            self.gaps.remove(&n);
            return Ok(n);
        }
        self.high = self
            .high
            .checked_add(1)
            .ok_or_else(|| DomainError::conflict("sequence space exhausted"))?;
        Ok(self.high)
    }
}

/// Mints unique, sequential identifiers per [`IdKind`], reusing retired
/// numbers from a per-kind gap pool.
///
/// The whole find-and-increment runs under one mutex, so two simultaneous
/// callers can never receive the same identifier. When a caller-supplied
/// uniqueness check rejects candidates (numbers taken outside the allocator,
/// e.g. imported historical data), the allocator retries a bounded number of
/// times and then fails with an `AllocationExhausted` conflict — it never
/// silently loops.
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    state: Mutex<HashMap<IdKind, KindState>>,
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier of `kind`.
    pub fn allocate(&self, kind: IdKind) -> DomainResult<Identifier> {
        self.allocate_where(kind, |_| true)
    }

    /// Allocate the next identifier of `kind` that passes `available`.
    ///
    /// Candidates rejected by `available` are considered permanently taken:
    /// they are consumed from the gap pool / sequence and skipped.
    pub fn allocate_where(
        &self,
        kind: IdKind,
        available: impl Fn(&Identifier) -> bool,
    ) -> DomainResult<Identifier> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DomainError::conflict("allocator lock poisoned"))?;
        let kind_state = state.entry(kind).or_default();

        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let number = kind_state.take_candidate()?;
            let candidate = Identifier::new(kind, number)?;
            if available(&candidate) {
                return Ok(candidate);
            }
        }

        Err(DomainError::conflict(format!(
            "AllocationExhausted: no free {} identifier after {} attempts",
            kind.prefix(),
            MAX_ALLOCATION_ATTEMPTS
        )))
    }

    /// Return a previously issued identifier to its kind's gap pool.
    ///
    /// Called when the owning entity is deleted (retired SKUs). The number
    /// becomes the preferred candidate for the next allocation of that kind.
    pub fn release(&self, identifier: Identifier) -> DomainResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DomainError::conflict("allocator lock poisoned"))?;
        let kind_state = state.entry(identifier.kind()).or_default();

        if identifier.number() > kind_state.high {
            return Err(DomainError::validation(format!(
                "cannot release {identifier}: never issued"
            )));
        }
        if !kind_state.gaps.insert(identifier.number()) {
            return Err(DomainError::conflict(format!(
                "cannot release {identifier}: already in the gap pool"
            )));
        }
        Ok(())
    }

    /// Record an identifier issued outside this allocator (e.g. loaded from
    /// storage at startup) so the sequence continues past it.
    pub fn mark_issued(&self, identifier: Identifier) -> DomainResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DomainError::conflict("allocator lock poisoned"))?;
        let kind_state = state.entry(identifier.kind()).or_default();

        if identifier.number() > kind_state.high {
            // Numbers between the old high and the imported one become gaps.
            for n in (kind_state.high + 1)..identifier.number() {
                kind_state.gaps.insert(n);
            }
            kind_state.high = identifier.number();
        } else {
            kind_state.gaps.remove(&identifier.number());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn allocates_sequentially_per_kind() {
        let allocator = IdentifierAllocator::new();
        assert_eq!(allocator.allocate(IdKind::Sku).unwrap().to_string(), "SKU0001");
        assert_eq!(allocator.allocate(IdKind::Sku).unwrap().to_string(), "SKU0002");
        // Kinds have independent sequences.
        assert_eq!(
            allocator.allocate(IdKind::InvoiceNumber).unwrap().to_string(),
            "INV0001"
        );
    }

    #[test]
    fn released_numbers_are_reused_smallest_first() {
        let allocator = IdentifierAllocator::new();
        let ids: Vec<_> = (0..4)
            .map(|_| allocator.allocate(IdKind::Sku).unwrap())
            .collect();

        allocator.release(ids[2]).unwrap(); // SKU0003
        allocator.release(ids[0]).unwrap(); // SKU0001

        assert_eq!(allocator.allocate(IdKind::Sku).unwrap(), ids[0]);
        assert_eq!(allocator.allocate(IdKind::Sku).unwrap(), ids[2]);
        // Pool drained; back to extending the sequence.
        assert_eq!(allocator.allocate(IdKind::Sku).unwrap().to_string(), "SKU0005");
    }

    #[test]
    fn release_is_scoped_to_the_kind() {
        let allocator = IdentifierAllocator::new();
        let sku = allocator.allocate(IdKind::Sku).unwrap();
        allocator.release(sku).unwrap();

        // The SKU gap must not leak into the invoice sequence.
        assert_eq!(
            allocator.allocate(IdKind::InvoiceNumber).unwrap().to_string(),
            "INV0001"
        );
        assert_eq!(allocator.allocate(IdKind::Sku).unwrap(), sku);
    }

    #[test]
    fn releasing_unissued_or_pooled_number_fails() {
        let allocator = IdentifierAllocator::new();
        let id = allocator.allocate(IdKind::Sku).unwrap();

        let unissued = Identifier::new(IdKind::Sku, 99).unwrap();
        assert!(allocator.release(unissued).is_err());

        allocator.release(id).unwrap();
        assert!(allocator.release(id).is_err());
    }

    #[test]
    fn uniqueness_check_skips_taken_candidates() {
        let allocator = IdentifierAllocator::new();
        // SKU0001 and SKU0002 are taken by imported data.
        let taken: HashSet<String> = ["SKU0001", "SKU0002"]
            .into_iter()
            .map(String::from)
            .collect();

        let id = allocator
            .allocate_where(IdKind::Sku, |c| !taken.contains(&c.to_string()))
            .unwrap();
        assert_eq!(id.to_string(), "SKU0003");
    }

    #[test]
    fn exhausts_after_bounded_attempts() {
        let allocator = IdentifierAllocator::new();
        let err = allocator
            .allocate_where(IdKind::Sku, |_| false)
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("AllocationExhausted") => {}
            other => panic!("expected AllocationExhausted conflict, got {other:?}"),
        }
    }

    #[test]
    fn mark_issued_advances_sequence_and_records_gaps() {
        let allocator = IdentifierAllocator::new();
        allocator
            .mark_issued(Identifier::new(IdKind::PackingId, 3).unwrap())
            .unwrap();

        // 1 and 2 became gaps, 4 is the next fresh number.
        assert_eq!(allocator.allocate(IdKind::PackingId).unwrap().to_string(), "PKG0001");
        assert_eq!(allocator.allocate(IdKind::PackingId).unwrap().to_string(), "PKG0002");
        assert_eq!(allocator.allocate(IdKind::PackingId).unwrap().to_string(), "PKG0004");
    }

    proptest::proptest! {
        /// Whatever interleaving of allocate/release happens, two live
        /// identifiers never share a number.
        #[test]
        fn live_identifiers_stay_distinct(ops in proptest::collection::vec(0u8..3, 1..64)) {
            let allocator = IdentifierAllocator::new();
            let mut live: Vec<Identifier> = Vec::new();

            for op in ops {
                match op {
                    // allocate
                    0 | 1 => live.push(allocator.allocate(IdKind::Sku).unwrap()),
                    // release the oldest live id, if any
                    _ => {
                        if !live.is_empty() {
                            let id = live.remove(0);
                            allocator.release(id).unwrap();
                        }
                    }
                }

                let mut numbers: Vec<u32> = live.iter().map(|id| id.number()).collect();
                numbers.sort_unstable();
                numbers.dedup();
                proptest::prop_assert_eq!(numbers.len(), live.len());
            }
        }
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let allocator = Arc::new(IdentifierAllocator::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| allocator.allocate(IdKind::Sku).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in threads {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id.number()), "duplicate identifier {id}");
            }
        }

        // 400 distinct ids with no gaps other than pre-existing pool entries
        // (there were none), so they are exactly 1..=400.
        assert_eq!(seen.len(), 400);
        assert_eq!(seen.iter().copied().min(), Some(1));
        assert_eq!(seen.iter().copied().max(), Some(400));
    }
}
