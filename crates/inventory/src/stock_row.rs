use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, LocationId, ProductId};
use dealerdesk_events::Event;
use dealerdesk_sequence::Identifier;

/// Stock row identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRowId(pub AggregateId);

impl StockRowId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockRowId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The natural key of a row: one product variant at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub child_sku: Identifier,
    pub location_id: LocationId,
}

/// Availability bands, derived on read from `quantity - booked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    VeryLowStock,
    OutOfStock,
}

/// Cutoffs for the derived status. `very_low` must not exceed `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub low: i64,
    pub very_low: i64,
}

impl StockThresholds {
    pub fn new(low: i64, very_low: i64) -> Result<Self, DomainError> {
        if low < 0 || very_low < 0 || very_low > low {
            return Err(DomainError::validation(
                "thresholds must satisfy 0 <= very_low <= low",
            ));
        }
        Ok(Self { low, very_low })
    }

    pub fn classify(&self, available: i64) -> StockStatus {
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= self.very_low {
            StockStatus::VeryLowStock
        } else if available <= self.low {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Aggregate root: one inventory row.
///
/// Invariant held across every event: `0 <= booked <= quantity` and
/// `damaged >= 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRow {
    id: StockRowId,
    key: Option<StockKey>,
    quantity: i64,
    booked: i64,
    damaged: i64,
    version: u64,
    created: bool,
}

impl StockRow {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockRowId) -> Self {
        Self {
            id,
            key: None,
            quantity: 0,
            booked: 0,
            damaged: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockRowId {
        self.id
    }

    pub fn key(&self) -> Option<StockKey> {
        self.key
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn booked(&self) -> i64 {
        self.booked
    }

    pub fn damaged(&self) -> i64 {
        self.damaged
    }

    /// On-hand minus booked; what a new order can still claim.
    pub fn available(&self) -> i64 {
        self.quantity - self.booked
    }

    /// Derived on read; never persisted.
    pub fn status(&self, thresholds: StockThresholds) -> StockStatus {
        thresholds.classify(self.available())
    }
}

impl AggregateRoot for StockRow {
    type Id = StockRowId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveStock. The first receipt for a key opens the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub row_id: StockRowId,
    pub key: StockKey,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BookStock (reserve against an order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStock {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseBooking (cancellation or rejection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseBooking {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfillShipment (goods leave the building).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillShipment {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDamage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDamage {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub comment: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockRowCommand {
    ReceiveStock(ReceiveStock),
    BookStock(BookStock),
    ReleaseBooking(ReleaseBooking),
    FulfillShipment(FulfillShipment),
    RecordDamage(RecordDamage),
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub row_id: StockRowId,
    pub key: StockKey,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockBooked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBooked {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BookingReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReleased {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentFulfilled {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DamageRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRecorded {
    pub row_id: StockRowId,
    pub quantity: i64,
    pub comment: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockRowEvent {
    StockReceived(StockReceived),
    StockBooked(StockBooked),
    BookingReleased(BookingReleased),
    ShipmentFulfilled(ShipmentFulfilled),
    DamageRecorded(DamageRecorded),
}

impl Event for StockRowEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockRowEvent::StockReceived(_) => "inventory.stock_row.received",
            StockRowEvent::StockBooked(_) => "inventory.stock_row.booked",
            StockRowEvent::BookingReleased(_) => "inventory.stock_row.booking_released",
            StockRowEvent::ShipmentFulfilled(_) => "inventory.stock_row.shipment_fulfilled",
            StockRowEvent::DamageRecorded(_) => "inventory.stock_row.damage_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockRowEvent::StockReceived(e) => e.occurred_at,
            StockRowEvent::StockBooked(e) => e.occurred_at,
            StockRowEvent::BookingReleased(e) => e.occurred_at,
            StockRowEvent::ShipmentFulfilled(e) => e.occurred_at,
            StockRowEvent::DamageRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockRow {
    type Command = StockRowCommand;
    type Event = StockRowEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockRowEvent::StockReceived(e) => {
                self.id = e.row_id;
                if self.key.is_none() {
                    self.key = Some(e.key);
                }
                self.quantity += e.quantity;
                self.created = true;
            }
            StockRowEvent::StockBooked(e) => {
                self.booked += e.quantity;
            }
            StockRowEvent::BookingReleased(e) => {
                self.booked -= e.quantity;
            }
            StockRowEvent::ShipmentFulfilled(e) => {
                self.quantity -= e.quantity;
                self.booked -= e.quantity;
            }
            StockRowEvent::DamageRecorded(e) => {
                self.quantity -= e.quantity;
                self.damaged += e.quantity;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockRowCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            StockRowCommand::BookStock(cmd) => self.handle_book(cmd),
            StockRowCommand::ReleaseBooking(cmd) => self.handle_release(cmd),
            StockRowCommand::FulfillShipment(cmd) => self.handle_fulfill(cmd),
            StockRowCommand::RecordDamage(cmd) => self.handle_damage(cmd),
        }
    }
}

impl StockRow {
    fn ensure_exists(&self, row_id: StockRowId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("stock row {row_id}")));
        }
        if self.id != row_id {
            return Err(DomainError::validation("row_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StockRowEvent>, DomainError> {
        Self::ensure_positive(cmd.quantity)?;
        if self.created {
            if self.id != cmd.row_id {
                return Err(DomainError::validation("row_id mismatch"));
            }
            if self.key != Some(cmd.key) {
                return Err(DomainError::validation(
                    "receipt key does not match the row key",
                ));
            }
        }

        Ok(vec![StockRowEvent::StockReceived(StockReceived {
            row_id: cmd.row_id,
            key: cmd.key,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_book(&self, cmd: &BookStock) -> Result<Vec<StockRowEvent>, DomainError> {
        self.ensure_exists(cmd.row_id)?;
        Self::ensure_positive(cmd.quantity)?;

        // Check and reserve are one decision; the store serializes appends.
        if self.available() < cmd.quantity {
            return Err(DomainError::conflict(format!(
                "InsufficientStock: {} available on row {}, {} requested",
                self.available(),
                cmd.row_id,
                cmd.quantity
            )));
        }

        Ok(vec![StockRowEvent::StockBooked(StockBooked {
            row_id: cmd.row_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseBooking) -> Result<Vec<StockRowEvent>, DomainError> {
        self.ensure_exists(cmd.row_id)?;
        Self::ensure_positive(cmd.quantity)?;

        if cmd.quantity > self.booked {
            return Err(DomainError::validation(format!(
                "cannot release {} from {} booked on row {}",
                cmd.quantity, self.booked, cmd.row_id
            )));
        }

        Ok(vec![StockRowEvent::BookingReleased(BookingReleased {
            row_id: cmd.row_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfill(&self, cmd: &FulfillShipment) -> Result<Vec<StockRowEvent>, DomainError> {
        self.ensure_exists(cmd.row_id)?;
        Self::ensure_positive(cmd.quantity)?;

        // A shipment consumes its own booking, so both counters move.
        if cmd.quantity > self.booked {
            return Err(DomainError::validation(format!(
                "shipment of {} exceeds the {} booked on row {}",
                cmd.quantity, self.booked, cmd.row_id
            )));
        }

        Ok(vec![StockRowEvent::ShipmentFulfilled(ShipmentFulfilled {
            row_id: cmd.row_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_damage(&self, cmd: &RecordDamage) -> Result<Vec<StockRowEvent>, DomainError> {
        self.ensure_exists(cmd.row_id)?;
        Self::ensure_positive(cmd.quantity)?;
        if cmd.comment.trim().is_empty() {
            return Err(DomainError::validation("damage comment cannot be empty"));
        }

        // Damaged goods come out of unbooked stock; reservations stay whole.
        if cmd.quantity > self.available() {
            return Err(DomainError::conflict(format!(
                "InsufficientStock: {} available on row {}, {} damaged",
                self.available(),
                cmd.row_id,
                cmd.quantity
            )));
        }

        Ok(vec![StockRowEvent::DamageRecorded(DamageRecorded {
            row_id: cmd.row_id,
            quantity: cmd.quantity,
            comment: cmd.comment.clone(),
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

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_key() -> StockKey {
        StockKey {
            product_id: ProductId::new(),
            child_sku: Identifier::new(IdKind::Sku, 7).unwrap(),
            location_id: LocationId::new(),
        }
    }

    fn stocked_row(quantity: i64) -> (StockRow, StockRowId) {
        let row_id = StockRowId::new(AggregateId::new());
        let mut row = StockRow::empty(row_id);
        execute(
            &mut row,
            &StockRowCommand::ReceiveStock(ReceiveStock {
                row_id,
                key: test_key(),
                quantity,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (row, row_id)
    }

    fn book(row: &mut StockRow, row_id: StockRowId, quantity: i64) -> Result<(), DomainError> {
        execute(
            row,
            &StockRowCommand::BookStock(BookStock {
                row_id,
                quantity,
                occurred_at: test_time(),
            }),
        )
        .map(|_| ())
    }

    #[test]
    fn booking_is_bounded_by_availability() {
        let (mut row, row_id) = stocked_row(10);
        book(&mut row, row_id, 7).unwrap();
        assert_eq!(row.available(), 3);

        let err = book(&mut row, row_id, 4).unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("InsufficientStock") => {}
            other => panic!("expected InsufficientStock conflict, got {other:?}"),
        }
        assert_eq!(row.booked(), 7);
    }

    #[test]
    fn release_reverses_a_booking() {
        let (mut row, row_id) = stocked_row(10);
        book(&mut row, row_id, 6).unwrap();
        execute(
            &mut row,
            &StockRowCommand::ReleaseBooking(ReleaseBooking {
                row_id,
                quantity: 6,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(row.booked(), 0);
        assert_eq!(row.available(), 10);
    }

    #[test]
    fn fulfillment_moves_quantity_and_booked_together() {
        let (mut row, row_id) = stocked_row(10);
        book(&mut row, row_id, 4).unwrap();
        execute(
            &mut row,
            &StockRowCommand::FulfillShipment(FulfillShipment {
                row_id,
                quantity: 4,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(row.quantity(), 6);
        assert_eq!(row.booked(), 0);
        assert_eq!(row.available(), 6);
    }

    #[test]
    fn fulfillment_cannot_outrun_the_booking() {
        let (mut row, row_id) = stocked_row(10);
        book(&mut row, row_id, 2).unwrap();
        let err = row
            .handle(&StockRowCommand::FulfillShipment(FulfillShipment {
                row_id,
                quantity: 3,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn damage_shrinks_quantity_and_grows_damaged() {
        let (mut row, row_id) = stocked_row(10);
        execute(
            &mut row,
            &StockRowCommand::RecordDamage(RecordDamage {
                row_id,
                quantity: 3,
                comment: "forklift tine through the crate".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(row.quantity(), 7);
        assert_eq!(row.damaged(), 3);
    }

    #[test]
    fn damage_never_eats_into_bookings() {
        let (mut row, row_id) = stocked_row(10);
        book(&mut row, row_id, 8).unwrap();
        let err = row
            .handle(&StockRowCommand::RecordDamage(RecordDamage {
                row_id,
                quantity: 3,
                comment: "water damage".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn status_is_derived_from_availability() {
        let thresholds = StockThresholds::new(5, 2).unwrap();
        let (mut row, row_id) = stocked_row(10);
        assert_eq!(row.status(thresholds), StockStatus::InStock);

        book(&mut row, row_id, 6).unwrap();
        assert_eq!(row.status(thresholds), StockStatus::LowStock);

        book(&mut row, row_id, 3).unwrap();
        assert_eq!(row.status(thresholds), StockStatus::VeryLowStock);

        book(&mut row, row_id, 1).unwrap();
        assert_eq!(row.status(thresholds), StockStatus::OutOfStock);
    }

    #[test]
    fn later_receipts_must_match_the_row_key() {
        let (row, row_id) = stocked_row(5);
        let err = row
            .handle(&StockRowCommand::ReceiveStock(ReceiveStock {
                row_id,
                key: test_key(),
                quantity: 5,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        // Whatever mix of accepted and rejected commands runs, the row
        // invariant 0 <= booked <= quantity holds and damaged never drops.
        #[test]
        fn row_invariant_survives_random_command_streams(
            ops in proptest::collection::vec((0u8..4, 1i64..20), 1..40),
        ) {
            let (mut row, row_id) = stocked_row(50);

            for (op, quantity) in ops {
                let cmd = match op {
                    0 => StockRowCommand::BookStock(BookStock {
                        row_id,
                        quantity,
                        occurred_at: test_time(),
                    }),
                    1 => StockRowCommand::ReleaseBooking(ReleaseBooking {
                        row_id,
                        quantity,
                        occurred_at: test_time(),
                    }),
                    2 => StockRowCommand::FulfillShipment(FulfillShipment {
                        row_id,
                        quantity,
                        occurred_at: test_time(),
                    }),
                    _ => StockRowCommand::RecordDamage(RecordDamage {
                        row_id,
                        quantity,
                        comment: "spot check".to_string(),
                        occurred_at: test_time(),
                    }),
                };
                let _ = execute(&mut row, &cmd);

                prop_assert!(row.booked() >= 0);
                prop_assert!(row.booked() <= row.quantity());
                prop_assert!(row.damaged() >= 0);
            }
        }
    }
}
