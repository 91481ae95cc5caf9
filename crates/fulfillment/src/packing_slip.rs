use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dealerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use dealerdesk_events::Event;
use dealerdesk_sales::OrderId;
use dealerdesk_sequence::Identifier;

/// Packing slip identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackingSlipId(pub AggregateId);

impl PackingSlipId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PackingSlipId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One-way lifecycle: Draft → Finalized → Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackingPhase {
    Draft,
    Finalized,
    Completed,
}

/// A line to pack: snapshotted from the order at draft time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingLine {
    pub line_no: u32,
    pub child_sku: Identifier,
    pub quantity: i64,
    pub description: String,
    pub checked: bool,
}

/// Line input before line numbers are assigned; `checked` starts false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPackingLine {
    pub child_sku: Identifier,
    pub quantity: i64,
    pub description: String,
}

/// Aggregate root: PackingSlip.
///
/// Dealer name, PO and lines are copies taken when the draft opens; the slip
/// never re-reads the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingSlip {
    id: PackingSlipId,
    packing_id: Option<Identifier>,
    order_id: Option<OrderId>,
    dealer_name: String,
    po_number: String,
    lines: Vec<PackingLine>,
    phase: PackingPhase,
    signature: Option<String>,
    version: u64,
    created: bool,
}

impl PackingSlip {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PackingSlipId) -> Self {
        Self {
            id,
            packing_id: None,
            order_id: None,
            dealer_name: String::new(),
            po_number: String::new(),
            lines: Vec::new(),
            phase: PackingPhase::Draft,
            signature: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PackingSlipId {
        self.id
    }

    pub fn packing_id(&self) -> Option<Identifier> {
        self.packing_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn dealer_name(&self) -> &str {
        &self.dealer_name
    }

    pub fn po_number(&self) -> &str {
        &self.po_number
    }

    pub fn lines(&self) -> &[PackingLine] {
        &self.lines
    }

    pub fn phase(&self) -> PackingPhase {
        self.phase
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// True while at least one line remains unchecked.
    pub fn has_unchecked_lines(&self) -> bool {
        self.lines.iter().any(|l| !l.checked)
    }
}

impl AggregateRoot for PackingSlip {
    type Id = PackingSlipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDraft {
    pub slip_id: PackingSlipId,
    /// PKG-prefixed identifier from the allocator.
    pub packing_id: Identifier,
    pub order_id: OrderId,
    pub dealer_name: String,
    pub po_number: String,
    pub lines: Vec<NewPackingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinalizeSlip (Draft → Finalized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeSlip {
    pub slip_id: PackingSlipId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ScanLine (idempotent per SKU).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLine {
    pub slip_id: PackingSlipId,
    pub sku: Identifier,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteSlip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSlip {
    pub slip_id: PackingSlipId,
    pub signature: String,
    /// Must be set when unchecked lines remain; acknowledges a short shipment.
    pub confirm_partial: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackingSlipCommand {
    OpenDraft(OpenDraft),
    FinalizeSlip(FinalizeSlip),
    ScanLine(ScanLine),
    CompleteSlip(CompleteSlip),
}

/// Event: DraftOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOpened {
    pub slip_id: PackingSlipId,
    pub packing_id: Identifier,
    pub order_id: OrderId,
    pub dealer_name: String,
    pub po_number: String,
    pub lines: Vec<PackingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlipFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlipFinalized {
    pub slip_id: PackingSlipId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineChecked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChecked {
    pub slip_id: PackingSlipId,
    pub sku: Identifier,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlipCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlipCompleted {
    pub slip_id: PackingSlipId,
    pub signature: String,
    /// True when the slip closed with unchecked lines remaining.
    pub partial: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackingSlipEvent {
    DraftOpened(DraftOpened),
    SlipFinalized(SlipFinalized),
    LineChecked(LineChecked),
    SlipCompleted(SlipCompleted),
}

impl Event for PackingSlipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PackingSlipEvent::DraftOpened(_) => "fulfillment.packing_slip.draft_opened",
            PackingSlipEvent::SlipFinalized(_) => "fulfillment.packing_slip.finalized",
            PackingSlipEvent::LineChecked(_) => "fulfillment.packing_slip.line_checked",
            PackingSlipEvent::SlipCompleted(_) => "fulfillment.packing_slip.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PackingSlipEvent::DraftOpened(e) => e.occurred_at,
            PackingSlipEvent::SlipFinalized(e) => e.occurred_at,
            PackingSlipEvent::LineChecked(e) => e.occurred_at,
            PackingSlipEvent::SlipCompleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PackingSlip {
    type Command = PackingSlipCommand;
    type Event = PackingSlipEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PackingSlipEvent::DraftOpened(e) => {
                self.id = e.slip_id;
                self.packing_id = Some(e.packing_id);
                self.order_id = Some(e.order_id);
                self.dealer_name = e.dealer_name.clone();
                self.po_number = e.po_number.clone();
                self.lines = e.lines.clone();
                self.phase = PackingPhase::Draft;
                self.created = true;
            }
            PackingSlipEvent::SlipFinalized(_) => {
                self.phase = PackingPhase::Finalized;
            }
            PackingSlipEvent::LineChecked(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.child_sku == e.sku) {
                    line.checked = true;
                }
            }
            PackingSlipEvent::SlipCompleted(e) => {
                self.phase = PackingPhase::Completed;
                self.signature = Some(e.signature.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PackingSlipCommand::OpenDraft(cmd) => self.handle_open_draft(cmd),
            PackingSlipCommand::FinalizeSlip(cmd) => self.handle_finalize(cmd),
            PackingSlipCommand::ScanLine(cmd) => self.handle_scan(cmd),
            PackingSlipCommand::CompleteSlip(cmd) => self.handle_complete(cmd),
        }
    }
}

impl PackingSlip {
    fn ensure_exists(&self, slip_id: PackingSlipId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("packing slip {slip_id}")));
        }
        if self.id != slip_id {
            return Err(DomainError::validation("slip_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, slip_id: PackingSlipId) -> Result<(), DomainError> {
        if self.phase == PackingPhase::Completed {
            return Err(DomainError::invalid_transition(format!(
                "packing slip {slip_id} is completed"
            )));
        }
        Ok(())
    }

    fn handle_open_draft(&self, cmd: &OpenDraft) -> Result<Vec<PackingSlipEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("packing slip already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "a packing slip needs at least one line",
            ));
        }
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be positive",
                    idx + 1
                )));
            }
        }

        let lines = cmd
            .lines
            .iter()
            .enumerate()
            .map(|(idx, l)| PackingLine {
                line_no: (idx as u32) + 1,
                child_sku: l.child_sku,
                quantity: l.quantity,
                description: l.description.clone(),
                checked: false,
            })
            .collect();

        Ok(vec![PackingSlipEvent::DraftOpened(DraftOpened {
            slip_id: cmd.slip_id,
            packing_id: cmd.packing_id,
            order_id: cmd.order_id,
            dealer_name: cmd.dealer_name.clone(),
            po_number: cmd.po_number.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_finalize(&self, cmd: &FinalizeSlip) -> Result<Vec<PackingSlipEvent>, DomainError> {
        self.ensure_exists(cmd.slip_id)?;

        if self.phase != PackingPhase::Draft {
            return Err(DomainError::invalid_transition(format!(
                "packing slip {} is {:?}, only drafts finalize",
                cmd.slip_id, self.phase
            )));
        }

        Ok(vec![PackingSlipEvent::SlipFinalized(SlipFinalized {
            slip_id: cmd.slip_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_scan(&self, cmd: &ScanLine) -> Result<Vec<PackingSlipEvent>, DomainError> {
        self.ensure_exists(cmd.slip_id)?;
        self.ensure_open(cmd.slip_id)?;

        let line = self
            .lines
            .iter()
            .find(|l| l.child_sku == cmd.sku)
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "UnknownSku: {} is not on packing slip {}",
                    cmd.sku, cmd.slip_id
                ))
            })?;

        // Re-scanning a checked line is a no-op.
        if line.checked {
            return Ok(vec![]);
        }

        Ok(vec![PackingSlipEvent::LineChecked(LineChecked {
            slip_id: cmd.slip_id,
            sku: cmd.sku,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteSlip) -> Result<Vec<PackingSlipEvent>, DomainError> {
        self.ensure_exists(cmd.slip_id)?;

        if self.phase != PackingPhase::Finalized {
            return Err(DomainError::invalid_transition(format!(
                "packing slip {} is {:?}, only finalized slips complete",
                cmd.slip_id, self.phase
            )));
        }
        if cmd.signature.trim().is_empty() {
            return Err(DomainError::validation("signature cannot be empty"));
        }

        let partial = self.has_unchecked_lines();
        if partial && !cmd.confirm_partial {
            return Err(DomainError::validation(format!(
                "packing slip {} has unchecked lines; partial completion must be confirmed",
                cmd.slip_id
            )));
        }

        Ok(vec![PackingSlipEvent::SlipCompleted(SlipCompleted {
            slip_id: cmd.slip_id,
            signature: cmd.signature.clone(),
            partial,
            occurred_at: cmd.occurred_at,
        })])
    }
}
