//! Storage collaborators for the return flow.
//!
//! The coordinator talks to branch systems only through the traits in
//! this module, so tests can mock them and deployments can pick a
//! backend per branch: in-memory for demos and tests, JSON files under
//! the data directory for single-workstation branches, SQLite behind
//! the `database` feature for shared ones.

pub mod cache;
pub mod error;
pub mod fs;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use cache::{SessionCache, SessionRecord};
pub use error::StorageError;
pub use fs::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::booking::{Booking, BookingStatus, DamageReport};
use crate::fees::approval::FeeApproval;
use crate::returns::states::{ReturnState, ReturnStep};

/// Every field a completed step may change, applied in one write.
///
/// `None` leaves the stored value untouched. Backends must persist the
/// whole patch atomically or not at all; a step is only considered
/// complete once its patch is on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnPatch {
    pub return_state: Option<ReturnState>,
    pub returned_at: Option<DateTime<Utc>>,
    pub return_odometer_km: Option<u32>,
    pub fuel_level_eighths: Option<u8>,
    pub late_fee_cents: Option<i64>,
    pub fee_approval: Option<FeeApproval>,
    pub damage_reviewed_at: Option<DateTime<Utc>>,
    pub damage_reviewed_by: Option<String>,
    pub closed_out_at: Option<DateTime<Utc>>,
    pub closed_out_by: Option<String>,
    pub deposit_released_at: Option<DateTime<Utc>>,
    pub deposit_released_by: Option<String>,
    pub status: Option<BookingStatus>,
}

impl ReturnPatch {
    /// Patch that only advances the lifecycle state.
    pub fn state(state: ReturnState) -> Self {
        Self {
            return_state: Some(state),
            ..Default::default()
        }
    }

    /// Merge into a booking. Shared by every backend so the merge
    /// semantics cannot drift between them.
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(state) = self.return_state {
            booking.return_state = Some(state);
        }
        if let Some(returned_at) = self.returned_at {
            booking.returned_at = Some(returned_at);
        }
        if let Some(km) = self.return_odometer_km {
            booking.return_odometer_km = Some(km);
        }
        if let Some(fuel) = self.fuel_level_eighths {
            booking.fuel_level_eighths = Some(fuel);
        }
        if let Some(fee) = self.late_fee_cents {
            booking.late_fee_cents = Some(fee);
        }
        if let Some(approval) = &self.fee_approval {
            booking.fee_approval = Some(approval.clone());
        }
        if let Some(at) = self.damage_reviewed_at {
            booking.damage_reviewed_at = Some(at);
        }
        if let Some(by) = &self.damage_reviewed_by {
            booking.damage_reviewed_by = Some(by.clone());
        }
        if let Some(at) = self.closed_out_at {
            booking.closed_out_at = Some(at);
        }
        if let Some(by) = &self.closed_out_by {
            booking.closed_out_by = Some(by.clone());
        }
        if let Some(at) = self.deposit_released_at {
            booking.deposit_released_at = Some(at);
        }
        if let Some(by) = &self.deposit_released_by {
            booking.deposit_released_by = Some(by.clone());
        }
        if let Some(status) = self.status {
            booking.status = status;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Which end of the rental a condition photo documents. Pickup photos
/// come over from the checkout flow; the evidence floor only counts
/// return photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoPhase {
    Pickup,
    Return,
}

impl PhotoPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoPhase::Pickup => "pickup",
            PhotoPhase::Return => "return",
        }
    }
}

impl std::fmt::Display for PhotoPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a condition photo shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoKind {
    Exterior,
    Interior,
    Odometer,
    Fuel,
    Damage,
}

impl PhotoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoKind::Exterior => "exterior",
            PhotoKind::Interior => "interior",
            PhotoKind::Odometer => "odometer",
            PhotoKind::Fuel => "fuel",
            PhotoKind::Damage => "damage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exterior" => Some(PhotoKind::Exterior),
            "interior" => Some(PhotoKind::Interior),
            "odometer" => Some(PhotoKind::Odometer),
            "fuel" => Some(PhotoKind::Fuel),
            "damage" => Some(PhotoKind::Damage),
            _ => None,
        }
    }
}

impl std::fmt::Display for PhotoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one condition photo, keyed by booking, phase, and
/// kind. Binary payloads stay with the branch's photo share; only the
/// reference is tracked here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnPhoto {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub phase: PhotoPhase,
    pub kind: PhotoKind,
    /// Where on the vehicle, e.g. "front-left" or "trunk".
    pub label: String,
    pub taken_by: String,
    pub taken_at: DateTime<Utc>,
}

impl ReturnPhoto {
    pub fn new(
        booking_id: Uuid,
        phase: PhotoPhase,
        kind: PhotoKind,
        label: impl Into<String>,
        taken_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            phase,
            kind,
            label: label.into(),
            taken_by: taken_by.into(),
            taken_at: Utc::now(),
        }
    }
}

/// Audit entry appended for every completed step and fee decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTransitionRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub step: ReturnStep,
    pub from_state: ReturnState,
    pub to_state: ReturnState,
    pub operator: String,
    /// Hostname of the workstation that performed the step.
    pub workstation: String,
    pub recorded_at: DateTime<Utc>,
}

/// Booking records, damage reports, and the step audit log.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new contract. Fails on a duplicate reference.
    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError>;

    /// Look up by the human-facing contract reference.
    async fn booking_by_reference(&self, reference: &str) -> Result<Booking, StorageError>;

    async fn booking_by_id(&self, booking_id: Uuid) -> Result<Booking, StorageError>;

    /// Active contracts due back in `[from, to)`, ordered by due time.
    async fn bookings_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StorageError>;

    /// Apply the patch as one atomic write and return the updated row.
    async fn apply_return_patch(
        &self,
        booking_id: Uuid,
        patch: ReturnPatch,
    ) -> Result<Booking, StorageError>;

    async fn add_damage_report(&self, report: DamageReport) -> Result<(), StorageError>;

    async fn remove_damage_report(&self, report_id: Uuid) -> Result<(), StorageError>;

    async fn damage_reports(&self, booking_id: Uuid) -> Result<Vec<DamageReport>, StorageError>;

    async fn append_step_record(&self, record: StepTransitionRecord) -> Result<(), StorageError>;

    async fn step_records(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<StepTransitionRecord>, StorageError>;
}

/// Condition-photo metadata for the evidence step.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn add_photo(&self, photo: ReturnPhoto) -> Result<(), StorageError>;

    /// All photos on file for the booking, both phases.
    async fn photos(&self, booking_id: Uuid) -> Result<Vec<ReturnPhoto>, StorageError>;

    async fn photo_count(
        &self,
        booking_id: Uuid,
        phase: PhotoPhase,
    ) -> Result<usize, StorageError>;
}

/// The staff member operating this workstation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub display_name: String,
}

/// Resolves who is performing return steps, for stamps and audit rows.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn current_operator(&self) -> Result<Operator, StorageError>;
}

/// Identity pinned at startup from configuration. Branch sign-on is
/// handled by the desk systems; this records who to attribute steps to.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    operator: Operator,
}

impl StaticIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            operator: Operator {
                id: id.into(),
                display_name: display_name.into(),
            },
        }
    }
}

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn current_operator(&self) -> Result<Operator, StorageError> {
        Ok(self.operator.clone())
    }
}

/// Record change notifications, fanned out to session caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    BookingChanged { reference: String },
    DamageChanged { reference: String },
    PhotosChanged { reference: String },
}

impl ChangeEvent {
    pub fn reference(&self) -> &str {
        match self {
            ChangeEvent::BookingChanged { reference }
            | ChangeEvent::DamageChanged { reference }
            | ChangeEvent::PhotosChanged { reference } => reference,
        }
    }
}

/// Broadcast fan-out of [`ChangeEvent`]s. Lagging subscribers drop old
/// events, which is fine: a dropped invalidation only means a cache
/// entry lives until its TTL.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to whoever is listening. No subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}
