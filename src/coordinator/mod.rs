//! Return coordinator: sequences the five-step flow against the
//! branch's storage collaborators.
//!
//! Every mutating operation follows the same shape: fresh load, gate
//! check, payload validation, then one atomic patch. Nothing advances
//! unless the patch lands, so a storage failure leaves the return
//! exactly where it was.

pub mod session;

pub use session::{ReturnSession, SessionLock, SessionLockError};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, DamageReport, DamageSeverity};
use crate::error::{PreconditionError, ValidationError};
use crate::fees::approval::{approve, fee_state, ApprovalKind, FeeApproval, MIN_REASON_CHARS};
use crate::fees::late_fee::{minutes_late, LateFeePolicy};
use crate::returns::classifier::{classify, ReturnProfile};
use crate::returns::completion::effective_state;
use crate::returns::gating::{can_access_step, is_step_complete, step_gates};
use crate::returns::states::{current_step, ReturnState, ReturnStep};
use crate::store::{
    ChangeEvent, ChangeFeed, IdentityService, Operator, PhotoKind, PhotoPhase, PhotoStore,
    RecordStore, ReturnPatch, ReturnPhoto, SessionCache, SessionRecord, StepTransitionRecord,
    StorageError,
};
use crate::telemetry::{create_return_span, generate_correlation_id};

/// Anything the return flow can fail with, split by who has to act:
/// validation and precondition failures go back to the operator,
/// storage failures are the backend's problem and may be retried.
#[derive(Debug, Error)]
pub enum ReturnFlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ReturnFlowError {
    /// True when simply retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReturnFlowError::Storage(err) if err.is_retryable())
    }
}

/// Data submitted with each step. The step itself is implied so a
/// payload can never be applied to the wrong screen.
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    Intake {
        returned_at: DateTime<Utc>,
        odometer_km: u32,
        fuel_level_eighths: u8,
    },
    Evidence,
    Issues,
    Closeout {
        damage_check_confirmed: bool,
    },
    Deposit,
}

impl StepPayload {
    pub fn step(&self) -> ReturnStep {
        match self {
            StepPayload::Intake { .. } => ReturnStep::Intake,
            StepPayload::Evidence => ReturnStep::Evidence,
            StepPayload::Issues => ReturnStep::Issues,
            StepPayload::Closeout { .. } => ReturnStep::Closeout,
            StepPayload::Deposit => ReturnStep::Deposit,
        }
    }
}

/// What a successful step reports back.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub completed: ReturnStep,
    pub new_state: ReturnState,
    pub next_step: Option<ReturnStep>,
    /// Fee assessed during intake, for immediate display.
    pub late_fee_cents: Option<i64>,
}

pub struct ReturnCoordinator {
    records: Arc<dyn RecordStore>,
    photos: Arc<dyn PhotoStore>,
    identity: Arc<dyn IdentityService>,
    policy: LateFeePolicy,
    cache: Arc<SessionCache>,
    feed: ChangeFeed,
    /// Sticky per-booking classification. Outlives cache invalidation
    /// on purpose: an exception stays an exception for the session.
    profiles: Mutex<HashMap<Uuid, ReturnProfile>>,
    workstation: String,
}

impl ReturnCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        photos: Arc<dyn PhotoStore>,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        Self {
            records,
            photos,
            identity,
            policy: LateFeePolicy::default(),
            cache: Arc::new(SessionCache::default()),
            feed: ChangeFeed::default(),
            profiles: Mutex::new(HashMap::new()),
            workstation: hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        }
    }

    pub fn with_policy(mut self, policy: LateFeePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = feed;
        self
    }

    pub fn change_feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn policy(&self) -> LateFeePolicy {
        self.policy
    }

    /// One straight-from-storage load of everything a session needs.
    async fn load_record(&self, reference: &str) -> Result<SessionRecord, StorageError> {
        let booking = self.records.booking_by_reference(reference).await?;
        let damage_reports = self.records.damage_reports(booking.id).await?;
        let photos = self.photos.photos(booking.id).await?;
        Ok(SessionRecord {
            booking,
            damage_reports,
            photos,
        })
    }

    /// Ratchet the ledger with the currently observed classification
    /// and return the sticky profile.
    async fn sticky_profile(&self, booking_id: Uuid, observed: ReturnProfile) -> ReturnProfile {
        let mut ledger = self.profiles.lock().await;
        let entry = ledger.entry(booking_id).or_insert(ReturnProfile::Standard);
        *entry = entry.ratchet(observed);
        *entry
    }

    fn ensure_processable(booking: &Booking) -> Result<(), PreconditionError> {
        if booking.status == BookingStatus::Void {
            return Err(PreconditionError::BookingNotActive {
                reference: booking.reference.clone(),
                status: booking.status.to_string(),
            });
        }
        Ok(())
    }

    async fn after_write(&self, reference: &str, event: ChangeEvent) {
        self.cache.invalidate(reference).await;
        self.feed.publish(event);
    }

    /// Best-effort audit append. The step is already persisted; a
    /// failed audit write is logged, not surfaced.
    async fn append_audit(
        &self,
        booking_id: Uuid,
        step: ReturnStep,
        from_state: ReturnState,
        to_state: ReturnState,
        operator: &Operator,
    ) {
        let record = StepTransitionRecord {
            id: Uuid::new_v4(),
            booking_id,
            step,
            from_state,
            to_state,
            operator: operator.id.clone(),
            workstation: self.workstation.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.records.append_step_record(record).await {
            warn!(
                booking_id = %booking_id,
                step = %step,
                error = %err,
                "audit append failed; step itself is already persisted"
            );
        }
    }

    /// Assemble the session view, via the cache.
    pub async fn session(&self, reference: &str) -> Result<ReturnSession, ReturnFlowError> {
        let record = match self.cache.get(reference).await {
            Some(record) => record,
            None => {
                let record = self.load_record(reference).await?;
                self.cache.put(reference, record.clone()).await;
                record
            }
        };

        let observed = classify(
            &record.damage_reports,
            record.booking.late_fee_cents.unwrap_or(0),
        );
        let profile = self.sticky_profile(record.booking.id, observed).await;
        let state = effective_state(&record.booking, record.return_photo_count(), profile);
        let fee = fee_state(
            record.booking.late_fee_cents,
            record.booking.fee_approval.as_ref(),
        );
        let recent_activity = self.records.step_records(record.booking.id).await?;

        Ok(ReturnSession {
            state,
            profile,
            fee,
            minutes_late: record
                .booking
                .returned_at
                .map(|at| minutes_late(record.booking.end_at, at)),
            photo_count: record.return_photo_count(),
            gates: step_gates(state),
            next_step: current_step(state),
            damage_reports: record.damage_reports,
            recent_activity,
            booking: record.booking,
        })
    }

    /// Complete one step: fresh load, gate check, payload validation,
    /// one atomic patch. All-or-nothing per step.
    pub async fn complete_step(
        &self,
        reference: &str,
        payload: StepPayload,
    ) -> Result<StepOutcome, ReturnFlowError> {
        let correlation_id = generate_correlation_id();
        let span = create_return_span("complete_step", reference, Some(&correlation_id));
        self.complete_step_inner(reference, payload)
            .instrument(span)
            .await
    }

    async fn complete_step_inner(
        &self,
        reference: &str,
        payload: StepPayload,
    ) -> Result<StepOutcome, ReturnFlowError> {
        let record = self.load_record(reference).await?;
        let booking = &record.booking;
        Self::ensure_processable(booking)?;

        let observed = classify(&record.damage_reports, booking.late_fee_cents.unwrap_or(0));
        let profile = self.sticky_profile(booking.id, observed).await;
        let state = effective_state(booking, record.return_photo_count(), profile);
        let step = payload.step();

        if is_step_complete(state, step) {
            return Err(PreconditionError::StepAlreadyComplete { step }.into());
        }
        if !can_access_step(state, step) {
            return Err(PreconditionError::StepNotAccessible { step, state }.into());
        }

        let operator = self.identity.current_operator().await?;
        let now = Utc::now();
        let new_state = step.completed_state();
        let mut assessed_fee = None;

        let patch = match payload {
            StepPayload::Intake {
                returned_at,
                odometer_km,
                fuel_level_eighths,
            } => {
                if odometer_km < booking.pickup_odometer_km {
                    return Err(ValidationError::OdometerRegression {
                        pickup_km: booking.pickup_odometer_km,
                        return_km: odometer_km,
                    }
                    .into());
                }
                if fuel_level_eighths > 8 {
                    return Err(ValidationError::FuelOutOfRange {
                        value: fuel_level_eighths,
                    }
                    .into());
                }
                let fee = self.policy.assess(booking.end_at, returned_at);
                assessed_fee = Some(fee);
                ReturnPatch {
                    return_state: Some(new_state),
                    returned_at: Some(returned_at),
                    return_odometer_km: Some(odometer_km),
                    fuel_level_eighths: Some(fuel_level_eighths),
                    late_fee_cents: Some(fee),
                    ..Default::default()
                }
            }
            StepPayload::Evidence => {
                let floor = profile.photo_floor();
                if record.return_photo_count() < floor {
                    return Err(ValidationError::PhotoFloorNotMet {
                        required: floor,
                        uploaded: record.return_photo_count(),
                    }
                    .into());
                }
                ReturnPatch::state(new_state)
            }
            StepPayload::Issues => ReturnPatch {
                return_state: Some(new_state),
                damage_reviewed_at: Some(now),
                damage_reviewed_by: Some(operator.id.clone()),
                ..Default::default()
            },
            StepPayload::Closeout {
                damage_check_confirmed,
            } => {
                let fee = fee_state(booking.late_fee_cents, booking.fee_approval.as_ref());
                if !fee.is_resolved() {
                    return Err(PreconditionError::FeeApprovalPending {
                        fee_cents: booking.late_fee_cents.unwrap_or(0),
                    }
                    .into());
                }
                if profile.is_exception() && !damage_check_confirmed {
                    return Err(ValidationError::DamageCheckUnconfirmed.into());
                }
                ReturnPatch {
                    return_state: Some(new_state),
                    closed_out_at: Some(now),
                    closed_out_by: Some(operator.id.clone()),
                    ..Default::default()
                }
            }
            StepPayload::Deposit => ReturnPatch {
                return_state: Some(new_state),
                deposit_released_at: Some(now),
                deposit_released_by: Some(operator.id.clone()),
                status: Some(BookingStatus::Completed),
                ..Default::default()
            },
        };

        self.records.apply_return_patch(booking.id, patch).await?;

        info!(
            reference,
            step = %step,
            from_state = %state,
            to_state = %new_state,
            operator = %operator.id,
            "return step completed"
        );

        self.append_audit(booking.id, step, state, new_state, &operator)
            .await;
        self.after_write(
            reference,
            ChangeEvent::BookingChanged {
                reference: reference.to_string(),
            },
        )
        .await;

        Ok(StepOutcome {
            completed: step,
            new_state,
            next_step: current_step(new_state),
            late_fee_cents: assessed_fee,
        })
    }

    /// Record the fee decision: accept the calculated amount, or
    /// override it with a reasoned different amount.
    pub async fn approve_late_fee(
        &self,
        reference: &str,
        proposed_cents: i64,
        reason: Option<&str>,
    ) -> Result<FeeApproval, ReturnFlowError> {
        let record = self.load_record(reference).await?;
        let booking = &record.booking;
        Self::ensure_processable(booking)?;

        let observed = classify(&record.damage_reports, booking.late_fee_cents.unwrap_or(0));
        let profile = self.sticky_profile(booking.id, observed).await;
        let state = effective_state(booking, record.return_photo_count(), profile);
        if state.is_locked() {
            return Err(PreconditionError::FeeLocked.into());
        }
        let calculated = booking
            .late_fee_cents
            .ok_or(PreconditionError::FeeNotAssessed)?;

        let operator = self.identity.current_operator().await?;
        let approval = approve(calculated, proposed_cents, reason, &operator.id)?;

        let patch = ReturnPatch {
            fee_approval: Some(approval.clone()),
            ..Default::default()
        };
        self.records.apply_return_patch(booking.id, patch).await?;

        info!(
            reference,
            calculated_cents = calculated,
            approved_cents = approval.approved_cents,
            kind = ?approval.kind,
            operator = %operator.id,
            "late fee decision recorded"
        );

        self.append_audit(booking.id, ReturnStep::Issues, state, state, &operator)
            .await;
        self.after_write(
            reference,
            ChangeEvent::BookingChanged {
                reference: reference.to_string(),
            },
        )
        .await;

        Ok(approval)
    }

    /// Post-closeout fee correction. Always an override, always with a
    /// reason, always audited. The only way to touch a locked fee.
    pub async fn admin_adjust_fee(
        &self,
        reference: &str,
        new_cents: i64,
        reason: &str,
    ) -> Result<FeeApproval, ReturnFlowError> {
        let record = self.load_record(reference).await?;
        let booking = &record.booking;

        if new_cents < 0 {
            return Err(ValidationError::NegativeAmount {
                amount_cents: new_cents,
            }
            .into());
        }
        let trimmed = reason.trim();
        if trimmed.chars().count() < MIN_REASON_CHARS {
            return Err(ValidationError::ReasonTooShort {
                min: MIN_REASON_CHARS,
                got: trimmed.chars().count(),
            }
            .into());
        }

        let operator = self.identity.current_operator().await?;
        let approval = FeeApproval {
            approved_cents: new_cents,
            kind: ApprovalKind::Overridden,
            reason: Some(trimmed.to_string()),
            approved_by: operator.id.clone(),
            approved_at: Utc::now(),
        };

        let patch = ReturnPatch {
            fee_approval: Some(approval.clone()),
            ..Default::default()
        };
        self.records.apply_return_patch(booking.id, patch).await?;

        let state = booking.return_state.unwrap_or(ReturnState::NotStarted);
        warn!(
            reference,
            new_cents,
            operator = %operator.id,
            "admin fee adjustment applied"
        );
        self.append_audit(booking.id, ReturnStep::Issues, state, state, &operator)
            .await;
        self.after_write(
            reference,
            ChangeEvent::BookingChanged {
                reference: reference.to_string(),
            },
        )
        .await;

        Ok(approval)
    }

    /// Note damage against the booking. Drives the exception
    /// classification; refused once the contract is locked.
    pub async fn note_damage(
        &self,
        reference: &str,
        description: &str,
        severity: DamageSeverity,
        estimated_cost_cents: i64,
    ) -> Result<DamageReport, ReturnFlowError> {
        let record = self.load_record(reference).await?;
        let booking = &record.booking;
        Self::ensure_processable(booking)?;

        let observed = classify(&record.damage_reports, booking.late_fee_cents.unwrap_or(0));
        let profile = self.sticky_profile(booking.id, observed).await;
        let state = effective_state(booking, record.return_photo_count(), profile);
        if state.is_locked() {
            return Err(PreconditionError::ContractLocked { state }.into());
        }
        if description.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "description",
            }
            .into());
        }
        if estimated_cost_cents < 0 {
            return Err(ValidationError::NegativeAmount {
                amount_cents: estimated_cost_cents,
            }
            .into());
        }

        let operator = self.identity.current_operator().await?;
        let report = DamageReport {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            description: description.trim().to_string(),
            severity,
            estimated_cost_cents,
            noted_by: operator.id.clone(),
            noted_at: Utc::now(),
        };
        self.records.add_damage_report(report.clone()).await?;

        // Ratchet right away so the session tightens from this moment.
        self.sticky_profile(booking.id, ReturnProfile::Exception)
            .await;

        info!(
            reference,
            severity = ?report.severity,
            estimated_cost_cents,
            "damage noted"
        );
        self.after_write(
            reference,
            ChangeEvent::DamageChanged {
                reference: reference.to_string(),
            },
        )
        .await;

        Ok(report)
    }

    /// Remove a damage report, e.g. one entered against the wrong car.
    /// The session's exception classification deliberately stays.
    pub async fn clear_damage(
        &self,
        reference: &str,
        report_id: Uuid,
    ) -> Result<(), ReturnFlowError> {
        let record = self.load_record(reference).await?;
        let booking = &record.booking;
        Self::ensure_processable(booking)?;

        let observed = classify(&record.damage_reports, booking.late_fee_cents.unwrap_or(0));
        let profile = self.sticky_profile(booking.id, observed).await;
        let state = effective_state(booking, record.return_photo_count(), profile);
        if state.is_locked() {
            return Err(PreconditionError::ContractLocked { state }.into());
        }

        self.records.remove_damage_report(report_id).await?;

        info!(reference, report_id = %report_id, "damage report removed");
        self.after_write(
            reference,
            ChangeEvent::DamageChanged {
                reference: reference.to_string(),
            },
        )
        .await;
        Ok(())
    }

    /// Register one return-phase condition photo for the evidence
    /// step. Pickup photos arrive through the checkout flow, not here.
    pub async fn add_photo(
        &self,
        reference: &str,
        label: &str,
        kind: PhotoKind,
    ) -> Result<ReturnPhoto, ReturnFlowError> {
        let record = self.load_record(reference).await?;
        let booking = &record.booking;
        Self::ensure_processable(booking)?;

        let observed = classify(&record.damage_reports, booking.late_fee_cents.unwrap_or(0));
        let profile = self.sticky_profile(booking.id, observed).await;
        let state = effective_state(booking, record.return_photo_count(), profile);
        if state.is_locked() {
            return Err(PreconditionError::ContractLocked { state }.into());
        }
        if label.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "label" }.into());
        }

        let operator = self.identity.current_operator().await?;
        let photo = ReturnPhoto::new(
            booking.id,
            PhotoPhase::Return,
            kind,
            label.trim(),
            operator.id.clone(),
        );
        self.photos.add_photo(photo.clone()).await?;

        self.after_write(
            reference,
            ChangeEvent::PhotosChanged {
                reference: reference.to_string(),
            },
        )
        .await;
        Ok(photo)
    }

    /// Active contracts due back in the window, soonest first.
    pub async fn arrivals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, ReturnFlowError> {
        Ok(self.records.bookings_due_between(from, to).await?)
    }

    /// Full audit trail for a booking, oldest first.
    pub async fn audit_log(
        &self,
        reference: &str,
    ) -> Result<Vec<StepTransitionRecord>, ReturnFlowError> {
        let booking = self.records.booking_by_reference(reference).await?;
        Ok(self.records.step_records(booking.id).await?)
    }
}
