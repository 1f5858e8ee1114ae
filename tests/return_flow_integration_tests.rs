//! Return flow driven end to end through the coordinator over the
//! in-memory backend. Covers the ground the unit tests leave open:
//! legacy rows, a backend outage with a retry, cache refresh after
//! writes, and the arrivals and audit queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use backlot::booking::{Booking, BookingStatus, DamageReport, DamageSeverity};
use backlot::coordinator::{ReturnCoordinator, ReturnFlowError, StepPayload};
use backlot::error::{PreconditionError, ValidationError};
use backlot::fees::LateFeePolicy;
use backlot::returns::{ReturnProfile, ReturnState, ReturnStep};
use backlot::store::{
    MemoryStore, PhotoKind, PhotoPhase, PhotoStore, RecordStore, ReturnPatch, ReturnPhoto,
    SessionCache, StaticIdentity, StepTransitionRecord, StorageError,
};

fn due_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap()
}

fn contract(reference: &str) -> Booking {
    Booking::new(reference, "Jonas Brandt", "ND-209-EC", due_at(), 35_000, 18_750)
}

fn contract_due(reference: &str, end_at: DateTime<Utc>) -> Booking {
    Booking::new(reference, "Aiko Tanaka", "RV-733-KP", end_at, 40_000, 61_220)
}

fn operator() -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity::new("a.reyes", "Ana Reyes"))
}

fn desk_policy() -> LateFeePolicy {
    LateFeePolicy {
        grace_minutes: 30,
        hourly_rate_cents: 1_500,
    }
}

fn coordinator_over(store: Arc<MemoryStore>) -> ReturnCoordinator {
    ReturnCoordinator::new(store.clone(), store, operator()).with_policy(desk_policy())
}

fn on_time_intake() -> StepPayload {
    StepPayload::Intake {
        returned_at: due_at(),
        odometer_km: 19_210,
        fuel_level_eighths: 6,
    }
}

#[tokio::test]
async fn legacy_row_resumes_from_inferred_state() {
    let store = Arc::new(MemoryStore::new());
    // Returned under the old tooling: stamps on the row, no recorded
    // lifecycle state.
    let mut legacy = contract("R-20360");
    legacy.returned_at = Some(due_at() + Duration::minutes(10));
    legacy.return_odometer_km = Some(19_400);
    legacy.fuel_level_eighths = Some(7);
    store.insert_booking(legacy).await.unwrap();

    let coordinator = coordinator_over(store.clone());
    let session = coordinator.session("R-20360").await.unwrap();
    assert_eq!(session.state, ReturnState::EvidenceDone);
    assert_eq!(session.next_step, Some(ReturnStep::Issues));
    assert_eq!(session.minutes_late, Some(10));
    assert!(session.booking.return_state.is_none());

    let outcome = coordinator
        .complete_step("R-20360", StepPayload::Issues)
        .await
        .unwrap();
    assert_eq!(outcome.new_state, ReturnState::IssuesReviewed);

    // The first write pins the real state onto the row; nothing is
    // inferred from here on.
    let stored = store.booking_by_reference("R-20360").await.unwrap();
    assert_eq!(stored.return_state, Some(ReturnState::IssuesReviewed));
}

#[tokio::test]
async fn exception_closeout_requires_the_damage_checklist() {
    let store = Arc::new(MemoryStore::new());
    store.insert_booking(contract("R-5510")).await.unwrap();
    let coordinator = coordinator_over(store);

    coordinator
        .complete_step("R-5510", on_time_intake())
        .await
        .unwrap();
    coordinator
        .note_damage(
            "R-5510",
            "kerbed front-left alloy",
            DamageSeverity::Cosmetic,
            12_000,
        )
        .await
        .unwrap();

    let session = coordinator.session("R-5510").await.unwrap();
    assert_eq!(session.profile, ReturnProfile::Exception);

    // Four photos clear the evidence floor for an exception return.
    for label in ["front", "rear", "left", "right"] {
        coordinator
            .add_photo("R-5510", label, PhotoKind::Exterior)
            .await
            .unwrap();
    }
    coordinator
        .complete_step("R-5510", StepPayload::Evidence)
        .await
        .unwrap();
    coordinator
        .complete_step("R-5510", StepPayload::Issues)
        .await
        .unwrap();

    let err = coordinator
        .complete_step(
            "R-5510",
            StepPayload::Closeout {
                damage_check_confirmed: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReturnFlowError::Validation(ValidationError::DamageCheckUnconfirmed)
    ));

    let outcome = coordinator
        .complete_step(
            "R-5510",
            StepPayload::Closeout {
                damage_check_confirmed: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.new_state, ReturnState::ClosedOut);
}

#[tokio::test]
async fn backend_outage_leaves_no_trace_and_retry_lands() {
    let inner = Arc::new(MemoryStore::new());
    inner.insert_booking(contract("R-7012")).await.unwrap();
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let coordinator =
        ReturnCoordinator::new(flaky.clone(), flaky.clone(), operator()).with_policy(desk_policy());

    flaky.set_fail_writes(true);
    let payload = StepPayload::Intake {
        returned_at: due_at() + Duration::minutes(100),
        odometer_km: 19_210,
        fuel_level_eighths: 6,
    };
    let err = coordinator
        .complete_step("R-7012", payload.clone())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // Nothing advanced and nothing was logged.
    let row = inner.booking_by_reference("R-7012").await.unwrap();
    assert_eq!(row.return_state, None);
    assert_eq!(row.returned_at, None);
    assert!(inner.step_records(row.id).await.unwrap().is_empty());

    // The very same request lands once the backend is back.
    flaky.set_fail_writes(false);
    let outcome = coordinator.complete_step("R-7012", payload).await.unwrap();
    assert_eq!(outcome.new_state, ReturnState::IntakeDone);
    assert_eq!(outcome.late_fee_cents, Some(3_000));
    assert_eq!(inner.step_records(row.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn writes_refresh_the_cached_session() {
    let store = Arc::new(MemoryStore::new());
    store.insert_booking(contract("R-8833")).await.unwrap();
    let cache = Arc::new(SessionCache::new(StdDuration::from_secs(60)));
    let coordinator = coordinator_over(store).with_cache(cache);

    let before = coordinator.session("R-8833").await.unwrap();
    assert_eq!(before.state, ReturnState::NotStarted);

    coordinator
        .complete_step("R-8833", on_time_intake())
        .await
        .unwrap();

    // The TTL is nowhere near expiry, so the fresh view has to come
    // from the write invalidating the cache.
    let after = coordinator.session("R-8833").await.unwrap();
    assert_eq!(after.state, ReturnState::IntakeDone);
    assert_eq!(after.minutes_late, Some(0));

    coordinator
        .note_damage("R-8833", "scuffed rear bumper", DamageSeverity::Moderate, 18_000)
        .await
        .unwrap();
    let with_damage = coordinator.session("R-8833").await.unwrap();
    assert_eq!(with_damage.profile, ReturnProfile::Exception);
    assert_eq!(with_damage.damage_reports.len(), 1);
}

#[tokio::test]
async fn arrivals_lists_active_contracts_in_due_order() {
    let store = Arc::new(MemoryStore::new());
    let day = |hour| Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap();

    // Inserted out of order on purpose.
    store
        .insert_booking(contract_due("R-1300", day(13)))
        .await
        .unwrap();
    store
        .insert_booking(contract_due("R-0800", day(8)))
        .await
        .unwrap();
    let mut settled_long_ago = contract_due("R-0900", day(9));
    settled_long_ago.status = BookingStatus::Completed;
    store.insert_booking(settled_long_ago).await.unwrap();
    store
        .insert_booking(contract_due("R-2000", day(20)))
        .await
        .unwrap();
    store
        .insert_booking(contract_due("R-1000", day(10)))
        .await
        .unwrap();

    let coordinator = coordinator_over(store);
    let due = coordinator.arrivals(day(7), day(14)).await.unwrap();
    let refs: Vec<&str> = due.iter().map(|b| b.reference.as_str()).collect();
    assert_eq!(refs, ["R-0800", "R-1000", "R-1300"]);
}

#[tokio::test]
async fn audit_rows_chain_across_the_walk() {
    let store = Arc::new(MemoryStore::new());
    store.insert_booking(contract("R-3305")).await.unwrap();
    let coordinator = coordinator_over(store);

    coordinator
        .complete_step("R-3305", on_time_intake())
        .await
        .unwrap();
    coordinator
        .complete_step("R-3305", StepPayload::Evidence)
        .await
        .unwrap();
    coordinator
        .complete_step("R-3305", StepPayload::Issues)
        .await
        .unwrap();

    let rows = coordinator.audit_log("R-3305").await.unwrap();
    let hops: Vec<(ReturnStep, ReturnState, ReturnState)> = rows
        .iter()
        .map(|r| (r.step, r.from_state, r.to_state))
        .collect();
    assert_eq!(
        hops,
        vec![
            (
                ReturnStep::Intake,
                ReturnState::NotStarted,
                ReturnState::IntakeDone
            ),
            (
                ReturnStep::Evidence,
                ReturnState::IntakeDone,
                ReturnState::EvidenceDone
            ),
            (
                ReturnStep::Issues,
                ReturnState::EvidenceDone,
                ReturnState::IssuesReviewed
            ),
        ]
    );
    for row in &rows {
        assert_eq!(row.operator, "a.reyes");
    }
}

#[tokio::test]
async fn settled_contract_refuses_further_changes() {
    let store = Arc::new(MemoryStore::new());
    store.insert_booking(contract("R-9944")).await.unwrap();
    let coordinator = coordinator_over(store);

    coordinator
        .complete_step("R-9944", on_time_intake())
        .await
        .unwrap();
    coordinator
        .complete_step("R-9944", StepPayload::Evidence)
        .await
        .unwrap();
    coordinator
        .complete_step("R-9944", StepPayload::Issues)
        .await
        .unwrap();
    coordinator
        .complete_step(
            "R-9944",
            StepPayload::Closeout {
                damage_check_confirmed: true,
            },
        )
        .await
        .unwrap();
    let outcome = coordinator
        .complete_step("R-9944", StepPayload::Deposit)
        .await
        .unwrap();
    assert_eq!(outcome.new_state, ReturnState::DepositSettled);
    assert_eq!(outcome.next_step, None);

    let err = coordinator
        .add_photo("R-9944", "rear", PhotoKind::Exterior)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReturnFlowError::Precondition(PreconditionError::ContractLocked { .. })
    ));
    let err = coordinator
        .note_damage("R-9944", "found later in the bay", DamageSeverity::Moderate, 9_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReturnFlowError::Precondition(PreconditionError::ContractLocked { .. })
    ));

    let session = coordinator.session("R-9944").await.unwrap();
    assert_eq!(session.state, ReturnState::DepositSettled);
    assert_eq!(session.next_step, None);
}

#[tokio::test]
async fn closeout_is_refused_until_issues_are_reviewed() {
    let store = Arc::new(MemoryStore::new());
    store.insert_booking(contract("R-4471")).await.unwrap();
    let coordinator = coordinator_over(store.clone());

    coordinator
        .complete_step("R-4471", on_time_intake())
        .await
        .unwrap();
    coordinator
        .complete_step("R-4471", StepPayload::Evidence)
        .await
        .unwrap();

    let err = coordinator
        .complete_step(
            "R-4471",
            StepPayload::Closeout {
                damage_check_confirmed: true,
            },
        )
        .await
        .unwrap_err();
    match err {
        ReturnFlowError::Precondition(PreconditionError::StepNotAccessible { step, state }) => {
            assert_eq!(step, ReturnStep::Closeout);
            assert_eq!(state, ReturnState::EvidenceDone);
        }
        other => panic!("expected a step gate refusal, got {other:?}"),
    }

    // Refused before any write reached the store.
    let row = store.booking_by_reference("R-4471").await.unwrap();
    assert_eq!(row.return_state, Some(ReturnState::EvidenceDone));
    assert!(row.closed_out_at.is_none());
    assert_eq!(store.step_records(row.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn deposit_cannot_jump_ahead_of_closeout() {
    let store = Arc::new(MemoryStore::new());
    store.insert_booking(contract("R-6120")).await.unwrap();
    let coordinator = coordinator_over(store);

    coordinator
        .complete_step("R-6120", on_time_intake())
        .await
        .unwrap();
    coordinator
        .complete_step("R-6120", StepPayload::Evidence)
        .await
        .unwrap();
    coordinator
        .complete_step("R-6120", StepPayload::Issues)
        .await
        .unwrap();

    let err = coordinator
        .complete_step("R-6120", StepPayload::Deposit)
        .await
        .unwrap_err();
    match err {
        ReturnFlowError::Precondition(PreconditionError::StepNotAccessible { step, state }) => {
            assert_eq!(step, ReturnStep::Deposit);
            assert_eq!(state, ReturnState::IssuesReviewed);
        }
        other => panic!("expected a step gate refusal, got {other:?}"),
    }
}

/// Wraps the memory backend and fails writes on demand, the way the
/// desk sees a record service drop mid-shift. Reads keep working.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::backend("record service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.insert_booking(booking).await
    }

    async fn booking_by_reference(&self, reference: &str) -> Result<Booking, StorageError> {
        self.inner.booking_by_reference(reference).await
    }

    async fn booking_by_id(&self, booking_id: Uuid) -> Result<Booking, StorageError> {
        self.inner.booking_by_id(booking_id).await
    }

    async fn bookings_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StorageError> {
        self.inner.bookings_due_between(from, to).await
    }

    async fn apply_return_patch(
        &self,
        booking_id: Uuid,
        patch: ReturnPatch,
    ) -> Result<Booking, StorageError> {
        self.check_write()?;
        self.inner.apply_return_patch(booking_id, patch).await
    }

    async fn add_damage_report(&self, report: DamageReport) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.add_damage_report(report).await
    }

    async fn remove_damage_report(&self, report_id: Uuid) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.remove_damage_report(report_id).await
    }

    async fn damage_reports(&self, booking_id: Uuid) -> Result<Vec<DamageReport>, StorageError> {
        self.inner.damage_reports(booking_id).await
    }

    async fn append_step_record(&self, record: StepTransitionRecord) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.append_step_record(record).await
    }

    async fn step_records(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<StepTransitionRecord>, StorageError> {
        self.inner.step_records(booking_id).await
    }
}

#[async_trait]
impl PhotoStore for FlakyStore {
    async fn add_photo(&self, photo: ReturnPhoto) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.add_photo(photo).await
    }

    async fn photos(&self, booking_id: Uuid) -> Result<Vec<ReturnPhoto>, StorageError> {
        self.inner.photos(booking_id).await
    }

    async fn photo_count(
        &self,
        booking_id: Uuid,
        phase: PhotoPhase,
    ) -> Result<usize, StorageError> {
        self.inner.photo_count(booking_id, phase).await
    }
}
