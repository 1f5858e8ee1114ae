//! In-memory backend for demos and tests. Same contract as the
//! persistent backends, nothing survives the process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    PhotoPhase, PhotoStore, RecordStore, ReturnPatch, ReturnPhoto, StepTransitionRecord,
    StorageError,
};
use crate::booking::{Booking, BookingStatus, DamageReport};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    bookings: HashMap<Uuid, Booking>,
    damage: HashMap<Uuid, Vec<DamageReport>>,
    photos: HashMap<Uuid, Vec<ReturnPhoto>>,
    audit: HashMap<Uuid, Vec<StepTransitionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner
            .bookings
            .values()
            .any(|existing| existing.reference == booking.reference)
        {
            return Err(StorageError::DuplicateReference {
                reference: booking.reference,
            });
        }
        inner.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn booking_by_reference(&self, reference: &str) -> Result<Booking, StorageError> {
        let inner = self.inner.read().await;
        let booking = inner
            .bookings
            .values()
            .find(|b| b.reference == reference)
            .cloned()
            .ok_or_else(|| StorageError::BookingNotFound {
                key: reference.to_string(),
            })?;
        booking.validate()?;
        Ok(booking)
    }

    async fn booking_by_id(&self, booking_id: Uuid) -> Result<Booking, StorageError> {
        let inner = self.inner.read().await;
        let booking = inner
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| StorageError::BookingNotFound {
                key: booking_id.to_string(),
            })?;
        booking.validate()?;
        Ok(booking)
    }

    async fn bookings_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StorageError> {
        let inner = self.inner.read().await;
        let mut due: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Active && b.end_at >= from && b.end_at < to)
            .cloned()
            .collect();
        due.sort_by_key(|b| b.end_at);
        for booking in &due {
            booking.validate()?;
        }
        Ok(due)
    }

    async fn apply_return_patch(
        &self,
        booking_id: Uuid,
        patch: ReturnPatch,
    ) -> Result<Booking, StorageError> {
        let mut inner = self.inner.write().await;
        let booking =
            inner
                .bookings
                .get(&booking_id)
                .ok_or_else(|| StorageError::BookingNotFound {
                    key: booking_id.to_string(),
                })?;
        // Patch a copy first so a rejected write leaves the row as-is.
        let mut patched = booking.clone();
        patch.apply(&mut patched);
        patched.validate()?;
        inner.bookings.insert(booking_id, patched.clone());
        Ok(patched)
    }

    async fn add_damage_report(&self, report: DamageReport) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if !inner.bookings.contains_key(&report.booking_id) {
            return Err(StorageError::BookingNotFound {
                key: report.booking_id.to_string(),
            });
        }
        inner.damage.entry(report.booking_id).or_default().push(report);
        Ok(())
    }

    async fn remove_damage_report(&self, report_id: Uuid) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        for reports in inner.damage.values_mut() {
            if let Some(index) = reports.iter().position(|r| r.id == report_id) {
                reports.remove(index);
                return Ok(());
            }
        }
        Err(StorageError::DamageReportNotFound {
            id: report_id.to_string(),
        })
    }

    async fn damage_reports(&self, booking_id: Uuid) -> Result<Vec<DamageReport>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.damage.get(&booking_id).cloned().unwrap_or_default())
    }

    async fn append_step_record(&self, record: StepTransitionRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.audit.entry(record.booking_id).or_default().push(record);
        Ok(())
    }

    async fn step_records(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<StepTransitionRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.audit.get(&booking_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PhotoStore for MemoryStore {
    async fn add_photo(&self, photo: ReturnPhoto) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if !inner.bookings.contains_key(&photo.booking_id) {
            return Err(StorageError::BookingNotFound {
                key: photo.booking_id.to_string(),
            });
        }
        inner.photos.entry(photo.booking_id).or_default().push(photo);
        Ok(())
    }

    async fn photos(&self, booking_id: Uuid) -> Result<Vec<ReturnPhoto>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.photos.get(&booking_id).cloned().unwrap_or_default())
    }

    async fn photo_count(
        &self,
        booking_id: Uuid,
        phase: PhotoPhase,
    ) -> Result<usize, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .photos
            .get(&booking_id)
            .map(|photos| photos.iter().filter(|p| p.phase == phase).count())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::states::ReturnState;
    use chrono::TimeZone;

    fn booking_due(reference: &str, hour: u32) -> Booking {
        let end_at = Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap();
        Booking::new(reference, "Test Customer", "AA-000-AA", end_at, 10_000, 1_000)
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trip() {
        let store = MemoryStore::new();
        let booking = booking_due("R-1", 10);
        let id = booking.id;
        store.insert_booking(booking).await.unwrap();

        let by_ref = store.booking_by_reference("R-1").await.unwrap();
        assert_eq!(by_ref.id, id);
        let by_id = store.booking_by_id(id).await.unwrap();
        assert_eq!(by_id.reference, "R-1");
    }

    #[tokio::test]
    async fn duplicate_reference_is_rejected() {
        let store = MemoryStore::new();
        store.insert_booking(booking_due("R-1", 10)).await.unwrap();
        let err = store.insert_booking(booking_due("R-1", 11)).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateReference { .. }));
    }

    #[tokio::test]
    async fn due_window_filters_and_orders() {
        let store = MemoryStore::new();
        store.insert_booking(booking_due("R-late", 16)).await.unwrap();
        store.insert_booking(booking_due("R-early", 9)).await.unwrap();
        store.insert_booking(booking_due("R-mid", 12)).await.unwrap();
        let mut done = booking_due("R-done", 11);
        done.status = BookingStatus::Completed;
        store.insert_booking(done).await.unwrap();

        let from = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();
        let due = store.bookings_due_between(from, to).await.unwrap();

        let references: Vec<&str> = due.iter().map(|b| b.reference.as_str()).collect();
        assert_eq!(references, vec!["R-early", "R-mid"]);
    }

    #[tokio::test]
    async fn patch_persists_and_rejected_patch_leaves_row_untouched() {
        let store = MemoryStore::new();
        let booking = booking_due("R-1", 10);
        let id = booking.id;
        store.insert_booking(booking).await.unwrap();

        let good = ReturnPatch {
            return_state: Some(ReturnState::IntakeDone),
            return_odometer_km: Some(1_250),
            ..Default::default()
        };
        let updated = store.apply_return_patch(id, good).await.unwrap();
        assert_eq!(updated.return_state, Some(ReturnState::IntakeDone));

        // Odometer below pickup fails validation and must not stick.
        let bad = ReturnPatch {
            return_odometer_km: Some(10),
            ..Default::default()
        };
        let err = store.apply_return_patch(id, bad).await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptRecord(_)));
        let row = store.booking_by_id(id).await.unwrap();
        assert_eq!(row.return_odometer_km, Some(1_250));
    }

    #[tokio::test]
    async fn damage_reports_add_and_remove() {
        let store = MemoryStore::new();
        let booking = booking_due("R-1", 10);
        let id = booking.id;
        store.insert_booking(booking).await.unwrap();

        let report = DamageReport {
            id: Uuid::new_v4(),
            booking_id: id,
            description: "dent in left door".to_string(),
            severity: crate::booking::DamageSeverity::Moderate,
            estimated_cost_cents: 18_000,
            noted_by: "gate-1".to_string(),
            noted_at: Utc::now(),
        };
        let report_id = report.id;
        store.add_damage_report(report).await.unwrap();
        assert_eq!(store.damage_reports(id).await.unwrap().len(), 1);

        store.remove_damage_report(report_id).await.unwrap();
        assert!(store.damage_reports(id).await.unwrap().is_empty());

        let err = store.remove_damage_report(report_id).await.unwrap_err();
        assert!(matches!(err, StorageError::DamageReportNotFound { .. }));
    }

    #[tokio::test]
    async fn photo_count_is_per_phase() {
        use crate::store::PhotoKind;

        let store = MemoryStore::new();
        let booking = booking_due("R-1", 10);
        let id = booking.id;
        store.insert_booking(booking).await.unwrap();

        assert_eq!(store.photo_count(id, PhotoPhase::Return).await.unwrap(), 0);
        for label in ["front-left", "front-right", "rear-left"] {
            store
                .add_photo(ReturnPhoto::new(
                    id,
                    PhotoPhase::Return,
                    PhotoKind::Exterior,
                    label,
                    "gate-1",
                ))
                .await
                .unwrap();
        }
        // Pickup photos carried over from checkout stay out of the
        // return count.
        store
            .add_photo(ReturnPhoto::new(
                id,
                PhotoPhase::Pickup,
                PhotoKind::Odometer,
                "dashboard",
                "gate-1",
            ))
            .await
            .unwrap();

        assert_eq!(store.photo_count(id, PhotoPhase::Return).await.unwrap(), 3);
        assert_eq!(store.photo_count(id, PhotoPhase::Pickup).await.unwrap(), 1);
        assert_eq!(store.photos(id).await.unwrap().len(), 4);
    }
}
