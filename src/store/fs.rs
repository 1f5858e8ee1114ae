//! JSON-file backend for single-workstation branches.
//!
//! One file per booking under `<root>/bookings/`, holding the booking
//! row together with its damage reports, photo metadata, and audit
//! log. Patches rewrite the file via a temp file and rename, so a
//! write is either fully on disk or not at all.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{
    PhotoPhase, PhotoStore, RecordStore, ReturnPatch, ReturnPhoto, StepTransitionRecord,
    StorageError,
};
use crate::booking::{Booking, BookingStatus, DamageReport};

/// Everything stored for one booking, serialized as a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReturnFile {
    booking: Booking,
    #[serde(default)]
    damage_reports: Vec<DamageReport>,
    #[serde(default)]
    photos: Vec<ReturnPhoto>,
    #[serde(default)]
    audit: Vec<StepTransitionRecord>,
}

impl ReturnFile {
    fn new(booking: Booking) -> Self {
        Self {
            booking,
            damage_reports: Vec::new(),
            photos: Vec::new(),
            audit: Vec::new(),
        }
    }
}

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bookings_dir(&self) -> PathBuf {
        self.root.join("bookings")
    }

    fn file_path(&self, booking_id: Uuid) -> PathBuf {
        self.bookings_dir().join(format!("{booking_id}.json"))
    }

    async fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.bookings_dir()).await?;
        Ok(())
    }

    async fn read_file(&self, booking_id: Uuid) -> Result<ReturnFile, StorageError> {
        let path = self.file_path(booking_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::BookingNotFound {
                    key: booking_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let file: ReturnFile = serde_json::from_slice(&bytes)?;
        file.booking.validate()?;
        Ok(file)
    }

    /// Write the whole document, temp file first, then rename into
    /// place.
    async fn write_file(&self, file: &ReturnFile) -> Result<(), StorageError> {
        self.ensure_dirs().await?;
        let path = self.file_path(file.booking.id);
        let tmp_path = self.bookings_dir().join(format!("{}.json.tmp", file.booking.id));
        let bytes = serde_json::to_vec_pretty(file)?;
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!(path = %path.display(), "wrote return file");
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ReturnFile>, StorageError> {
        let dir = self.bookings_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let file: ReturnFile = serde_json::from_slice(&bytes)?;
            file.booking.validate()?;
            files.push(file);
        }
        Ok(files)
    }

    async fn find_by_reference(&self, reference: &str) -> Result<ReturnFile, StorageError> {
        self.scan()
            .await?
            .into_iter()
            .find(|f| f.booking.reference == reference)
            .ok_or_else(|| StorageError::BookingNotFound {
                key: reference.to_string(),
            })
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError> {
        if self.find_by_reference(&booking.reference).await.is_ok() {
            return Err(StorageError::DuplicateReference {
                reference: booking.reference,
            });
        }
        self.write_file(&ReturnFile::new(booking)).await
    }

    async fn booking_by_reference(&self, reference: &str) -> Result<Booking, StorageError> {
        Ok(self.find_by_reference(reference).await?.booking)
    }

    async fn booking_by_id(&self, booking_id: Uuid) -> Result<Booking, StorageError> {
        Ok(self.read_file(booking_id).await?.booking)
    }

    async fn bookings_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StorageError> {
        let mut due: Vec<Booking> = self
            .scan()
            .await?
            .into_iter()
            .map(|f| f.booking)
            .filter(|b| b.status == BookingStatus::Active && b.end_at >= from && b.end_at < to)
            .collect();
        due.sort_by_key(|b| b.end_at);
        Ok(due)
    }

    async fn apply_return_patch(
        &self,
        booking_id: Uuid,
        patch: ReturnPatch,
    ) -> Result<Booking, StorageError> {
        let mut file = self.read_file(booking_id).await?;
        patch.apply(&mut file.booking);
        file.booking.validate()?;
        self.write_file(&file).await?;
        Ok(file.booking)
    }

    async fn add_damage_report(&self, report: DamageReport) -> Result<(), StorageError> {
        let mut file = self.read_file(report.booking_id).await?;
        file.damage_reports.push(report);
        self.write_file(&file).await
    }

    async fn remove_damage_report(&self, report_id: Uuid) -> Result<(), StorageError> {
        for mut file in self.scan().await? {
            if let Some(index) = file.damage_reports.iter().position(|r| r.id == report_id) {
                file.damage_reports.remove(index);
                return self.write_file(&file).await;
            }
        }
        Err(StorageError::DamageReportNotFound {
            id: report_id.to_string(),
        })
    }

    async fn damage_reports(&self, booking_id: Uuid) -> Result<Vec<DamageReport>, StorageError> {
        Ok(self.read_file(booking_id).await?.damage_reports)
    }

    async fn append_step_record(&self, record: StepTransitionRecord) -> Result<(), StorageError> {
        let mut file = self.read_file(record.booking_id).await?;
        file.audit.push(record);
        self.write_file(&file).await
    }

    async fn step_records(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<StepTransitionRecord>, StorageError> {
        Ok(self.read_file(booking_id).await?.audit)
    }
}

#[async_trait]
impl PhotoStore for FileStore {
    async fn add_photo(&self, photo: ReturnPhoto) -> Result<(), StorageError> {
        let mut file = self.read_file(photo.booking_id).await?;
        file.photos.push(photo);
        self.write_file(&file).await
    }

    async fn photos(&self, booking_id: Uuid) -> Result<Vec<ReturnPhoto>, StorageError> {
        Ok(self.read_file(booking_id).await?.photos)
    }

    async fn photo_count(
        &self,
        booking_id: Uuid,
        phase: PhotoPhase,
    ) -> Result<usize, StorageError> {
        Ok(self
            .read_file(booking_id)
            .await?
            .photos
            .iter()
            .filter(|p| p.phase == phase)
            .count())
    }
}
