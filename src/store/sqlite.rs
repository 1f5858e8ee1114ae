//! SQLite backend for branches where several workstations share one
//! database file. Schema is ensured at connect time; queries are
//! runtime-bound so the crate builds without a prepared database.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::{
    PhotoKind, PhotoPhase, PhotoStore, RecordStore, ReturnPatch, ReturnPhoto,
    StepTransitionRecord, StorageError,
};
use crate::booking::{Booking, BookingStatus, DamageReport, DamageSeverity};
use crate::returns::states::{ReturnState, ReturnStep};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file and schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Self::connect_with(database_url, 5).await
    }

    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        info!("ensuring sqlite schema");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                reference TEXT NOT NULL UNIQUE,
                customer_name TEXT NOT NULL,
                vehicle_plate TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                end_at TEXT NOT NULL,
                returned_at TEXT,
                deposit_cents INTEGER NOT NULL,
                pickup_odometer_km INTEGER NOT NULL,
                return_odometer_km INTEGER,
                fuel_level_eighths INTEGER,
                return_state TEXT,
                late_fee_cents INTEGER,
                fee_approval TEXT,
                damage_reviewed_at TEXT,
                damage_reviewed_by TEXT,
                closed_out_at TEXT,
                closed_out_by TEXT,
                deposit_released_at TEXT,
                deposit_released_by TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS damage_reports (
                id TEXT PRIMARY KEY,
                booking_id TEXT NOT NULL REFERENCES bookings(id),
                description TEXT NOT NULL,
                severity TEXT NOT NULL,
                estimated_cost_cents INTEGER NOT NULL,
                noted_by TEXT NOT NULL,
                noted_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS return_photos (
                id TEXT PRIMARY KEY,
                booking_id TEXT NOT NULL REFERENCES bookings(id),
                phase TEXT NOT NULL,
                kind TEXT NOT NULL,
                label TEXT NOT NULL,
                taken_by TEXT NOT NULL,
                taken_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_audit (
                id TEXT PRIMARY KEY,
                booking_id TEXT NOT NULL REFERENCES bookings(id),
                step TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                operator TEXT NOT NULL,
                workstation TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_booking_row(&self, booking_id: Uuid) -> Result<Booking, StorageError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = ?1")
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::BookingNotFound {
                key: booking_id.to_string(),
            })?;
        let booking = row_to_booking(&row)?;
        booking.validate()?;
        Ok(booking)
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::backend(format!("bad timestamp '{value}': {e}")))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    value.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(value: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(value).map_err(|e| StorageError::backend(format!("bad uuid '{value}': {e}")))
}

fn parse_status(value: &str) -> Result<BookingStatus, StorageError> {
    match value {
        "active" => Ok(BookingStatus::Active),
        "completed" => Ok(BookingStatus::Completed),
        "void" => Ok(BookingStatus::Void),
        other => Err(StorageError::backend(format!("bad booking status '{other}'"))),
    }
}

fn parse_severity(value: &str) -> Result<DamageSeverity, StorageError> {
    match value {
        "cosmetic" => Ok(DamageSeverity::Cosmetic),
        "moderate" => Ok(DamageSeverity::Moderate),
        "severe" => Ok(DamageSeverity::Severe),
        other => Err(StorageError::backend(format!("bad damage severity '{other}'"))),
    }
}

fn parse_phase(value: &str) -> Result<PhotoPhase, StorageError> {
    match value {
        "pickup" => Ok(PhotoPhase::Pickup),
        "return" => Ok(PhotoPhase::Return),
        other => Err(StorageError::backend(format!("bad photo phase '{other}'"))),
    }
}

fn parse_kind(value: &str) -> Result<PhotoKind, StorageError> {
    PhotoKind::parse(value)
        .ok_or_else(|| StorageError::backend(format!("bad photo kind '{value}'")))
}

fn parse_return_state(value: Option<String>) -> Result<Option<ReturnState>, StorageError> {
    match value {
        None => Ok(None),
        Some(text) => ReturnState::parse(&text)
            .map(Some)
            .ok_or_else(|| StorageError::backend(format!("bad return state '{text}'"))),
    }
}

fn parse_step(value: &str) -> Result<ReturnStep, StorageError> {
    ReturnStep::parse(value)
        .ok_or_else(|| StorageError::backend(format!("bad return step '{value}'")))
}

fn parse_state(value: &str) -> Result<ReturnState, StorageError> {
    ReturnState::parse(value)
        .ok_or_else(|| StorageError::backend(format!("bad return state '{value}'")))
}

fn parse_km(value: Option<i64>) -> Result<Option<u32>, StorageError> {
    value
        .map(|v| u32::try_from(v).map_err(|_| StorageError::backend(format!("bad odometer {v}"))))
        .transpose()
}

fn row_to_booking(row: &SqliteRow) -> Result<Booking, StorageError> {
    let fee_approval = row
        .get::<Option<String>, _>("fee_approval")
        .map(|json| serde_json::from_str(&json))
        .transpose()?;
    Ok(Booking {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        reference: row.get("reference"),
        customer_name: row.get("customer_name"),
        vehicle_plate: row.get("vehicle_plate"),
        status: parse_status(&row.get::<String, _>("status"))?,
        end_at: parse_ts(&row.get::<String, _>("end_at"))?,
        returned_at: parse_opt_ts(row.get("returned_at"))?,
        deposit_cents: row.get("deposit_cents"),
        pickup_odometer_km: parse_km(Some(row.get::<i64, _>("pickup_odometer_km")))?
            .unwrap_or_default(),
        return_odometer_km: parse_km(row.get("return_odometer_km"))?,
        fuel_level_eighths: row
            .get::<Option<i64>, _>("fuel_level_eighths")
            .map(|v| u8::try_from(v).map_err(|_| StorageError::backend(format!("bad fuel {v}"))))
            .transpose()?,
        return_state: parse_return_state(row.get("return_state"))?,
        late_fee_cents: row.get("late_fee_cents"),
        fee_approval,
        damage_reviewed_at: parse_opt_ts(row.get("damage_reviewed_at"))?,
        damage_reviewed_by: row.get("damage_reviewed_by"),
        closed_out_at: parse_opt_ts(row.get("closed_out_at"))?,
        closed_out_by: row.get("closed_out_by"),
        deposit_released_at: parse_opt_ts(row.get("deposit_released_at"))?,
        deposit_released_by: row.get("deposit_released_by"),
    })
}

fn row_to_damage(row: &SqliteRow) -> Result<DamageReport, StorageError> {
    Ok(DamageReport {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        booking_id: parse_uuid(&row.get::<String, _>("booking_id"))?,
        description: row.get("description"),
        severity: parse_severity(&row.get::<String, _>("severity"))?,
        estimated_cost_cents: row.get("estimated_cost_cents"),
        noted_by: row.get("noted_by"),
        noted_at: parse_ts(&row.get::<String, _>("noted_at"))?,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_booking(&self, booking: Booking) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, reference, customer_name, vehicle_plate, status,
                end_at, returned_at, deposit_cents, pickup_odometer_km,
                return_odometer_km, fuel_level_eighths, return_state,
                late_fee_cents, fee_approval,
                damage_reviewed_at, damage_reviewed_by,
                closed_out_at, closed_out_by,
                deposit_released_at, deposit_released_by
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
        )
        .bind(booking.id.to_string())
        .bind(&booking.reference)
        .bind(&booking.customer_name)
        .bind(&booking.vehicle_plate)
        .bind(booking.status.as_str())
        .bind(ts(booking.end_at))
        .bind(booking.returned_at.map(ts))
        .bind(booking.deposit_cents)
        .bind(booking.pickup_odometer_km as i64)
        .bind(booking.return_odometer_km.map(|v| v as i64))
        .bind(booking.fuel_level_eighths.map(|v| v as i64))
        .bind(booking.return_state.map(|s| s.as_str()))
        .bind(booking.late_fee_cents)
        .bind(
            booking
                .fee_approval
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(booking.damage_reviewed_at.map(ts))
        .bind(&booking.damage_reviewed_by)
        .bind(booking.closed_out_at.map(ts))
        .bind(&booking.closed_out_by)
        .bind(booking.deposit_released_at.map(ts))
        .bind(&booking.deposit_released_by)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let unique = err
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false);
                if unique {
                    Err(StorageError::DuplicateReference {
                        reference: booking.reference,
                    })
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn booking_by_reference(&self, reference: &str) -> Result<Booking, StorageError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE reference = ?1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::BookingNotFound {
                key: reference.to_string(),
            })?;
        let booking = row_to_booking(&row)?;
        booking.validate()?;
        Ok(booking)
    }

    async fn booking_by_id(&self, booking_id: Uuid) -> Result<Booking, StorageError> {
        self.fetch_booking_row(booking_id).await
    }

    async fn bookings_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM bookings
            WHERE status = 'active' AND end_at >= ?1 AND end_at < ?2
            ORDER BY end_at ASC
            "#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .fetch_all(&self.pool)
        .await?;

        let mut due = Vec::with_capacity(rows.len());
        for row in &rows {
            let booking = row_to_booking(row)?;
            booking.validate()?;
            due.push(booking);
        }
        Ok(due)
    }

    async fn apply_return_patch(
        &self,
        booking_id: Uuid,
        patch: ReturnPatch,
    ) -> Result<Booking, StorageError> {
        let mut booking = self.fetch_booking_row(booking_id).await?;
        patch.apply(&mut booking);
        booking.validate()?;

        // The whole patched row goes out in one UPDATE so a step's
        // fields can never land partially.
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                status = ?2,
                returned_at = ?3,
                return_odometer_km = ?4,
                fuel_level_eighths = ?5,
                return_state = ?6,
                late_fee_cents = ?7,
                fee_approval = ?8,
                damage_reviewed_at = ?9,
                damage_reviewed_by = ?10,
                closed_out_at = ?11,
                closed_out_by = ?12,
                deposit_released_at = ?13,
                deposit_released_by = ?14
            WHERE id = ?1
            "#,
        )
        .bind(booking.id.to_string())
        .bind(booking.status.as_str())
        .bind(booking.returned_at.map(ts))
        .bind(booking.return_odometer_km.map(|v| v as i64))
        .bind(booking.fuel_level_eighths.map(|v| v as i64))
        .bind(booking.return_state.map(|s| s.as_str()))
        .bind(booking.late_fee_cents)
        .bind(
            booking
                .fee_approval
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(booking.damage_reviewed_at.map(ts))
        .bind(&booking.damage_reviewed_by)
        .bind(booking.closed_out_at.map(ts))
        .bind(&booking.closed_out_by)
        .bind(booking.deposit_released_at.map(ts))
        .bind(&booking.deposit_released_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::BookingNotFound {
                key: booking_id.to_string(),
            });
        }
        Ok(booking)
    }

    async fn add_damage_report(&self, report: DamageReport) -> Result<(), StorageError> {
        // Booking must exist before attaching damage to it.
        self.fetch_booking_row(report.booking_id).await?;
        sqlx::query(
            r#"
            INSERT INTO damage_reports
                (id, booking_id, description, severity, estimated_cost_cents, noted_by, noted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(report.id.to_string())
        .bind(report.booking_id.to_string())
        .bind(&report.description)
        .bind(report.severity.as_str())
        .bind(report.estimated_cost_cents)
        .bind(&report.noted_by)
        .bind(ts(report.noted_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_damage_report(&self, report_id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM damage_reports WHERE id = ?1")
            .bind(report_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::DamageReportNotFound {
                id: report_id.to_string(),
            });
        }
        Ok(())
    }

    async fn damage_reports(&self, booking_id: Uuid) -> Result<Vec<DamageReport>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM damage_reports WHERE booking_id = ?1 ORDER BY noted_at ASC",
        )
        .bind(booking_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_damage).collect()
    }

    async fn append_step_record(&self, record: StepTransitionRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO step_audit
                (id, booking_id, step, from_state, to_state, operator, workstation, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.booking_id.to_string())
        .bind(record.step.as_str())
        .bind(record.from_state.as_str())
        .bind(record.to_state.as_str())
        .bind(&record.operator)
        .bind(&record.workstation)
        .bind(ts(record.recorded_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn step_records(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<StepTransitionRecord>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM step_audit WHERE booking_id = ?1 ORDER BY recorded_at ASC")
                .bind(booking_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| {
                Ok(StepTransitionRecord {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    booking_id: parse_uuid(&row.get::<String, _>("booking_id"))?,
                    step: parse_step(&row.get::<String, _>("step"))?,
                    from_state: parse_state(&row.get::<String, _>("from_state"))?,
                    to_state: parse_state(&row.get::<String, _>("to_state"))?,
                    operator: row.get("operator"),
                    workstation: row.get("workstation"),
                    recorded_at: parse_ts(&row.get::<String, _>("recorded_at"))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PhotoStore for SqliteStore {
    async fn add_photo(&self, photo: ReturnPhoto) -> Result<(), StorageError> {
        self.fetch_booking_row(photo.booking_id).await?;
        sqlx::query(
            r#"
            INSERT INTO return_photos (id, booking_id, phase, kind, label, taken_by, taken_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(photo.id.to_string())
        .bind(photo.booking_id.to_string())
        .bind(photo.phase.as_str())
        .bind(photo.kind.as_str())
        .bind(&photo.label)
        .bind(&photo.taken_by)
        .bind(ts(photo.taken_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn photos(&self, booking_id: Uuid) -> Result<Vec<ReturnPhoto>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM return_photos WHERE booking_id = ?1 ORDER BY taken_at ASC")
                .bind(booking_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| {
                Ok(ReturnPhoto {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    booking_id: parse_uuid(&row.get::<String, _>("booking_id"))?,
                    phase: parse_phase(&row.get::<String, _>("phase"))?,
                    kind: parse_kind(&row.get::<String, _>("kind"))?,
                    label: row.get("label"),
                    taken_by: row.get("taken_by"),
                    taken_at: parse_ts(&row.get::<String, _>("taken_at"))?,
                })
            })
            .collect()
    }

    async fn photo_count(
        &self,
        booking_id: Uuid,
        phase: PhotoPhase,
    ) -> Result<usize, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM return_photos WHERE booking_id = ?1 AND phase = ?2",
        )
        .bind(booking_id.to_string())
        .bind(phase.as_str())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("n");
        Ok(count as usize)
    }
}
