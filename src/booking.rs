//! Typed booking record.
//!
//! Storage backends deserialize into this struct and run [`Booking::validate`]
//! once at the read boundary, so everything past the store layer works
//! with checked fields instead of raw key-value records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fees::approval::FeeApproval;
use crate::returns::states::ReturnState;

/// Rental agreement status. `Completed` is written together with the
/// terminal `deposit_settled` return state in one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Active,
    Completed,
    Void,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Void => "void",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageSeverity {
    Cosmetic,
    Moderate,
    Severe,
}

impl DamageSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageSeverity::Cosmetic => "cosmetic",
            DamageSeverity::Moderate => "moderate",
            DamageSeverity::Severe => "severe",
        }
    }
}

impl std::fmt::Display for DamageSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Damage noted against a booking during intake or review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub description: String,
    pub severity: DamageSeverity,
    pub estimated_cost_cents: i64,
    pub noted_by: String,
    pub noted_at: DateTime<Utc>,
}

/// One rental contract as persisted. Optional fields fill in as the
/// return progresses; rows written before the `return_state` column
/// existed deserialize with `return_state: None` and fall back to the
/// derived completion view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Human-facing contract reference, unique per branch (e.g. "R-20441").
    pub reference: String,
    pub customer_name: String,
    pub vehicle_plate: String,
    #[serde(default)]
    pub status: BookingStatus,
    /// Contractual end of the rental.
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub returned_at: Option<DateTime<Utc>>,
    pub deposit_cents: i64,
    pub pickup_odometer_km: u32,
    #[serde(default)]
    pub return_odometer_km: Option<u32>,
    /// Fuel gauge in eighths of a tank, 0 through 8.
    #[serde(default)]
    pub fuel_level_eighths: Option<u8>,
    #[serde(default)]
    pub return_state: Option<ReturnState>,
    /// Late fee assessed at intake, in cents. `None` until intake runs.
    #[serde(default)]
    pub late_fee_cents: Option<i64>,
    #[serde(default)]
    pub fee_approval: Option<FeeApproval>,
    #[serde(default)]
    pub damage_reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub damage_reviewed_by: Option<String>,
    #[serde(default)]
    pub closed_out_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_out_by: Option<String>,
    #[serde(default)]
    pub deposit_released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deposit_released_by: Option<String>,
}

impl Booking {
    /// Fresh contract with the fields known at pickup time.
    pub fn new(
        reference: impl Into<String>,
        customer_name: impl Into<String>,
        vehicle_plate: impl Into<String>,
        end_at: DateTime<Utc>,
        deposit_cents: i64,
        pickup_odometer_km: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: reference.into(),
            customer_name: customer_name.into(),
            vehicle_plate: vehicle_plate.into(),
            status: BookingStatus::Active,
            end_at,
            returned_at: None,
            deposit_cents,
            pickup_odometer_km,
            return_odometer_km: None,
            fuel_level_eighths: None,
            return_state: None,
            late_fee_cents: None,
            fee_approval: None,
            damage_reviewed_at: None,
            damage_reviewed_by: None,
            closed_out_at: None,
            closed_out_by: None,
            deposit_released_at: None,
            deposit_released_by: None,
        }
    }

    pub fn with_return_state(mut self, state: ReturnState) -> Self {
        self.return_state = Some(state);
        self
    }

    pub fn with_returned_at(mut self, returned_at: DateTime<Utc>) -> Self {
        self.returned_at = Some(returned_at);
        self
    }

    /// Checked once when a record leaves a storage backend. Catches rows
    /// corrupted by hand edits or partial writes from older tooling.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reference.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "reference" });
        }
        if self.customer_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "customer_name",
            });
        }
        if self.deposit_cents < 0 {
            return Err(ValidationError::NegativeAmount {
                amount_cents: self.deposit_cents,
            });
        }
        if let Some(fee) = self.late_fee_cents {
            if fee < 0 {
                return Err(ValidationError::NegativeAmount { amount_cents: fee });
            }
        }
        if let Some(fuel) = self.fuel_level_eighths {
            if fuel > 8 {
                return Err(ValidationError::FuelOutOfRange { value: fuel });
            }
        }
        if let Some(return_km) = self.return_odometer_km {
            if return_km < self.pickup_odometer_km {
                return Err(ValidationError::OdometerRegression {
                    pickup_km: self.pickup_odometer_km,
                    return_km,
                });
            }
        }
        Ok(())
    }

    /// Overdue means past the contractual end and not yet returned.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.returned_at.is_none() && now > self.end_at
    }
}
