//! Standard vs exception classification for a return session.

use serde::{Deserialize, Serialize};

use crate::booking::DamageReport;

/// Photos required on file before an exception return may complete the
/// evidence step. Standard returns have no floor.
pub const EXCEPTION_PHOTO_FLOOR: usize = 4;

/// Processing profile of a return session.
///
/// Exception returns carry recorded damage or an assessed late fee and
/// get the stricter evidence and closeout requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReturnProfile {
    #[default]
    Standard,
    Exception,
}

impl ReturnProfile {
    pub fn is_exception(&self) -> bool {
        matches!(self, ReturnProfile::Exception)
    }

    /// Minimum photo count before the evidence step may complete.
    pub fn photo_floor(&self) -> usize {
        match self {
            ReturnProfile::Standard => 0,
            ReturnProfile::Exception => EXCEPTION_PHOTO_FLOOR,
        }
    }

    /// One-way ratchet: a session that has ever been classified as an
    /// exception stays one, even if the triggering damage entry is
    /// deleted afterwards. Conservative by construction so evidence
    /// requirements never loosen mid-session.
    pub fn ratchet(self, observed: ReturnProfile) -> ReturnProfile {
        if self.is_exception() || observed.is_exception() {
            ReturnProfile::Exception
        } else {
            ReturnProfile::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnProfile::Standard => "standard",
            ReturnProfile::Exception => "exception",
        }
    }
}

impl std::fmt::Display for ReturnProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a return from its current signals: any recorded damage
/// report or a positive assessed late fee makes it an exception.
pub fn classify(damage_reports: &[DamageReport], late_fee_cents: i64) -> ReturnProfile {
    if !damage_reports.is_empty() || late_fee_cents > 0 {
        ReturnProfile::Exception
    } else {
        ReturnProfile::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::DamageSeverity;
    use chrono::Utc;

    fn scratch_report() -> DamageReport {
        DamageReport {
            id: uuid::Uuid::new_v4(),
            booking_id: uuid::Uuid::new_v4(),
            description: "scratch on rear bumper".to_string(),
            severity: DamageSeverity::Cosmetic,
            estimated_cost_cents: 4500,
            noted_by: "gate-2".to_string(),
            noted_at: Utc::now(),
        }
    }

    #[test]
    fn clean_on_time_return_is_standard() {
        assert_eq!(classify(&[], 0), ReturnProfile::Standard);
    }

    #[test]
    fn damage_report_makes_exception() {
        assert_eq!(classify(&[scratch_report()], 0), ReturnProfile::Exception);
    }

    #[test]
    fn positive_late_fee_makes_exception() {
        assert_eq!(classify(&[], 3000), ReturnProfile::Exception);
    }

    #[test]
    fn waived_fee_without_damage_is_standard() {
        // A zero fee means no fee was assessed.
        assert_eq!(classify(&[], 0), ReturnProfile::Standard);
    }

    #[test]
    fn ratchet_never_reverts() {
        let profile = ReturnProfile::Standard.ratchet(ReturnProfile::Exception);
        assert_eq!(profile, ReturnProfile::Exception);
        // Damage report removed: classification signal goes quiet, the
        // session profile does not.
        let profile = profile.ratchet(classify(&[], 0));
        assert_eq!(profile, ReturnProfile::Exception);
    }

    #[test]
    fn photo_floor_tightens_for_exceptions() {
        assert_eq!(ReturnProfile::Standard.photo_floor(), 0);
        assert_eq!(
            ReturnProfile::Exception.photo_floor(),
            EXCEPTION_PHOTO_FLOOR
        );
    }
}
