//! Session snapshot and the per-booking workstation lock.

use std::fs::File;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use thiserror::Error;

use crate::booking::{Booking, DamageReport};
use crate::fees::approval::FeeState;
use crate::returns::classifier::ReturnProfile;
use crate::returns::gating::StepGate;
use crate::returns::states::{ReturnState, ReturnStep};
use crate::store::StepTransitionRecord;

/// Everything the status view shows for one return, assembled by the
/// coordinator from a single load.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnSession {
    pub booking: Booking,
    /// Effective lifecycle state (stored state, or the legacy
    /// inference for rows that predate it).
    pub state: ReturnState,
    pub profile: ReturnProfile,
    pub fee: FeeState,
    /// Minutes past the contractual end, once the vehicle is back.
    pub minutes_late: Option<i64>,
    /// Return-phase photos on file; pickup photos are not counted.
    pub photo_count: usize,
    pub damage_reports: Vec<DamageReport>,
    pub gates: [StepGate; 5],
    pub next_step: Option<ReturnStep>,
    /// Most recent audit entries, newest last.
    pub recent_activity: Vec<StepTransitionRecord>,
}

#[derive(Debug, Error)]
pub enum SessionLockError {
    #[error("booking {reference} is being processed at another workstation")]
    Held { reference: String },

    #[error("could not set up the session lock: {0}")]
    Io(#[from] std::io::Error),
}

/// One workstation per return at a time, enforced with an advisory
/// file lock. Dropping the lock releases it; a crashed process
/// releases it through the OS.
pub struct SessionLock {
    _guard: RwLockWriteGuard<'static, File>,
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock for `reference`, failing fast when another
    /// workstation already holds it.
    pub fn acquire(lock_dir: &Path, reference: &str) -> Result<Self, SessionLockError> {
        std::fs::create_dir_all(lock_dir)?;
        let file_name = format!("{}.lock", sanitize(reference));
        let path = lock_dir.join(file_name);
        let lock_file = File::create(&path)?;
        // The lock must outlive this function; leak keeps the guard's
        // 'static lifetime honest for the life of the process.
        let lock = Box::leak(Box::new(RwLock::new(lock_file)));
        let guard = lock.try_write().map_err(|_| SessionLockError::Held {
            reference: reference.to_string(),
        })?;
        Ok(Self {
            _guard: guard,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn sanitize(reference: &str) -> String {
    reference
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}
