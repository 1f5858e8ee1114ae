// Backlot Library - Vehicle Return Processing
// This exposes the core components for testing and integration

pub mod booking;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fees;
pub mod returns;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use booking::{Booking, BookingStatus, DamageReport, DamageSeverity};
pub use config::{config, init_config, BacklotConfig, StorageBackend};
pub use coordinator::{
    ReturnCoordinator, ReturnFlowError, ReturnSession, SessionLock, StepOutcome, StepPayload,
};
pub use error::{PreconditionError, ValidationError};
pub use fees::approval::{fee_state, ApprovalKind, FeeApproval, FeeState, MIN_REASON_CHARS};
pub use fees::late_fee::{minutes_late, LateFeePolicy};
pub use returns::classifier::{classify, ReturnProfile, EXCEPTION_PHOTO_FLOOR};
pub use returns::completion::{effective_state, ReturnCompletion};
pub use returns::gating::{can_access_step, is_step_complete, step_gates, StepGate};
pub use returns::states::{current_step, ReturnState, ReturnStep};
pub use store::{
    ChangeEvent, ChangeFeed, FileStore, IdentityService, MemoryStore, Operator, PhotoKind,
    PhotoPhase, PhotoStore, RecordStore, ReturnPatch, ReturnPhoto, SessionCache, SessionRecord,
    StaticIdentity, StepTransitionRecord, StorageError,
};
#[cfg(feature = "database")]
pub use store::SqliteStore;
pub use telemetry::{
    create_return_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
