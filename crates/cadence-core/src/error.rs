// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types shared across the scheduler engine.

use thiserror::Error;

/// Validation failure raised synchronously by `schedule` and
/// `schedule_template`. No record is created when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The group key was empty or whitespace only.
    #[error("[SCHED_BLANK_GROUP] task group must not be blank")]
    BlankGroup,
    /// The initial delay must be at least one tick.
    #[error("[SCHED_INITIAL_DELAY] initial delay must be > 0, got {0}")]
    InvalidInitialDelay(u32),
    /// The periodic delay must be `-1` (one-shot) or strictly positive.
    #[error("[SCHED_PERIODIC_DELAY] periodic delay must be -1 or > 0, got {0}")]
    InvalidPeriodicDelay(i32),
}

/// Failure while encoding or restoring persisted scheduler state.
#[derive(Debug, Error)]
pub enum PersistError {
    /// CBOR encoding failed.
    #[error("[PERSIST_ENCODE] {0}")]
    Encode(String),
    /// CBOR decoding failed or the bytes were not a valid snapshot.
    #[error("[PERSIST_DECODE] {0}")]
    Decode(String),
    /// No decoder was registered for the persisted task kind.
    #[error("[PERSIST_UNKNOWN_KIND] no task codec registered for kind `{0}`")]
    UnknownTaskKind(String),
    /// A decoder was registered twice for the same task kind.
    #[error("[PERSIST_DUPLICATE_KIND] task codec already registered for kind `{0}`")]
    DuplicateTaskKind(&'static str),
    /// A persisted record violates the scheduling invariants.
    #[error("[PERSIST_INVALID_RECORD] {0}")]
    InvalidRecord(#[from] ScheduleError),
    /// A one-shot record claimed to have completed its first execution.
    #[error("[PERSIST_ONE_SHOT_PROGRESS] one-shot record in group `{0}` is marked executed")]
    OneShotMarkedExecuted(String),
}

/// Failure raised by a holder asked to run a named operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The holder class does not define the requested operation.
    #[error("[HOLDER_UNKNOWN_OP] `{class}` has no operation `{operation}`")]
    Unknown {
        /// Class name of the holder that rejected the call.
        class: &'static str,
        /// Operation identifier that was requested.
        operation: String,
    },
}
