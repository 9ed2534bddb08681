//! C-compatible status codes.
//!
//! [`PgcollStatus`] is a `repr(i32)` enum covering every error condition
//! an exported function can report. Conversion from the document store's
//! [`StoreError`] is provided.

use crate::store::StoreError;

/// C-compatible status code returned by all FFI functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PgcollStatus {
    /// Success.
    Ok = 0,
    /// Handle is null, invalid, or was already destroyed.
    InvalidHandle = -1,
    /// An argument is null, not UTF-8, or otherwise invalid.
    InvalidArgument = -2,
    /// Collection name is empty or too long.
    InvalidName = -3,
    /// The collection or handle table could not allocate.
    AllocationFailed = -4,
    /// No document with the requested id.
    NotFound = -5,
    /// The collection is archived and refuses writes.
    Archived = -6,
    /// Configuration value rejected.
    ConfigError = -7,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -20,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl PgcollStatus {
    /// Map a raw code back to a known status, if it is one.
    pub fn from_code(code: i32) -> Option<Self> {
        [
            Self::Ok,
            Self::InvalidHandle,
            Self::InvalidArgument,
            Self::InvalidName,
            Self::AllocationFailed,
            Self::NotFound,
            Self::Archived,
            Self::ConfigError,
            Self::InternalError,
            Self::Panicked,
        ]
        .into_iter()
        .find(|s| *s as i32 == code)
    }
}

impl From<&StoreError> for PgcollStatus {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::InvalidName { .. } => PgcollStatus::InvalidName,
            StoreError::InvalidDatabaseUrl => PgcollStatus::ConfigError,
            StoreError::EmptyId => PgcollStatus::InvalidArgument,
            StoreError::CapacityExceeded { .. } => PgcollStatus::AllocationFailed,
            StoreError::NotFound => PgcollStatus::NotFound,
            StoreError::Archived => PgcollStatus::Archived,
        }
    }
}
