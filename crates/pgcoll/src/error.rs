//! Host-side errors and status-code mapping with recovery hints.

use std::error::Error as StdError;
use std::fmt;

use pgcoll_ffi::PgcollStatus;

use crate::bridge::EncodingViolation;

/// Errors surfaced by collection handles and sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Text held a NUL byte and was rejected before crossing the boundary.
    Encoding(EncodingViolation),
    /// The foreign library returned the null handle from create.
    ///
    /// Nothing was allocated, so there is nothing to destroy.
    AllocationFailure {
        /// Name the collection was requested under.
        name: String,
    },
    /// The foreign library did not recognize a handle this crate believed
    /// live. Indicates the handle table and the host disagree; the handle is
    /// never retried.
    InvalidHandle {
        /// The operation that was refused.
        op: &'static str,
    },
    /// Any other non-zero status.
    Status {
        /// The operation that failed.
        op: &'static str,
        /// The raw status code.
        code: i32,
    },
    /// The foreign library returned a string that is not UTF-8.
    InvalidUtf8 {
        /// The operation that produced it.
        op: &'static str,
    },
}

impl Error {
    /// The foreign status behind this error, if it came from one.
    pub fn status(&self) -> Option<PgcollStatus> {
        match self {
            Self::InvalidHandle { .. } => Some(PgcollStatus::InvalidHandle),
            Self::Status { code, .. } => PgcollStatus::from_code(*code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "{e}"),
            Self::AllocationFailure { name } => write!(
                f,
                "collection {name:?} could not be created (null handle)\n  \
                 Hint: names must be 1 to 63 bytes; otherwise the library is out of memory \
                 or handle slots."
            ),
            Self::InvalidHandle { op } => write!(
                f,
                "{op}: collection handle is not live in the foreign library"
            ),
            Self::Status { op, code } => {
                let (msg, hint) = error_detail(*code);
                write!(f, "{op} failed: pgcoll error {code}: {msg}\n  Hint: {hint}")
            }
            Self::InvalidUtf8 { op } => write!(f, "{op}: foreign library returned non-UTF-8 text"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodingViolation> for Error {
    fn from(e: EncodingViolation) -> Self {
        Self::Encoding(e)
    }
}

/// Check an FFI status code for operation `op`.
pub(crate) fn check_status(op: &'static str, code: i32) -> Result<(), Error> {
    match code {
        x if x == PgcollStatus::Ok as i32 => Ok(()),
        x if x == PgcollStatus::InvalidHandle as i32 => Err(Error::InvalidHandle { op }),
        code => Err(Error::Status { op, code }),
    }
}

/// Returns `(message, recovery_hint)` for each FFI status code.
fn error_detail(code: i32) -> (&'static str, &'static str) {
    match PgcollStatus::from_code(code) {
        Some(PgcollStatus::Ok) => ("success", "None needed."),
        Some(PgcollStatus::InvalidHandle) => (
            "invalid handle (already destroyed?)",
            "The collection was deleted. Open a new one instead of reusing the old handle.",
        ),
        Some(PgcollStatus::InvalidArgument) => (
            "invalid argument",
            "Document ids must be non-empty and all text must be valid UTF-8.",
        ),
        Some(PgcollStatus::InvalidName) => (
            "invalid collection name",
            "Collection names must be between 1 and 63 bytes.",
        ),
        Some(PgcollStatus::AllocationFailed) => (
            "allocation failed",
            "The collection is at its document limit or the library is out of memory. \
             Raise max_documents or delete documents.",
        ),
        Some(PgcollStatus::NotFound) => (
            "document not found",
            "Check the document id; upsert it first.",
        ),
        Some(PgcollStatus::Archived) => (
            "collection is archived",
            "Archived collections are read-only. Write to a new collection.",
        ),
        Some(PgcollStatus::ConfigError) => (
            "configuration error",
            "database_url must start with postgres:// or postgresql://, \
             and max_documents must be at least 1.",
        ),
        Some(PgcollStatus::InternalError) => (
            "internal error",
            "A previous call panicked and poisoned library state. Restart the process.",
        ),
        Some(PgcollStatus::Panicked) => (
            "panic caught at the FFI boundary",
            "This is a bug in the native library; the collection may be inconsistent.",
        ),
        None => (
            "unknown pgcoll error",
            "An unrecognized status was returned. This may indicate a version mismatch \
             between this crate and the native library.",
        ),
    }
}
