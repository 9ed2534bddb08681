//! C FFI surface for pgcoll collections.
//!
//! Every resource handed across the boundary is an opaque `u64` handle
//! (`0` is the null handle) or a NUL-terminated string this library
//! allocated and only this library frees. Panics never unwind into the
//! caller: each exported function runs under [`std::panic::catch_unwind`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run an FFI body returning an `i32` status, converting a panic into
/// `PgcollStatus::Panicked`.
macro_rules! ffi_guard {
    ($body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| -> i32 { $body })) {
            Ok(code) => code,
            Err(_) => {
                ::log::error!("panic caught at the pgcoll FFI boundary");
                $crate::status::PgcollStatus::Panicked as i32
            }
        }
    };
}

/// Like [`ffi_guard!`] for functions whose return value is not a status
/// code; a panic yields `$fallback`.
macro_rules! ffi_guard_or {
    ($fallback:expr, $body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => {
                ::log::error!("panic caught at the pgcoll FFI boundary");
                $fallback
            }
        }
    };
}

/// Lock a mutex inside an [`ffi_guard!`] body, returning
/// `PgcollStatus::InternalError` from the body if it is poisoned.
macro_rules! ffi_lock {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => {
                ::log::error!("poisoned lock: {}", stringify!($mutex));
                return $crate::status::PgcollStatus::InternalError as i32;
            }
        }
    };
}

pub mod collection;
pub mod config;
pub(crate) mod handle;
pub mod status;
pub(crate) mod store;
pub mod strings;

pub use collection::{
    pgcoll_collection_archive, pgcoll_collection_create, pgcoll_collection_delete,
    pgcoll_collection_delete_document, pgcoll_collection_document_count,
    pgcoll_collection_get_document, pgcoll_collection_get_documents, pgcoll_collection_name,
    pgcoll_collection_new, pgcoll_collection_upsert_document,
    pgcoll_collection_upsert_documents,
};
pub use config::{
    pgcoll_config_create, pgcoll_config_destroy, pgcoll_config_set_database_url,
    pgcoll_config_set_max_documents,
};
pub use handle::PGCOLL_NULL_HANDLE;
pub use status::PgcollStatus;
pub use store::{DEFAULT_MAX_DOCUMENTS, MAX_NAME_LEN};
pub use strings::{pgcoll_string_array_free, pgcoll_string_free};
