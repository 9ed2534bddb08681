//! Config builder FFI: accumulate collection settings behind an opaque handle.
//!
//! C callers build a config incrementally, then pass the handle to
//! `pgcoll_collection_create` which consumes it.

use std::os::raw::c_char;
use std::sync::Mutex;

use crate::handle::HandleTable;
use crate::status::PgcollStatus;
use crate::store::{validate_database_url, DEFAULT_MAX_DOCUMENTS};
use crate::strings::borrow_str;

static CONFIGS: Mutex<HandleTable<ConfigBuilder>> = Mutex::new(HandleTable::new());

/// Internal config builder accumulated by FFI calls.
#[derive(Debug)]
pub(crate) struct ConfigBuilder {
    pub database_url: Option<String>,
    pub max_documents: u64,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            database_url: None,
            max_documents: DEFAULT_MAX_DOCUMENTS,
        }
    }
}

pub(crate) fn configs() -> &'static Mutex<HandleTable<ConfigBuilder>> {
    &CONFIGS
}

/// Create a new config builder. Returns handle via `out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_config_create(out: *mut u64) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return PgcollStatus::InvalidArgument as i32;
        }
        let handle = match ffi_lock!(CONFIGS).insert(ConfigBuilder::default()) {
            Some(h) => h,
            None => return PgcollStatus::AllocationFailed as i32,
        };
        // SAFETY: out is valid per caller contract.
        unsafe { *out = handle };
        PgcollStatus::Ok as i32
    })
}

/// Destroy a config builder that was never passed to
/// `pgcoll_collection_create`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_config_destroy(handle: u64) -> i32 {
    ffi_guard!({
        match ffi_lock!(CONFIGS).remove(handle) {
            Some(_) => PgcollStatus::Ok as i32,
            None => PgcollStatus::InvalidHandle as i32,
        }
    })
}

/// Set the database URL (`postgres://` or `postgresql://`). The string is
/// copied; the caller keeps ownership of `url`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_config_set_database_url(handle: u64, url: *const c_char) -> i32 {
    ffi_guard!({
        // SAFETY: url is a valid NUL-terminated string per caller contract.
        let url = match unsafe { borrow_str(url) } {
            Ok(s) => s,
            Err(status) => return status as i32,
        };
        if let Err(e) = validate_database_url(url) {
            return PgcollStatus::from(&e) as i32;
        }
        let mut table = ffi_lock!(CONFIGS);
        match table.get_mut(handle) {
            Some(cfg) => {
                cfg.database_url = Some(url.to_owned());
                PgcollStatus::Ok as i32
            }
            None => PgcollStatus::InvalidHandle as i32,
        }
    })
}

/// Set the document capacity. Zero is rejected.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_config_set_max_documents(handle: u64, max_documents: u64) -> i32 {
    ffi_guard!({
        if max_documents == 0 {
            return PgcollStatus::ConfigError as i32;
        }
        let mut table = ffi_lock!(CONFIGS);
        match table.get_mut(handle) {
            Some(cfg) => {
                cfg.max_documents = max_documents;
                PgcollStatus::Ok as i32
            }
            None => PgcollStatus::InvalidHandle as i32,
        }
    })
}
