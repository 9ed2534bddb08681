//! Collection lifecycle FFI: create, operate, delete.
//!
//! Uses per-collection `Arc<Mutex<DocumentStore>>` so the global
//! `COLLECTIONS` table lock is only held briefly (for handle lookup).
//! Different collections can be used from different threads; a single
//! handle is serialized by its own lock.

use std::os::raw::c_char;
use std::sync::{Arc, Mutex};

use crate::config::{configs, ConfigBuilder};
use crate::handle::{HandleTable, PGCOLL_NULL_HANDLE};
use crate::status::PgcollStatus;
use crate::store::DocumentStore;
use crate::strings::{borrow_optional_str, borrow_str, into_raw_array, to_owned_c_string};

type CollectionArc = Arc<Mutex<DocumentStore>>;

static COLLECTIONS: Mutex<HandleTable<CollectionArc>> = Mutex::new(HandleTable::new());

/// Clone the Arc for a collection handle, briefly locking the global table.
///
/// Returns `None` if the handle is invalid or the mutex is poisoned.
fn get_collection(handle: u64) -> Option<CollectionArc> {
    COLLECTIONS.lock().ok()?.get(handle).cloned()
}

/// Validate the name, build the store and register it.
#[allow(unsafe_code)]
fn open(name: *const c_char, builder: ConfigBuilder) -> Result<u64, PgcollStatus> {
    // SAFETY: name is a valid NUL-terminated string per caller contract.
    let name = unsafe { borrow_str(name) }?;
    let store = DocumentStore::new(name, builder.database_url, builder.max_documents)
        .map_err(|e| {
            log::warn!("refusing collection {name:?}: {e}");
            PgcollStatus::from(&e)
        })?;
    log::debug!(
        "collection {:?} opened (database url {})",
        store.name(),
        if store.database_url().is_some() { "set" } else { "unset" }
    );
    COLLECTIONS
        .lock()
        .map_err(|_| PgcollStatus::InternalError)?
        .insert(Arc::new(Mutex::new(store)))
        .ok_or(PgcollStatus::AllocationFailed)
}

/// Create a collection named `name`.
///
/// `database_url` may be null. Returns the null handle (`0`) on any
/// failure: null or non-UTF-8 arguments, an empty or over-long name, a
/// rejected URL, or an exhausted handle table. Destroy a non-null result
/// with [`pgcoll_collection_delete`] exactly once.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_new(name: *const c_char, database_url: *const c_char) -> u64 {
    ffi_guard_or!(PGCOLL_NULL_HANDLE, {
        // SAFETY: database_url is null or a valid C string per caller contract.
        let database_url = match unsafe { borrow_optional_str(database_url) } {
            Ok(url) => url.map(str::to_owned),
            Err(_) => return PGCOLL_NULL_HANDLE,
        };
        let builder = ConfigBuilder {
            database_url,
            ..ConfigBuilder::default()
        };
        open(name, builder).unwrap_or(PGCOLL_NULL_HANDLE)
    })
}

/// Create a collection from a config handle. Consumes the config.
///
/// On success, writes the collection handle to `out` and returns `Ok`.
/// On failure, the config is still consumed (destroyed) and `out` is
/// left untouched.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_create(
    name: *const c_char,
    config_handle: u64,
    out: *mut u64,
) -> i32 {
    ffi_guard!({
        // Remove the config first so it is consumed on every path.
        let builder = match ffi_lock!(configs()).remove(config_handle) {
            Some(b) => b,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        if out.is_null() {
            return PgcollStatus::InvalidArgument as i32;
        }
        match open(name, builder) {
            Ok(handle) => {
                // SAFETY: out is valid per caller contract.
                unsafe { *out = handle };
                PgcollStatus::Ok as i32
            }
            Err(status) => status as i32,
        }
    })
}

/// Delete a collection, releasing all of its resources.
///
/// Afterwards the handle is dead: every function given it returns
/// `InvalidHandle`, including a second delete.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_delete(handle: u64) -> i32 {
    ffi_guard!({
        // Release the table lock before waiting on the collection's own.
        let removed = ffi_lock!(COLLECTIONS).remove(handle);
        match removed {
            Some(arc) => {
                if let Ok(store) = arc.lock() {
                    log::debug!("collection {:?} deleted", store.name());
                }
                PgcollStatus::Ok as i32
            }
            None => PgcollStatus::InvalidHandle as i32,
        }
    })
}

/// Insert or replace one document. Both strings are copied.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_upsert_document(
    handle: u64,
    id: *const c_char,
    body: *const c_char,
) -> i32 {
    ffi_guard!({
        // SAFETY: id and body are valid C strings per caller contract.
        let (id, body) = match unsafe { (borrow_str(id), borrow_str(body)) } {
            (Ok(id), Ok(body)) => (id, body),
            _ => return PgcollStatus::InvalidArgument as i32,
        };
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let mut store = ffi_lock!(arc);
        match store.upsert(id, body) {
            Ok(()) => PgcollStatus::Ok as i32,
            Err(e) => PgcollStatus::from(&e) as i32,
        }
    })
}

/// Insert or replace `n` documents; `ids[i]` pairs with `bodies[i]`.
///
/// The batch is all-or-nothing: if it would exceed the collection's
/// capacity, nothing is written and `AllocationFailed` is returned.
/// Both arrays may be null when `n == 0`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_upsert_documents(
    handle: u64,
    ids: *const *const c_char,
    bodies: *const *const c_char,
    n: usize,
) -> i32 {
    ffi_guard!({
        if n > 0 && (ids.is_null() || bodies.is_null()) {
            return PgcollStatus::InvalidArgument as i32;
        }
        let docs: Vec<(&str, &str)> = if n == 0 {
            Vec::new()
        } else {
            // SAFETY: non-null, and the caller guarantees both arrays hold
            // n valid C strings.
            let id_ptrs = unsafe { std::slice::from_raw_parts(ids, n) };
            let body_ptrs = unsafe { std::slice::from_raw_parts(bodies, n) };
            let docs: Result<Vec<_>, PgcollStatus> = id_ptrs
                .iter()
                .zip(body_ptrs)
                .map(|(&id, &body)| unsafe { Ok((borrow_str(id)?, borrow_str(body)?)) })
                .collect();
            match docs {
                Ok(docs) => docs,
                Err(_) => return PgcollStatus::InvalidArgument as i32,
            }
        };

        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let mut store = ffi_lock!(arc);
        match store.upsert_many(&docs) {
            Ok(()) => PgcollStatus::Ok as i32,
            Err(e) => PgcollStatus::from(&e) as i32,
        }
    })
}

/// Fetch one document body.
///
/// On `Ok`, writes a library-owned string to `*out`; free it with
/// `pgcoll_string_free`. On any error (including `NotFound`) writes null.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_get_document(
    handle: u64,
    id: *const c_char,
    out: *mut *mut c_char,
) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return PgcollStatus::InvalidArgument as i32;
        }
        // SAFETY: out is valid per caller contract.
        unsafe { *out = std::ptr::null_mut() };
        // SAFETY: id is a valid C string per caller contract.
        let id = match unsafe { borrow_str(id) } {
            Ok(id) => id,
            Err(status) => return status as i32,
        };
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let store = ffi_lock!(arc);
        let body = match store.get(id).map(to_owned_c_string) {
            Ok(Ok(body)) => body,
            Ok(Err(status)) => return status as i32,
            Err(e) => return PgcollStatus::from(&e) as i32,
        };
        unsafe { *out = body.into_raw() };
        PgcollStatus::Ok as i32
    })
}

/// Fetch every document body in insertion order.
///
/// On `Ok`, writes an array of `*out_len` library-owned strings to `*out`
/// (null when the collection is empty); free it with
/// `pgcoll_string_array_free(*out, *out_len)`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_get_documents(
    handle: u64,
    out: *mut *mut *mut c_char,
    out_len: *mut usize,
) -> i32 {
    ffi_guard!({
        if out.is_null() || out_len.is_null() {
            return PgcollStatus::InvalidArgument as i32;
        }
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let store = ffi_lock!(arc);
        let bodies: Result<Vec<_>, _> = store.bodies().map(to_owned_c_string).collect();
        let (ptr, len) = match bodies {
            Ok(bodies) => into_raw_array(bodies),
            Err(status) => return status as i32,
        };
        // SAFETY: out and out_len are valid per caller contract.
        unsafe {
            *out = ptr;
            *out_len = len;
        }
        PgcollStatus::Ok as i32
    })
}

/// Remove one document. Returns `NotFound` if it was absent.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_delete_document(handle: u64, id: *const c_char) -> i32 {
    ffi_guard!({
        // SAFETY: id is a valid C string per caller contract.
        let id = match unsafe { borrow_str(id) } {
            Ok(id) => id,
            Err(status) => return status as i32,
        };
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let mut store = ffi_lock!(arc);
        match store.delete(id) {
            Ok(()) => PgcollStatus::Ok as i32,
            Err(e) => PgcollStatus::from(&e) as i32,
        }
    })
}

/// Number of documents, written to `*out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_document_count(handle: u64, out: *mut u64) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return PgcollStatus::InvalidArgument as i32;
        }
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let store = ffi_lock!(arc);
        unsafe { *out = store.len() };
        PgcollStatus::Ok as i32
    })
}

/// Copy of the collection's name, written to `*out`; free it with
/// `pgcoll_string_free`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_name(handle: u64, out: *mut *mut c_char) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return PgcollStatus::InvalidArgument as i32;
        }
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let store = ffi_lock!(arc);
        let name = match to_owned_c_string(store.name()) {
            Ok(name) => name,
            Err(status) => return status as i32,
        };
        unsafe { *out = name.into_raw() };
        PgcollStatus::Ok as i32
    })
}

/// Mark the collection read-only. Idempotent. Later writes return
/// `Archived`; reads keep working.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_collection_archive(handle: u64) -> i32 {
    ffi_guard!({
        let arc = match get_collection(handle) {
            Some(arc) => arc,
            None => return PgcollStatus::InvalidHandle as i32,
        };
        let mut store = ffi_lock!(arc);
        if !store.is_archived() {
            store.archive();
            log::debug!("collection {:?} archived", store.name());
        }
        PgcollStatus::Ok as i32
    })
}
