//! The seam between safe host code and the foreign collection library.
//!
//! [`NativeLibrary`] mirrors the C entry points one-to-one, with borrowed
//! [`CStr`]s and `&mut` out-parameters in place of raw pointers where the
//! type system can express the contract. It is an `unsafe` trait because the
//! host's memory safety depends on implementors honoring the ownership rules
//! below.

use std::ffi::CStr;
use std::os::raw::c_char;

use pgcoll_ffi::PgcollStatus;

/// Opaque collection handle as the foreign side issues it.
pub type RawHandle = u64;

/// The null handle: a failed create.
pub const NULL_HANDLE: RawHandle = pgcoll_ffi::PGCOLL_NULL_HANDLE;

/// Collection settings after marshalling, borrowed for one create call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForeignConfig<'a> {
    /// Database URL, if any.
    pub database_url: Option<&'a CStr>,
    /// Document capacity; `None` keeps the library default.
    pub max_documents: Option<u64>,
}

/// A foreign collection library.
///
/// Status-returning methods return `0` on success and a negative
/// [`PgcollStatus`] code otherwise.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - a non-null handle from [`collection_new`](Self::collection_new) or
///   [`collection_create`](Self::collection_create) stays valid until it
///   is passed to [`collection_delete`](Self::collection_delete);
/// - every string written through an out-parameter is NUL-terminated,
///   stays valid and unmodified until the host passes it to
///   [`free_string`](Self::free_string) (or, for arrays,
///   [`free_string_array`](Self::free_string_array)), and is never freed
///   by the library on its own;
/// - borrowed arguments are not retained after the call returns.
///
/// The library need not be thread-safe per handle; the host never uses one
/// handle from two threads at once.
#[allow(unsafe_code)]
pub unsafe trait NativeLibrary {
    /// Create a collection; [`NULL_HANDLE`] on failure.
    fn collection_new(&self, name: &CStr, database_url: Option<&CStr>) -> RawHandle;

    /// Create a collection with explicit settings, writing the handle to
    /// `out` on success.
    fn collection_create(&self, name: &CStr, config: ForeignConfig<'_>, out: &mut RawHandle)
        -> i32;

    /// Destroy a collection.
    fn collection_delete(&self, handle: RawHandle) -> i32;

    /// Insert or replace one document.
    fn upsert_document(&self, handle: RawHandle, id: &CStr, body: &CStr) -> i32;

    /// Insert or replace `ids.len()` documents.
    ///
    /// # Safety
    ///
    /// `ids` and `bodies` must have equal length and every pointer must be
    /// a valid NUL-terminated string for the duration of the call.
    unsafe fn upsert_documents(
        &self,
        handle: RawHandle,
        ids: &[*const c_char],
        bodies: &[*const c_char],
    ) -> i32;

    /// Fetch one document body into a library-owned string.
    fn get_document(&self, handle: RawHandle, id: &CStr, out: &mut *mut c_char) -> i32;

    /// Fetch every document body into a library-owned string array.
    fn get_documents(
        &self,
        handle: RawHandle,
        out: &mut *mut *mut c_char,
        out_len: &mut usize,
    ) -> i32;

    /// Remove one document.
    fn delete_document(&self, handle: RawHandle, id: &CStr) -> i32;

    /// Number of documents.
    fn document_count(&self, handle: RawHandle, out: &mut u64) -> i32;

    /// The collection's name, as a library-owned string.
    fn collection_name(&self, handle: RawHandle, out: &mut *mut c_char) -> i32;

    /// Mark the collection read-only.
    fn archive(&self, handle: RawHandle) -> i32;

    /// Release a string this library returned.
    ///
    /// # Safety
    ///
    /// `s` must be null or a string this library returned that has not
    /// been freed yet.
    unsafe fn free_string(&self, s: *mut c_char);

    /// Release a string array this library returned, and its strings.
    ///
    /// # Safety
    ///
    /// `strings`/`len` must be null or exactly an array this library
    /// returned that has not been freed yet.
    unsafe fn free_string_array(&self, strings: *mut *mut c_char, len: usize);
}

#[allow(unsafe_code)]
unsafe impl<L: NativeLibrary + ?Sized> NativeLibrary for &L {
    fn collection_new(&self, name: &CStr, database_url: Option<&CStr>) -> RawHandle {
        (**self).collection_new(name, database_url)
    }

    fn collection_create(
        &self,
        name: &CStr,
        config: ForeignConfig<'_>,
        out: &mut RawHandle,
    ) -> i32 {
        (**self).collection_create(name, config, out)
    }

    fn collection_delete(&self, handle: RawHandle) -> i32 {
        (**self).collection_delete(handle)
    }

    fn upsert_document(&self, handle: RawHandle, id: &CStr, body: &CStr) -> i32 {
        (**self).upsert_document(handle, id, body)
    }

    unsafe fn upsert_documents(
        &self,
        handle: RawHandle,
        ids: &[*const c_char],
        bodies: &[*const c_char],
    ) -> i32 {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).upsert_documents(handle, ids, bodies) }
    }

    fn get_document(&self, handle: RawHandle, id: &CStr, out: &mut *mut c_char) -> i32 {
        (**self).get_document(handle, id, out)
    }

    fn get_documents(
        &self,
        handle: RawHandle,
        out: &mut *mut *mut c_char,
        out_len: &mut usize,
    ) -> i32 {
        (**self).get_documents(handle, out, out_len)
    }

    fn delete_document(&self, handle: RawHandle, id: &CStr) -> i32 {
        (**self).delete_document(handle, id)
    }

    fn document_count(&self, handle: RawHandle, out: &mut u64) -> i32 {
        (**self).document_count(handle, out)
    }

    fn collection_name(&self, handle: RawHandle, out: &mut *mut c_char) -> i32 {
        (**self).collection_name(handle, out)
    }

    fn archive(&self, handle: RawHandle) -> i32 {
        (**self).archive(handle)
    }

    unsafe fn free_string(&self, s: *mut c_char) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).free_string(s) }
    }

    unsafe fn free_string_array(&self, strings: *mut *mut c_char, len: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).free_string_array(strings, len) }
    }
}

/// The `pgcoll-ffi` library linked into this process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Linked;

/// Owns a foreign config handle until it is consumed by a create call.
struct ConfigHandle(Option<u64>);

impl ConfigHandle {
    fn create() -> Result<Self, i32> {
        let mut handle = 0;
        match pgcoll_ffi::pgcoll_config_create(&mut handle) {
            0 => Ok(Self(Some(handle))),
            status => Err(status),
        }
    }

    fn get(&self) -> u64 {
        self.0.unwrap_or(NULL_HANDLE)
    }

    /// Give up ownership; the create call destroys the config.
    fn consume(mut self) -> u64 {
        self.0.take().unwrap_or(NULL_HANDLE)
    }
}

impl Drop for ConfigHandle {
    fn drop(&mut self) {
        if let Some(h) = self.0.take() {
            pgcoll_ffi::pgcoll_config_destroy(h);
        }
    }
}

fn apply(config: &ConfigHandle, settings: ForeignConfig<'_>) -> i32 {
    if let Some(url) = settings.database_url {
        let status = pgcoll_ffi::pgcoll_config_set_database_url(config.get(), url.as_ptr());
        if status != PgcollStatus::Ok as i32 {
            return status;
        }
    }
    if let Some(max) = settings.max_documents {
        return pgcoll_ffi::pgcoll_config_set_max_documents(config.get(), max);
    }
    PgcollStatus::Ok as i32
}

#[allow(unsafe_code)]
unsafe impl NativeLibrary for Linked {
    fn collection_new(&self, name: &CStr, database_url: Option<&CStr>) -> RawHandle {
        pgcoll_ffi::pgcoll_collection_new(
            name.as_ptr(),
            database_url.map_or(std::ptr::null(), CStr::as_ptr),
        )
    }

    fn collection_create(
        &self,
        name: &CStr,
        config: ForeignConfig<'_>,
        out: &mut RawHandle,
    ) -> i32 {
        let handle = match ConfigHandle::create() {
            Ok(h) => h,
            Err(status) => return status,
        };
        let status = apply(&handle, config);
        if status != PgcollStatus::Ok as i32 {
            return status;
        }
        pgcoll_ffi::pgcoll_collection_create(name.as_ptr(), handle.consume(), out)
    }

    fn collection_delete(&self, handle: RawHandle) -> i32 {
        pgcoll_ffi::pgcoll_collection_delete(handle)
    }

    fn upsert_document(&self, handle: RawHandle, id: &CStr, body: &CStr) -> i32 {
        pgcoll_ffi::pgcoll_collection_upsert_document(handle, id.as_ptr(), body.as_ptr())
    }

    unsafe fn upsert_documents(
        &self,
        handle: RawHandle,
        ids: &[*const c_char],
        bodies: &[*const c_char],
    ) -> i32 {
        if ids.len() != bodies.len() {
            return PgcollStatus::InvalidArgument as i32;
        }
        pgcoll_ffi::pgcoll_collection_upsert_documents(
            handle,
            ids.as_ptr(),
            bodies.as_ptr(),
            ids.len(),
        )
    }

    fn get_document(&self, handle: RawHandle, id: &CStr, out: &mut *mut c_char) -> i32 {
        pgcoll_ffi::pgcoll_collection_get_document(handle, id.as_ptr(), out)
    }

    fn get_documents(
        &self,
        handle: RawHandle,
        out: &mut *mut *mut c_char,
        out_len: &mut usize,
    ) -> i32 {
        pgcoll_ffi::pgcoll_collection_get_documents(handle, out, out_len)
    }

    fn delete_document(&self, handle: RawHandle, id: &CStr) -> i32 {
        pgcoll_ffi::pgcoll_collection_delete_document(handle, id.as_ptr())
    }

    fn document_count(&self, handle: RawHandle, out: &mut u64) -> i32 {
        pgcoll_ffi::pgcoll_collection_document_count(handle, out)
    }

    fn collection_name(&self, handle: RawHandle, out: &mut *mut c_char) -> i32 {
        pgcoll_ffi::pgcoll_collection_name(handle, out)
    }

    fn archive(&self, handle: RawHandle) -> i32 {
        pgcoll_ffi::pgcoll_collection_archive(handle)
    }

    unsafe fn free_string(&self, s: *mut c_char) {
        pgcoll_ffi::pgcoll_string_free(s);
    }

    unsafe fn free_string_array(&self, strings: *mut *mut c_char, len: usize) {
        pgcoll_ffi::pgcoll_string_array_free(strings, len);
    }
}
