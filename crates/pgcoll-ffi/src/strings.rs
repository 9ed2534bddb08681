//! String marshalling across the C boundary.
//!
//! Incoming strings are borrowed for the duration of one call and never
//! retained by pointer. Outgoing strings are allocated here with
//! [`CString::into_raw`] and must come back through [`pgcoll_string_free`]
//! (or [`pgcoll_string_array_free`] for arrays) exactly once; the caller
//! must not release them with its own allocator.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::status::PgcollStatus;

/// Borrow a caller-supplied NUL-terminated string as UTF-8.
///
/// Null pointers and non-UTF-8 bytes are `InvalidArgument`.
///
/// # Safety
///
/// A non-null `ptr` must point to a NUL-terminated buffer that stays valid
/// and unmodified for `'a`.
#[allow(unsafe_code)]
pub(crate) unsafe fn borrow_str<'a>(ptr: *const c_char) -> Result<&'a str, PgcollStatus> {
    if ptr.is_null() {
        return Err(PgcollStatus::InvalidArgument);
    }
    // SAFETY: non-null and NUL-terminated per caller contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| PgcollStatus::InvalidArgument)
}

/// Like [`borrow_str`] but a null pointer means "not supplied".
#[allow(unsafe_code)]
pub(crate) unsafe fn borrow_optional_str<'a>(
    ptr: *const c_char,
) -> Result<Option<&'a str>, PgcollStatus> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: forwarded caller contract.
    unsafe { borrow_str(ptr) }.map(Some)
}

/// Copy `s` into a new library-owned C string.
///
/// Every stored string arrived through [`borrow_str`] and so cannot hold an
/// interior NUL; one appearing anyway is an `InternalError`.
pub(crate) fn to_owned_c_string(s: &str) -> Result<CString, PgcollStatus> {
    CString::new(s).map_err(|_| PgcollStatus::InternalError)
}

/// Hand an array of owned strings to the caller.
///
/// Returns a null pointer for an empty array. Free the result with
/// [`pgcoll_string_array_free`] using the returned length.
pub(crate) fn into_raw_array(strings: Vec<CString>) -> (*mut *mut c_char, usize) {
    if strings.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let ptrs: Box<[*mut c_char]> = strings.into_iter().map(CString::into_raw).collect();
    let len = ptrs.len();
    (Box::into_raw(ptrs) as *mut *mut c_char, len)
}

/// Free a string returned by any `pgcoll_*` function. Null is a no-op.
///
/// Passing a pointer twice, or one not allocated by this library, is
/// undefined behavior.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_string_free(s: *mut c_char) {
    ffi_guard_or!((), {
        if !s.is_null() {
            // SAFETY: s came from CString::into_raw and is freed once.
            drop(unsafe { CString::from_raw(s) });
        }
    })
}

/// Free a string array returned by `pgcoll_collection_get_documents`,
/// including every string in it. `len` must be the length the library
/// reported. Null is a no-op.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn pgcoll_string_array_free(strings: *mut *mut c_char, len: usize) {
    ffi_guard_or!((), {
        if strings.is_null() {
            return;
        }
        // SAFETY: strings/len came from into_raw_array and are freed once.
        let ptrs: Box<[*mut c_char]> =
            unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(strings, len)) };
        for s in ptrs.iter().copied() {
            pgcoll_string_free(s);
        }
    })
}
