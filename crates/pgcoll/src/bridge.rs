//! Strings crossing the boundary, in both directions.
//!
//! Outbound text is held in a [`ForeignString`] for as long as the foreign
//! side may read it. Inbound text arrives as a buffer the foreign library
//! allocated; [`NativeString`] and [`NativeStringArray`] adopt it and hand
//! it back to the library's own free function exactly once.
//!
//! No other module in this crate touches a string pointer except through
//! these types.

#![allow(unsafe_code)]

use std::borrow::Cow;
use std::error::Error as StdError;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_char;
use std::ptr::NonNull;

use smallvec::SmallVec;

use crate::error::Error;
use crate::library::NativeLibrary;

/// Host text held a NUL byte, which a NUL-terminated buffer cannot carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingViolation {
    /// Byte offset of the first NUL.
    pub offset: usize,
    /// Byte length of the rejected text.
    pub len: usize,
}

impl EncodingViolation {
    /// A violation at `offset` in text of `len` bytes.
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }
}

impl fmt::Display for EncodingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "text contains a NUL byte at offset {} ({} bytes total)",
            self.offset, self.len
        )
    }
}

impl StdError for EncodingViolation {}

/// A host-owned, NUL-terminated copy of host text.
///
/// The buffer is freed when the value is dropped or [`release`](Self::release)d.
/// Outside this crate it is reachable only as a borrowed [`CStr`], so no
/// pointer into it can outlive the value:
///
/// ```compile_fail
/// let dangling = pgcoll::ForeignString::new("inventory").unwrap().as_ptr();
/// ```
///
/// Marshalling and release are logged at `trace` with the buffer address.
#[derive(PartialEq, Eq, Hash)]
pub struct ForeignString {
    inner: CString,
}

impl ForeignString {
    /// Copy `text` into a NUL-terminated buffer.
    ///
    /// The bytes are copied unchanged. Text containing a NUL is rejected.
    pub fn new(text: &str) -> Result<Self, EncodingViolation> {
        CString::new(text)
            .map(Self::adopt)
            .map_err(|e| EncodingViolation::new(e.nul_position(), text.len()))
    }

    fn adopt(inner: CString) -> Self {
        log::trace!("foreign string {:p} marshalled", inner.as_ptr());
        Self { inner }
    }

    /// Borrow as a C string.
    pub fn as_c_str(&self) -> &CStr {
        &self.inner
    }

    /// Pointer to the first byte, valid while `self` is alive.
    pub(crate) fn as_ptr(&self) -> *const c_char {
        self.inner.as_ptr()
    }

    /// Bytes of text, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Byte length, without the terminator.
    pub fn len(&self) -> usize {
        self.inner.as_bytes().len()
    }

    /// Whether the text is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.as_bytes().is_empty()
    }

    /// The text, for messages.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        self.inner.to_string_lossy()
    }

    /// Free the buffer now.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for ForeignString {
    fn clone(&self) -> Self {
        Self::adopt(self.inner.clone())
    }
}

impl Drop for ForeignString {
    fn drop(&mut self) {
        log::trace!("foreign string {:p} released", self.inner.as_ptr());
    }
}

impl fmt::Debug for ForeignString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignString").field(&self.inner).finish()
    }
}

impl TryFrom<&str> for ForeignString {
    type Error = EncodingViolation;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Self::new(text)
    }
}

/// A batch of [`ForeignString`]s with a contiguous array of their pointers,
/// for entry points that take `const char *const *`.
#[derive(Default)]
pub struct ForeignStrings {
    owned: SmallVec<[ForeignString; 8]>,
    ptrs: SmallVec<[*const c_char; 8]>,
}

impl ForeignStrings {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty batch with room for `n` strings.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            owned: SmallVec::with_capacity(n),
            ptrs: SmallVec::with_capacity(n),
        }
    }

    /// Copy `text` into the batch.
    pub fn push(&mut self, text: &str) -> Result<(), EncodingViolation> {
        let s = ForeignString::new(text)?;
        // The CString's heap buffer does not move when the owner does.
        self.ptrs.push(s.as_ptr());
        self.owned.push(s);
        Ok(())
    }

    /// The pointer array, valid while `self` is alive.
    pub(crate) fn as_ptrs(&self) -> &[*const c_char] {
        &self.ptrs
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }
}

impl fmt::Debug for ForeignStrings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.owned.iter()).finish()
    }
}

/// A string the foreign library allocated and handed to the host.
///
/// Dropping it returns the buffer through
/// [`NativeLibrary::free_string`], once.
pub struct NativeString<'lib, L: NativeLibrary + ?Sized> {
    lib: &'lib L,
    ptr: NonNull<c_char>,
}

impl<'lib, L: NativeLibrary + ?Sized> NativeString<'lib, L> {
    /// Adopt `ptr`. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a NUL-terminated string returned by `lib` that
    /// nothing else will free.
    pub unsafe fn from_raw(lib: &'lib L, ptr: *mut c_char) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { lib, ptr })
    }

    /// Borrow as a C string.
    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: from_raw's contract; the buffer lives until drop.
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
    }

    /// Borrow as UTF-8 text.
    pub fn to_str(&self, op: &'static str) -> Result<&str, Error> {
        self.as_c_str()
            .to_str()
            .map_err(|_| Error::InvalidUtf8 { op })
    }

    /// Copy into host memory and free the foreign buffer.
    pub fn into_string(self, op: &'static str) -> Result<String, Error> {
        self.to_str(op).map(str::to_owned)
    }
}

impl<L: NativeLibrary + ?Sized> Drop for NativeString<'_, L> {
    fn drop(&mut self) {
        // SAFETY: adopted in from_raw and never freed elsewhere; Drop runs once.
        unsafe { self.lib.free_string(self.ptr.as_ptr()) }
    }
}

impl<L: NativeLibrary + ?Sized> fmt::Debug for NativeString<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeString").field(&self.as_c_str()).finish()
    }
}

/// A string array the foreign library allocated and handed to the host.
///
/// Dropping it returns the array and every string in it through
/// [`NativeLibrary::free_string_array`], once.
pub struct NativeStringArray<'lib, L: NativeLibrary + ?Sized> {
    lib: &'lib L,
    ptr: NonNull<*mut c_char>,
    len: usize,
}

impl<'lib, L: NativeLibrary + ?Sized> NativeStringArray<'lib, L> {
    /// Adopt `ptr`/`len`. Returns `None` for null, which the library uses
    /// for an empty array.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or an array of `len` non-null NUL-terminated
    /// strings returned by `lib` that nothing else will free.
    pub unsafe fn from_raw(lib: &'lib L, ptr: *mut *mut c_char, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { lib, ptr, len })
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy every string into host memory, in order, and free the array.
    pub fn into_strings(self, op: &'static str) -> Result<Vec<String>, Error> {
        // SAFETY: from_raw's contract; the array lives until drop.
        let slots = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) };
        slots
            .iter()
            .map(|&s| {
                if s.is_null() {
                    return Err(Error::Status {
                        op,
                        code: pgcoll_ffi::PgcollStatus::InternalError as i32,
                    });
                }
                // SAFETY: non-null element of an array adopted in from_raw.
                let c = unsafe { CStr::from_ptr(s) };
                c.to_str()
                    .map(str::to_owned)
                    .map_err(|_| Error::InvalidUtf8 { op })
            })
            .collect()
    }
}

impl<L: NativeLibrary + ?Sized> Drop for NativeStringArray<'_, L> {
    fn drop(&mut self) {
        // SAFETY: adopted in from_raw and never freed elsewhere; Drop runs once.
        unsafe { self.lib.free_string_array(self.ptr.as_ptr(), self.len) }
    }
}
