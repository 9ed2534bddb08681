//! Owning wrapper around a live foreign collection handle.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU64;
use std::ptr;

use pgcoll_ffi::PgcollStatus;

use crate::bridge::{ForeignString, ForeignStrings, NativeString, NativeStringArray};
use crate::config::CollectionConfig;
use crate::error::{check_status, Error};
use crate::library::{Linked, NativeLibrary, RawHandle};

/// A collection owned by the foreign library, reachable through a live
/// handle.
///
/// A `Collection` exists only between a successful create and its destroy:
/// a failed create returns an error instead of a value, and the handle is
/// destroyed exactly once, by [`close`](Self::close) or on drop. It is
/// neither `Clone` nor `Sync`.
pub struct Collection<L: NativeLibrary = Linked> {
    lib: L,
    // None only after destroy, which consumes or drops the value.
    handle: Option<NonZeroU64>,
    label: String,
    _not_sync: PhantomData<Cell<()>>,
}

impl Collection<Linked> {
    /// Create a collection named `name` in the linked library.
    pub fn new(name: &str) -> Result<Self, Error> {
        Self::open(Linked, name)
    }
}

impl<L: NativeLibrary> Collection<L> {
    /// Create a collection named `name` with the library's defaults.
    pub fn open(lib: L, name: &str) -> Result<Self, Error> {
        let name = ForeignString::new(name)?;
        Self::open_foreign(lib, &name, None)
    }

    /// Create a collection named `name` with explicit settings.
    pub fn open_with(lib: L, name: &str, config: &CollectionConfig) -> Result<Self, Error> {
        let name = ForeignString::new(name)?;
        Self::open_foreign(lib, &name, Some(config))
    }

    /// Create from an already-marshalled name, which must outlive the call.
    pub(crate) fn open_foreign(
        lib: L,
        name: &ForeignString,
        config: Option<&CollectionConfig>,
    ) -> Result<Self, Error> {
        let raw = match config {
            None => lib.collection_new(name.as_c_str(), None),
            Some(config) => {
                let marshalled = config.marshal()?;
                let mut raw: RawHandle = crate::library::NULL_HANDLE;
                let status = lib.collection_create(name.as_c_str(), marshalled.as_foreign(), &mut raw);
                if status == PgcollStatus::InvalidName as i32
                    || status == PgcollStatus::AllocationFailed as i32
                {
                    raw = crate::library::NULL_HANDLE;
                } else {
                    check_status("collection_create", status)?;
                }
                raw
            }
        };

        let label = name.to_string_lossy().into_owned();
        match NonZeroU64::new(raw) {
            Some(handle) => {
                log::debug!("opened collection {label:?} (handle {raw:#x})");
                Ok(Self {
                    lib,
                    handle: Some(handle),
                    label,
                    _not_sync: PhantomData,
                })
            }
            None => {
                log::warn!("foreign library refused to create collection {label:?}");
                Err(Error::AllocationFailure { name: label })
            }
        }
    }

    fn live(&self, op: &'static str) -> Result<RawHandle, Error> {
        self.handle
            .map(NonZeroU64::get)
            .ok_or(Error::InvalidHandle { op })
    }

    /// [`check_status`], naming this collection if the library no longer
    /// recognizes its handle.
    fn check(&self, op: &'static str, handle: RawHandle, code: i32) -> Result<(), Error> {
        check_status(op, code).inspect_err(|e| {
            if matches!(e, Error::InvalidHandle { .. }) {
                log::error!(
                    "{op}: foreign library rejected handle {handle:#x} of live collection {:?}",
                    self.label
                );
            }
        })
    }

    /// The name this collection was opened under, without a foreign call.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The raw handle, for diagnostics.
    pub fn raw_handle(&self) -> RawHandle {
        self.handle.map_or(crate::library::NULL_HANDLE, NonZeroU64::get)
    }

    /// Insert or replace one document.
    pub fn upsert_document(&mut self, id: &str, body: &str) -> Result<(), Error> {
        const OP: &str = "upsert_document";
        let handle = self.live(OP)?;
        let id = ForeignString::new(id)?;
        let body = ForeignString::new(body)?;
        self.check(
            OP,
            handle,
            self.lib.upsert_document(handle, id.as_c_str(), body.as_c_str()),
        )
    }

    /// Insert or replace a batch of documents.
    ///
    /// Nothing is written if the batch would exceed the collection's
    /// capacity, or if any text holds a NUL.
    pub fn upsert_documents<I, K, V>(&mut self, docs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        const OP: &str = "upsert_documents";
        let handle = self.live(OP)?;
        let docs = docs.into_iter();
        let (lower, _) = docs.size_hint();
        let mut ids = ForeignStrings::with_capacity(lower);
        let mut bodies = ForeignStrings::with_capacity(lower);
        for (id, body) in docs {
            ids.push(id.as_ref())?;
            bodies.push(body.as_ref())?;
        }
        // SAFETY: both arrays have equal length and are borrowed from live
        // ForeignStrings for the whole call.
        #[allow(unsafe_code)]
        let status = unsafe { self.lib.upsert_documents(handle, ids.as_ptrs(), bodies.as_ptrs()) };
        self.check(OP, handle, status)
    }

    /// Fetch one document body; `None` if absent.
    pub fn get_document(&mut self, id: &str) -> Result<Option<String>, Error> {
        const OP: &str = "get_document";
        let handle = self.live(OP)?;
        let id = ForeignString::new(id)?;
        let mut out = ptr::null_mut();
        let status = self.lib.get_document(handle, id.as_c_str(), &mut out);
        // Adopt before looking at the status so the buffer is freed on every path.
        // SAFETY: `out` is null or a string this library just returned.
        #[allow(unsafe_code)]
        let body = unsafe { NativeString::from_raw(&self.lib, out) };
        if status == PgcollStatus::NotFound as i32 {
            return Ok(None);
        }
        self.check(OP, handle, status)?;
        match body {
            Some(body) => body.into_string(OP).map(Some),
            None => Err(Error::Status {
                op: OP,
                code: PgcollStatus::InternalError as i32,
            }),
        }
    }

    /// Every document body, in insertion order.
    pub fn get_documents(&mut self) -> Result<Vec<String>, Error> {
        const OP: &str = "get_documents";
        let handle = self.live(OP)?;
        let mut out = ptr::null_mut();
        let mut len = 0usize;
        let status = self.lib.get_documents(handle, &mut out, &mut len);
        // SAFETY: `out`/`len` are null or an array this library just returned.
        #[allow(unsafe_code)]
        let bodies = unsafe { NativeStringArray::from_raw(&self.lib, out, len) };
        self.check(OP, handle, status)?;
        match bodies {
            Some(bodies) => bodies.into_strings(OP),
            None if len == 0 => Ok(Vec::new()),
            None => Err(Error::Status {
                op: OP,
                code: PgcollStatus::InternalError as i32,
            }),
        }
    }

    /// Remove a document. Returns `false` if it was absent.
    pub fn delete_document(&mut self, id: &str) -> Result<bool, Error> {
        const OP: &str = "delete_document";
        let handle = self.live(OP)?;
        let id = ForeignString::new(id)?;
        match self.lib.delete_document(handle, id.as_c_str()) {
            s if s == PgcollStatus::NotFound as i32 => Ok(false),
            s => self.check(OP, handle, s).map(|()| true),
        }
    }

    /// Number of stored documents.
    pub fn document_count(&mut self) -> Result<u64, Error> {
        const OP: &str = "document_count";
        let handle = self.live(OP)?;
        let mut count = 0;
        self.check(OP, handle, self.lib.document_count(handle, &mut count))?;
        Ok(count)
    }

    /// The collection's name, as the foreign library reports it.
    pub fn name(&mut self) -> Result<String, Error> {
        const OP: &str = "collection_name";
        let handle = self.live(OP)?;
        let mut out = ptr::null_mut();
        let status = self.lib.collection_name(handle, &mut out);
        // SAFETY: `out` is null or a string this library just returned.
        #[allow(unsafe_code)]
        let name = unsafe { NativeString::from_raw(&self.lib, out) };
        self.check(OP, handle, status)?;
        match name {
            Some(name) => name.into_string(OP),
            None => Err(Error::Status {
                op: OP,
                code: PgcollStatus::InternalError as i32,
            }),
        }
    }

    /// Make the collection read-only. Idempotent.
    pub fn archive(&mut self) -> Result<(), Error> {
        const OP: &str = "archive";
        let handle = self.live(OP)?;
        self.check(OP, handle, self.lib.archive(handle))
    }

    /// Destroy the collection, reporting the foreign status.
    pub fn close(mut self) -> Result<(), Error> {
        self.destroy()
    }

    fn destroy(&mut self) -> Result<(), Error> {
        match self.handle.take() {
            Some(handle) => {
                log::debug!(
                    "closing collection {:?} (handle {:#x})",
                    self.label,
                    handle.get()
                );
                let status = self.lib.collection_delete(handle.get());
                self.check("collection_delete", handle.get(), status)
            }
            None => Ok(()),
        }
    }
}

impl<L: NativeLibrary> Drop for Collection<L> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::error!("dropping collection {:?}: {e}", self.label);
        }
    }
}

impl<L: NativeLibrary> fmt::Debug for Collection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("label", &self.label)
            .field("handle", &format_args!("{:#x}", self.raw_handle()))
            .finish_non_exhaustive()
    }
}
