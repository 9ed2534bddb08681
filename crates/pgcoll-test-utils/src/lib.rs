//! Test utilities for pgcoll development.
//!
//! [`RecordingLibrary`] is an in-memory stand-in for the foreign library.
//! It behaves like `pgcoll-ffi` for every entry point, and additionally
//! records each call, counts creates and destroys, tracks every string it
//! hands out until it is freed, and notes any contract violation instead
//! of crashing on it: operating on a null, dead or unknown handle, or
//! freeing a string it does not own.
//!
//! [`capture`] keeps `log` records in memory so tests can assert on them.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod capture;

use pgcoll::{ForeignConfig, NativeLibrary, RawHandle, NULL_HANDLE};
use pgcoll_ffi::{PgcollStatus, DEFAULT_MAX_DOCUMENTS, MAX_NAME_LEN};

/// Log target of the `trace` record [`RecordingLibrary`] emits per call.
pub const CALL_TARGET: &str = "pgcoll_test_utils::call";

/// One call into the library, in the order it was made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    New { name: String },
    Create { name: String },
    Delete(RawHandle),
    Upsert(RawHandle),
    UpsertMany(RawHandle, usize),
    Get(RawHandle),
    GetAll(RawHandle),
    DeleteDocument(RawHandle),
    Count(RawHandle),
    Name(RawHandle),
    Archive(RawHandle),
    FreeString,
    FreeStringArray(usize),
}

impl Call {
    /// The handle this call targeted, if it targets one.
    pub fn handle(&self) -> Option<RawHandle> {
        match self {
            Self::Delete(h)
            | Self::Upsert(h)
            | Self::UpsertMany(h, _)
            | Self::Get(h)
            | Self::GetAll(h)
            | Self::DeleteDocument(h)
            | Self::Count(h)
            | Self::Name(h)
            | Self::Archive(h) => Some(*h),
            _ => None,
        }
    }
}

struct MockCollection {
    name: String,
    documents: Vec<(String, String)>,
    max_documents: u64,
    archived: bool,
}

impl MockCollection {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|(k, _)| k == id)
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_handle: RawHandle,
    live: HashMap<RawHandle, MockCollection>,
    dead: HashSet<RawHandle>,
    creates: usize,
    destroys: usize,
    violations: Vec<String>,
    // Pointer addresses of strings and arrays handed out and not yet freed.
    strings: HashSet<usize>,
    arrays: HashMap<usize, usize>,
    string_frees: usize,
    fail_creates: bool,
    fail_destroys: bool,
    invalid_utf8: bool,
}

impl State {
    fn record(&mut self, call: Call) {
        log::trace!(target: CALL_TARGET, "{call:?}");
        self.calls.push(call);
    }

    fn target(&mut self, call: Call) -> Result<&mut MockCollection, i32> {
        let handle = call.handle().unwrap_or(NULL_HANDLE);
        self.record(call.clone());
        if handle == NULL_HANDLE {
            self.violations.push(format!("{call:?} on the null handle"));
        } else if self.dead.contains(&handle) {
            self.violations.push(format!("{call:?} on a destroyed handle"));
        } else if !self.live.contains_key(&handle) {
            self.violations.push(format!("{call:?} on an unknown handle"));
        }
        self.live
            .get_mut(&handle)
            .ok_or(PgcollStatus::InvalidHandle as i32)
    }

    fn allocate(&mut self, name: &CStr, max_documents: u64) -> RawHandle {
        let name = match name.to_str() {
            Ok(n) if !n.is_empty() && n.len() <= MAX_NAME_LEN => n.to_owned(),
            _ => return NULL_HANDLE,
        };
        if self.fail_creates {
            return NULL_HANDLE;
        }
        self.next_handle += 1;
        let handle = self.next_handle;
        self.live.insert(
            handle,
            MockCollection {
                name,
                documents: Vec::new(),
                max_documents,
                archived: false,
            },
        );
        self.creates += 1;
        handle
    }

    fn hand_out(&mut self, text: &[u8]) -> *mut c_char {
        let ptr = CString::new(text)
            .unwrap_or_default()
            .into_raw();
        self.strings.insert(ptr as usize);
        ptr
    }
}

/// A recording in-memory implementation of [`NativeLibrary`].
///
/// Share it with code under test by reference: `&RecordingLibrary` also
/// implements [`NativeLibrary`].
#[derive(Default)]
pub struct RecordingLibrary {
    state: Mutex<State>,
}

impl RecordingLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later create return the null handle.
    pub fn set_fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    /// Make every later destroy report `InternalError` after destroying.
    pub fn set_fail_destroys(&self, fail: bool) {
        self.state().fail_destroys = fail;
    }

    /// Make every later string out-parameter hold invalid UTF-8.
    pub fn set_invalid_utf8(&self, invalid: bool) {
        self.state().invalid_utf8 = invalid;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Successful creates.
    pub fn creates(&self) -> usize {
        self.state().creates
    }

    /// Destroys of live handles.
    pub fn destroys(&self) -> usize {
        self.state().destroys
    }

    pub fn live_handles(&self) -> Vec<RawHandle> {
        self.state().live.keys().copied().collect()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    /// Strings and arrays handed out and not yet freed.
    pub fn outstanding_strings(&self) -> usize {
        let state = self.state();
        state.strings.len() + state.arrays.len()
    }

    /// Successful `free_string` calls.
    pub fn string_frees(&self) -> usize {
        self.state().string_frees
    }

    /// Panics unless every create was destroyed, every string freed, and
    /// nothing violated the contract.
    pub fn assert_clean(&self) {
        let state = self.state();
        assert!(
            state.violations.is_empty(),
            "contract violations: {:?}",
            state.violations
        );
        assert_eq!(state.creates, state.destroys, "creates != destroys");
        assert!(state.live.is_empty(), "live handles remain");
        assert!(
            state.strings.is_empty() && state.arrays.is_empty(),
            "{} strings and {} arrays never freed",
            state.strings.len(),
            state.arrays.len()
        );
    }
}

#[allow(unsafe_code)]
unsafe impl NativeLibrary for RecordingLibrary {
    fn collection_new(&self, name: &CStr, _database_url: Option<&CStr>) -> RawHandle {
        let mut state = self.state();
        state.record(Call::New {
            name: name.to_string_lossy().into_owned(),
        });
        state.allocate(name, DEFAULT_MAX_DOCUMENTS)
    }

    fn collection_create(
        &self,
        name: &CStr,
        config: ForeignConfig<'_>,
        out: &mut RawHandle,
    ) -> i32 {
        let mut state = self.state();
        state.record(Call::Create {
            name: name.to_string_lossy().into_owned(),
        });
        *out = NULL_HANDLE;
        let url_ok = config.database_url.is_none_or(|url| {
            let url = url.to_bytes();
            url.starts_with(b"postgres://") || url.starts_with(b"postgresql://")
        });
        if !url_ok || config.max_documents == Some(0) {
            return PgcollStatus::ConfigError as i32;
        }
        match state.allocate(name, config.max_documents.unwrap_or(DEFAULT_MAX_DOCUMENTS)) {
            NULL_HANDLE if state.fail_creates => PgcollStatus::AllocationFailed as i32,
            NULL_HANDLE => PgcollStatus::InvalidName as i32,
            handle => {
                *out = handle;
                PgcollStatus::Ok as i32
            }
        }
    }

    fn collection_delete(&self, handle: RawHandle) -> i32 {
        let mut state = self.state();
        if let Err(status) = state.target(Call::Delete(handle)) {
            return status;
        }
        state.live.remove(&handle);
        state.dead.insert(handle);
        state.destroys += 1;
        if state.fail_destroys {
            PgcollStatus::InternalError as i32
        } else {
            PgcollStatus::Ok as i32
        }
    }

    fn upsert_document(&self, handle: RawHandle, id: &CStr, body: &CStr) -> i32 {
        let mut state = self.state();
        let c = match state.target(Call::Upsert(handle)) {
            Ok(c) => c,
            Err(status) => return status,
        };
        let (Ok(id), Ok(body)) = (id.to_str(), body.to_str()) else {
            return PgcollStatus::InvalidArgument as i32;
        };
        if id.is_empty() {
            return PgcollStatus::InvalidArgument as i32;
        }
        if c.archived {
            return PgcollStatus::Archived as i32;
        }
        match c.position(id) {
            Some(i) => c.documents[i].1 = body.to_owned(),
            None if c.documents.len() as u64 >= c.max_documents => {
                return PgcollStatus::AllocationFailed as i32
            }
            None => c.documents.push((id.to_owned(), body.to_owned())),
        }
        PgcollStatus::Ok as i32
    }

    unsafe fn upsert_documents(
        &self,
        handle: RawHandle,
        ids: &[*const c_char],
        bodies: &[*const c_char],
    ) -> i32 {
        let mut state = self.state();
        let c = match state.target(Call::UpsertMany(handle, ids.len())) {
            Ok(c) => c,
            Err(status) => return status,
        };
        if ids.len() != bodies.len() {
            return PgcollStatus::InvalidArgument as i32;
        }
        let mut docs = Vec::with_capacity(ids.len());
        for (&id, &body) in ids.iter().zip(bodies) {
            // SAFETY: caller guarantees valid NUL-terminated strings.
            let (id, body) = unsafe { (CStr::from_ptr(id), CStr::from_ptr(body)) };
            match (id.to_str(), body.to_str()) {
                (Ok(id), Ok(body)) if !id.is_empty() => docs.push((id, body)),
                _ => return PgcollStatus::InvalidArgument as i32,
            }
        }
        if c.archived {
            return PgcollStatus::Archived as i32;
        }
        let mut fresh: Vec<&str> = docs
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| c.position(id).is_none())
            .collect();
        fresh.sort_unstable();
        fresh.dedup();
        if (c.documents.len() + fresh.len()) as u64 > c.max_documents {
            return PgcollStatus::AllocationFailed as i32;
        }
        for (id, body) in docs {
            match c.position(id) {
                Some(i) => c.documents[i].1 = body.to_owned(),
                None => c.documents.push((id.to_owned(), body.to_owned())),
            }
        }
        PgcollStatus::Ok as i32
    }

    fn get_document(&self, handle: RawHandle, id: &CStr, out: &mut *mut c_char) -> i32 {
        let mut state = self.state();
        *out = std::ptr::null_mut();
        let c = match state.target(Call::Get(handle)) {
            Ok(c) => c,
            Err(status) => return status,
        };
        let Ok(id) = id.to_str() else {
            return PgcollStatus::InvalidArgument as i32;
        };
        let body = match c.position(id) {
            Some(i) => c.documents[i].1.clone().into_bytes(),
            None => return PgcollStatus::NotFound as i32,
        };
        let body = if state.invalid_utf8 { vec![0xff] } else { body };
        *out = state.hand_out(&body);
        PgcollStatus::Ok as i32
    }

    fn get_documents(
        &self,
        handle: RawHandle,
        out: &mut *mut *mut c_char,
        out_len: &mut usize,
    ) -> i32 {
        let mut state = self.state();
        *out = std::ptr::null_mut();
        *out_len = 0;
        let bodies: Vec<String> = match state.target(Call::GetAll(handle)) {
            Ok(c) => c.documents.iter().map(|(_, b)| b.clone()).collect(),
            Err(status) => return status,
        };
        if bodies.is_empty() {
            return PgcollStatus::Ok as i32;
        }
        let ptrs: Box<[*mut c_char]> = bodies
            .iter()
            .map(|b| CString::new(b.as_bytes()).unwrap_or_default().into_raw())
            .collect();
        let len = ptrs.len();
        let array = Box::into_raw(ptrs) as *mut *mut c_char;
        state.arrays.insert(array as usize, len);
        *out = array;
        *out_len = len;
        PgcollStatus::Ok as i32
    }

    fn delete_document(&self, handle: RawHandle, id: &CStr) -> i32 {
        let mut state = self.state();
        let c = match state.target(Call::DeleteDocument(handle)) {
            Ok(c) => c,
            Err(status) => return status,
        };
        if c.archived {
            return PgcollStatus::Archived as i32;
        }
        match id.to_str().ok().and_then(|id| c.position(id)) {
            Some(i) => {
                c.documents.remove(i);
                PgcollStatus::Ok as i32
            }
            None => PgcollStatus::NotFound as i32,
        }
    }

    fn document_count(&self, handle: RawHandle, out: &mut u64) -> i32 {
        let mut state = self.state();
        match state.target(Call::Count(handle)) {
            Ok(c) => {
                *out = c.documents.len() as u64;
                PgcollStatus::Ok as i32
            }
            Err(status) => status,
        }
    }

    fn collection_name(&self, handle: RawHandle, out: &mut *mut c_char) -> i32 {
        let mut state = self.state();
        *out = std::ptr::null_mut();
        let name = match state.target(Call::Name(handle)) {
            Ok(c) => c.name.clone().into_bytes(),
            Err(status) => return status,
        };
        let name = if state.invalid_utf8 { vec![0xff] } else { name };
        *out = state.hand_out(&name);
        PgcollStatus::Ok as i32
    }

    fn archive(&self, handle: RawHandle) -> i32 {
        let mut state = self.state();
        match state.target(Call::Archive(handle)) {
            Ok(c) => {
                c.archived = true;
                PgcollStatus::Ok as i32
            }
            Err(status) => status,
        }
    }

    unsafe fn free_string(&self, s: *mut c_char) {
        let mut state = self.state();
        state.record(Call::FreeString);
        if s.is_null() {
            return;
        }
        if !state.strings.remove(&(s as usize)) {
            state
                .violations
                .push(format!("free_string on a pointer not owned: {s:p}"));
            return;
        }
        state.string_frees += 1;
        // SAFETY: `s` came from CString::into_raw in hand_out and was
        // outstanding until now.
        drop(unsafe { CString::from_raw(s) });
    }

    unsafe fn free_string_array(&self, strings: *mut *mut c_char, len: usize) {
        let mut state = self.state();
        state.record(Call::FreeStringArray(len));
        if strings.is_null() {
            return;
        }
        match state.arrays.remove(&(strings as usize)) {
            Some(n) if n == len => {}
            Some(n) => {
                state.arrays.insert(strings as usize, n);
                state
                    .violations
                    .push(format!("free_string_array with len {len}, expected {n}"));
                return;
            }
            None => {
                state
                    .violations
                    .push(format!("free_string_array on a pointer not owned: {strings:p}"));
                return;
            }
        }
        // SAFETY: `strings`/`len` came from Box::into_raw in get_documents,
        // and each element from CString::into_raw.
        let ptrs = unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(strings, len)) };
        for &p in ptrs.iter() {
            drop(unsafe { CString::from_raw(p) });
        }
    }
}
