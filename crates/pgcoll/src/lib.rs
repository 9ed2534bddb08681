//! Safe host-side access to pgcoll collections.
//!
//! The foreign library owns every collection; this crate only ever holds
//! an opaque handle to one. Three pieces keep that arrangement sound:
//!
//! - [`bridge`]: every string crossing the boundary, in either direction,
//!   is owned by a value that releases it exactly once.
//! - [`Collection`]: exists only while its handle is live. It cannot be
//!   copied, and dropping or [`close`](Collection::close)-ing it destroys
//!   the handle exactly once.
//! - [`Session`]: create, use, destroy, with cleanup on every exit path.
//!
//! All foreign calls go through the [`NativeLibrary`] trait; [`Linked`] is
//! the implementation backed by the `pgcoll-ffi` crate.
//!
//! # Threading
//!
//! A [`Collection`] may be moved to another thread but not shared: every
//! foreign operation takes `&mut self`, and the type is not `Sync`.
//!
//! # Examples
//!
//! ```
//! use pgcoll::with_collection;
//!
//! let count = with_collection("inventory", |c| {
//!     c.upsert_document("doc1", "test1")?;
//!     c.document_count()
//! })
//! .map_err(|e: pgcoll::Error| e.to_string())?;
//! assert_eq!(count, 1);
//! # Ok::<(), String>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod bridge;
pub mod collection;
pub mod config;
pub mod error;
pub mod library;
pub mod session;

pub use bridge::{EncodingViolation, ForeignString, ForeignStrings, NativeString, NativeStringArray};
pub use collection::Collection;
pub use config::CollectionConfig;
pub use error::Error;
pub use library::{ForeignConfig, Linked, NativeLibrary, RawHandle, NULL_HANDLE};
pub use session::{with_collection, Session};
