//! In-memory document store backing each collection handle.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;

/// Longest collection name accepted, in bytes (PostgreSQL's identifier limit).
pub const MAX_NAME_LEN: usize = 63;

/// Document capacity of a collection created without an explicit limit.
pub const DEFAULT_MAX_DOCUMENTS: u64 = 1_000_000;

/// Errors from document store operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The collection name is empty or longer than [`MAX_NAME_LEN`].
    InvalidName {
        /// Why the name was refused.
        reason: &'static str,
    },
    /// The database URL does not use a `postgres` scheme.
    InvalidDatabaseUrl,
    /// A document id was empty.
    EmptyId,
    /// The write would exceed the collection's document limit.
    CapacityExceeded {
        /// The configured limit.
        max: u64,
    },
    /// No document with the requested id.
    NotFound,
    /// The collection is archived and no longer accepts writes.
    Archived,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { reason } => write!(f, "invalid collection name: {reason}"),
            Self::InvalidDatabaseUrl => write!(f, "database url must use postgres:// or postgresql://"),
            Self::EmptyId => write!(f, "document id is empty"),
            Self::CapacityExceeded { max } => write!(f, "collection holds at most {max} documents"),
            Self::NotFound => write!(f, "document not found"),
            Self::Archived => write!(f, "collection is archived"),
        }
    }
}

impl Error for StoreError {}

/// Check a database URL's scheme.
pub(crate) fn validate_database_url(url: &str) -> Result<(), StoreError> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(())
    } else {
        Err(StoreError::InvalidDatabaseUrl)
    }
}

/// A named, insertion-ordered map of document id to body.
#[derive(Debug)]
pub(crate) struct DocumentStore {
    name: String,
    database_url: Option<String>,
    documents: IndexMap<String, String>,
    max_documents: u64,
    archived: bool,
}

impl DocumentStore {
    pub fn new(
        name: &str,
        database_url: Option<String>,
        max_documents: u64,
    ) -> Result<Self, StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidName { reason: "empty" });
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::InvalidName {
                reason: "longer than 63 bytes",
            });
        }
        if let Some(url) = &database_url {
            validate_database_url(url)?;
        }
        Ok(Self {
            name: name.to_owned(),
            database_url,
            documents: IndexMap::new(),
            max_documents,
            archived: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.documents.len() as u64
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn archive(&mut self) {
        self.archived = true;
    }

    pub fn get(&self, id: &str) -> Result<&str, StoreError> {
        self.documents
            .get(id)
            .map(String::as_str)
            .ok_or(StoreError::NotFound)
    }

    /// Document bodies in insertion order.
    pub fn bodies(&self) -> impl ExactSizeIterator<Item = &str> {
        self.documents.values().map(String::as_str)
    }

    pub fn upsert(&mut self, id: &str, body: &str) -> Result<(), StoreError> {
        self.upsert_many(&[(id, body)])
    }

    /// Insert or replace a batch. Either every document is written or none is.
    pub fn upsert_many(&mut self, docs: &[(&str, &str)]) -> Result<(), StoreError> {
        if self.archived {
            return Err(StoreError::Archived);
        }
        if docs.iter().any(|(id, _)| id.is_empty()) {
            return Err(StoreError::EmptyId);
        }
        let mut fresh: Vec<&str> = docs
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| !self.documents.contains_key(*id))
            .collect();
        fresh.sort_unstable();
        fresh.dedup();
        if self.len() + fresh.len() as u64 > self.max_documents {
            return Err(StoreError::CapacityExceeded {
                max: self.max_documents,
            });
        }
        for (id, body) in docs {
            self.documents.insert((*id).to_owned(), (*body).to_owned());
        }
        Ok(())
    }

    /// Remove a document, returning `Err(NotFound)` if it was absent.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if self.archived {
            return Err(StoreError::Archived);
        }
        self.documents
            .shift_remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
