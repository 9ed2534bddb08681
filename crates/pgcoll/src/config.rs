//! Host-side collection settings.

use std::fmt;

use crate::bridge::ForeignString;
use crate::error::Error;
use crate::library::ForeignConfig;

/// Environment variable read by [`CollectionConfig::from_env`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Settings applied when a collection is created.
///
/// Unset fields keep the foreign library's defaults.
///
/// ```
/// use pgcoll::CollectionConfig;
///
/// let config = CollectionConfig::new()
///     .database_url("postgres://localhost/pgml")
///     .max_documents(10_000);
/// assert_eq!(config.max_documents, Some(10_000));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Connection string stored with the collection.
    pub database_url: Option<String>,
    /// Document capacity.
    pub max_documents: Option<u64>,
}

impl CollectionConfig {
    /// All defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with `database_url` taken from `DATABASE_URL` if set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url: lookup(DATABASE_URL_ENV).filter(|url| !url.is_empty()),
            max_documents: None,
        }
    }

    /// Set the database URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the document capacity.
    pub fn max_documents(mut self, max: u64) -> Self {
        self.max_documents = Some(max);
        self
    }

    pub(crate) fn marshal(&self) -> Result<MarshalledConfig, Error> {
        Ok(MarshalledConfig {
            database_url: self
                .database_url
                .as_deref()
                .map(ForeignString::new)
                .transpose()?,
            max_documents: self.max_documents,
        })
    }
}

// The URL may carry a password.
impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("max_documents", &self.max_documents)
            .finish()
    }
}

/// A [`CollectionConfig`] with its strings held as [`ForeignString`]s.
pub(crate) struct MarshalledConfig {
    database_url: Option<ForeignString>,
    max_documents: Option<u64>,
}

impl MarshalledConfig {
    pub(crate) fn as_foreign(&self) -> ForeignConfig<'_> {
        ForeignConfig {
            database_url: self.database_url.as_ref().map(ForeignString::as_c_str),
            max_documents: self.max_documents,
        }
    }
}
