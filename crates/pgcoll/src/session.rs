//! Scoped create, use, destroy.

use crate::bridge::ForeignString;
use crate::collection::Collection;
use crate::config::CollectionConfig;
use crate::error::Error;
use crate::library::{Linked, NativeLibrary};

/// Runs closures against a collection that lives exactly as long as the
/// closure.
///
/// Order on every exit path, including a panicking closure: the name is
/// marshalled, the collection is created, the closure runs, the collection
/// is destroyed, and the name buffer is released last.
#[derive(Clone, Debug, Default)]
pub struct Session<L: NativeLibrary = Linked> {
    lib: L,
    config: Option<CollectionConfig>,
}

impl<L: NativeLibrary> Session<L> {
    /// A session on `lib` using the library's default settings.
    pub fn new(lib: L) -> Self {
        Self { lib, config: None }
    }

    /// Create collections with `config` instead of the defaults.
    pub fn with_config(mut self, config: CollectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Create `name`, pass it to `f`, then destroy it.
    ///
    /// If create fails, `f` is not called and nothing is destroyed. If `f`
    /// fails, its error wins over a failure to destroy, which is logged.
    pub fn run<T, E, F>(self, name: &str, f: F) -> Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Collection<L>) -> Result<T, E>,
    {
        let name = ForeignString::new(name).map_err(Error::from)?;
        let mut collection = Collection::open_foreign(self.lib, &name, self.config.as_ref())?;
        let outcome = f(&mut collection);
        let closed = collection.close();
        name.release();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                log::error!("destroy after failed session also failed: {close_err}");
                Err(e)
            }
        }
    }
}

/// Run `f` against a fresh collection `name` in the linked library.
pub fn with_collection<T, E, F>(name: &str, f: F) -> Result<T, E>
where
    E: From<Error>,
    F: FnOnce(&mut Collection<Linked>) -> Result<T, E>,
{
    Session::new(Linked).run(name, f)
}
