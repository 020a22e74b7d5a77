//! Lookup and rewrite of asset references in post bodies.
//!
//! A reference is any occurrence of an asset name inside a record body. The
//! resolver only ever returns the first referencing record: when two posts
//! embed the same asset, the second keeps the old name after a rename.

mod sqlite;
mod traits;

pub use sqlite::SqliteReferenceStore;
pub use traits::ReferenceStore;

use crate::error::Result;
use crate::models::ReferenceMatch;

/// Finds the record that references an asset.
pub struct ReferenceResolver<'a> {
    store: &'a dyn ReferenceStore,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(store: &'a dyn ReferenceStore) -> Self {
        Self { store }
    }

    /// First record whose body contains `old_file_name`, if any.
    pub fn find_referencing(&self, old_file_name: &str) -> Result<Option<ReferenceMatch>> {
        self.store.find_first_containing(old_file_name)
    }
}
