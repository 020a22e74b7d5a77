//! Reference store trait.

use crate::error::Result;
use crate::models::{RecordId, ReferenceMatch};

/// Relational store holding the rich-text bodies that reference assets.
///
/// All operations are synchronous to match rusqlite's API.
pub trait ReferenceStore: Send + Sync {
    /// First record (by primary key) whose body contains `needle`,
    /// case-insensitively.
    fn find_first_containing(&self, needle: &str) -> Result<Option<ReferenceMatch>>;

    /// Replace every occurrence of `from` with `to` in one record's body.
    ///
    /// Returns the number of rows changed: 0 when the record is gone or its
    /// body no longer contains `from`.
    fn replace_in_body(&self, record_id: &RecordId, from: &str, to: &str) -> Result<usize>;
}
