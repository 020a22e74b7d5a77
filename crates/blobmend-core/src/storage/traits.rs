//! Object store backend trait and types.

use crate::error::{BlobmendError, Result};
use crate::models::Asset;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    /// A real object.
    Object(Asset),
    /// A virtual-directory marker (`photos/`), not an object.
    Prefix(String),
}

/// A page of listing results plus the marker for the next page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<ListItem>,
    /// `None` once the listing is exhausted.
    pub continuation: Option<String>,
}

/// State of a server-side copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CopyStatus::Pending)
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object-storage capability used by the lister and the rename executor.
///
/// All names are relative to the single container the store was opened on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container this handle operates on.
    fn container(&self) -> &str;

    /// Fetch one listing page starting after `marker`.
    async fn list_page(&self, marker: Option<&str>, max_results: usize) -> Result<ListPage>;

    /// Start a server-side copy of `source` to `target`.
    ///
    /// Returns the status right after starting; usually `Pending`.
    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyStatus>;

    /// Current status of the copy whose destination is `target`.
    ///
    /// Once a terminal status has been returned, or the copy was aborted, the
    /// store may forget the copy and answer `ObjectNotFound` afterwards.
    async fn copy_status(&self, target: &str) -> Result<CopyStatus>;

    /// Abort a pending copy to `target`. A copy that already finished is left
    /// as it is.
    async fn abort_copy(&self, target: &str) -> Result<()>;

    /// Delete an object.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Check whether an object exists.
    async fn exists(&self, name: &str) -> Result<bool>;
}

/// Append `name` as a single path segment to `base`.
pub(crate) fn object_url(base: &Url, name: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BlobmendError::Other(format!("URL {} cannot carry object names", base)))?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

/// Reject names that could escape the container or address a sub-directory.
pub(crate) fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\')
    {
        return Err(BlobmendError::PolicyViolation {
            name: name.to_string(),
            message: "not a valid top-level object name".to_string(),
        });
    }
    Ok(())
}
