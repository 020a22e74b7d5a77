//! Asset naming convention.
//!
//! A conformant name is `<prefix><uuid><extension>`, e.g.
//! `img-3f2b8c1e-5d4a-4f7e-9b0c-1a2b3c4d5e6f.jpg`. Only the prefix is checked;
//! anything carrying it is left alone.

use crate::error::{BlobmendError, Result};
use uuid::Uuid;

/// Decides conformance and derives replacement names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePolicy {
    prefix: String,
}

impl FilenamePolicy {
    /// Create a policy for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True iff `name` already follows the convention.
    pub fn is_conformant(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// Derive a fresh conformant name that keeps the extension of `old_name`.
    ///
    /// Every call draws a new random v4 UUID, so two calls never return the
    /// same name for practical purposes.
    pub fn generate_name(&self, old_name: &str) -> Result<String> {
        if old_name.is_empty() {
            return Err(BlobmendError::PolicyViolation {
                name: old_name.to_string(),
                message: "asset name is empty".to_string(),
            });
        }

        Ok(format!(
            "{}{}{}",
            self.prefix,
            Uuid::new_v4(),
            extension_of(old_name)
        ))
    }
}

/// Extension of the last path segment, dot included, case preserved.
///
/// A name without a dot, or ending in one, has no extension.
///
/// ```ignore
/// assert_eq!(extension_of("photos/abc123.JPG"), ".JPG");
/// assert_eq!(extension_of("archive.tar.gz"), ".gz");
/// assert_eq!(extension_of("README"), "");
/// ```
pub fn extension_of(name: &str) -> &str {
    let segment = name.rsplit('/').next().unwrap_or(name);
    match segment.rfind('.') {
        Some(pos) if pos + 1 < segment.len() => &segment[pos..],
        _ => "",
    }
}
