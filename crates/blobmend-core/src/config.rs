//! Centralized configuration for blobmend.
//!
//! Constant defaults live on marker structs; [`RenameConfig`] carries the values
//! a single run actually uses and is handed to the coordinator at construction.

use crate::error::{BlobmendError, Result};
use crate::retry::RetryConfig;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Defaults for the rename workflow.
pub struct RenameDefaults;

impl RenameDefaults {
    pub const CONFORMANCE_PREFIX: &'static str = "img-";
    pub const COPY_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const COPY_TIMEOUT: Duration = Duration::from_secs(300);
}

/// Defaults for container listing.
pub struct ListingDefaults;

impl ListingDefaults {
    pub const PAGE_SIZE: usize = 5000;
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY: Duration = Duration::from_millis(500);
    pub const MAX_DELAY: Duration = Duration::from_secs(10);
}

/// Polling behaviour while waiting for a server-side copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPollConfig {
    /// Delay between two status checks.
    pub interval: Duration,
    /// Give up once the copy has been pending this long.
    pub timeout: Duration,
}

impl Default for CopyPollConfig {
    fn default() -> Self {
        Self {
            interval: RenameDefaults::COPY_POLL_INTERVAL,
            timeout: RenameDefaults::COPY_TIMEOUT,
        }
    }
}

/// Configuration for one coordinator run.
#[derive(Debug, Clone)]
pub struct RenameConfig {
    /// Names starting with this prefix are already conformant.
    pub prefix: String,
    /// Copy-status polling.
    pub copy_poll: CopyPollConfig,
    /// Maximum entries requested per listing page.
    pub page_size: usize,
    /// Retry policy for each listing page.
    pub listing_retry: RetryConfig,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            prefix: RenameDefaults::CONFORMANCE_PREFIX.to_string(),
            copy_poll: CopyPollConfig::default(),
            page_size: ListingDefaults::PAGE_SIZE,
            listing_retry: RetryConfig::new()
                .with_max_attempts(ListingDefaults::MAX_ATTEMPTS)
                .with_base_delay(ListingDefaults::BASE_DELAY)
                .with_max_delay(ListingDefaults::MAX_DELAY),
        }
    }
}

impl RenameConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the conformance prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the copy-status poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.copy_poll.interval = interval;
        self
    }

    /// Set the copy-status deadline.
    pub fn with_copy_timeout(mut self, timeout: Duration) -> Self {
        self.copy_poll.timeout = timeout;
        self
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the listing retry policy.
    pub fn with_listing_retry(mut self, retry: RetryConfig) -> Self {
        self.listing_retry = retry;
        self
    }

    /// Reject values that would make a run meaningless or hang.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(BlobmendError::Config {
                message: "conformance prefix must not be empty".to_string(),
            });
        }
        if self.prefix.contains('/') {
            return Err(BlobmendError::Config {
                message: format!("conformance prefix '{}' must not contain '/'", self.prefix),
            });
        }
        if self.copy_poll.interval.is_zero() {
            return Err(BlobmendError::Config {
                message: "copy poll interval must be greater than zero".to_string(),
            });
        }
        if self.copy_poll.timeout < self.copy_poll.interval {
            return Err(BlobmendError::Config {
                message: format!(
                    "copy timeout {:?} is shorter than the poll interval {:?}",
                    self.copy_poll.timeout, self.copy_poll.interval
                ),
            });
        }
        if self.page_size == 0 {
            return Err(BlobmendError::Config {
                message: "listing page size must be greater than zero".to_string(),
            });
        }
        if self.listing_retry.max_attempts == 0 {
            return Err(BlobmendError::Config {
                message: "listing retry needs at least one attempt".to_string(),
            });
        }
        Ok(())
    }
}

/// Regex for SQL identifiers we are willing to splice into a statement.
static SQL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Table and column names of the posts table holding asset references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostsSchema {
    pub table: String,
    pub id_column: String,
    pub title_column: String,
    pub body_column: String,
}

impl Default for PostsSchema {
    fn default() -> Self {
        Self {
            table: "Post".to_string(),
            id_column: "Id".to_string(),
            title_column: "Title".to_string(),
            body_column: "PostContent".to_string(),
        }
    }
}

impl PostsSchema {
    /// Check every identifier against [`SQL_IDENTIFIER`].
    ///
    /// Identifiers cannot be bound as parameters, so this is the only thing
    /// standing between a schema override and the generated SQL.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("table", &self.table),
            ("id_column", &self.id_column),
            ("title_column", &self.title_column),
            ("body_column", &self.body_column),
        ] {
            if !SQL_IDENTIFIER.is_match(value) {
                return Err(BlobmendError::Config {
                    message: format!("invalid SQL identifier for {}: '{}'", field, value),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn quoted(ident: &str) -> String {
        format!("\"{}\"", ident)
    }
}
