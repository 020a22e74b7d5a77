//! Blobmend - renames stored media assets to a naming convention while
//! keeping the posts that embed them in sync.
//!
//! Each asset whose name lacks the conformance prefix is looked up in the
//! posts table. When a post references it, the reference is rewritten first,
//! then the object is copied to its new name and the old object deleted. If
//! the object step fails, the reference rewrite is undone.
//!
//! # Example
//!
//! ```rust,ignore
//! use blobmend::{Coordinator, FsObjectStore, NullReporter, PostsSchema, RenameConfig,
//!     SqliteReferenceStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> blobmend::Result<()> {
//!     let objects = FsObjectStore::open("/srv/storage", "media")?;
//!     let references = SqliteReferenceStore::open("/srv/blog.db", PostsSchema::default())?;
//!
//!     let coordinator = Coordinator::new(
//!         RenameConfig::default(),
//!         Arc::new(references),
//!         Arc::new(objects),
//!         Arc::new(NullReporter),
//!     )?;
//!     let summary = coordinator.run().await?;
//!     println!("Renamed {} assets", summary.renamed);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod references;
pub mod rename;
pub mod report;
pub mod retry;
pub mod storage;

// Re-export commonly used types
pub use config::{CopyPollConfig, ListingDefaults, PostsSchema, RenameConfig, RenameDefaults};
pub use error::{BlobmendError, Result};
pub use models::{
    Asset, PlannedRename, RecordId, ReferenceMatch, RenameCandidate, RenameOutcome, RenamePlan,
    RunSummary,
};
pub use naming::FilenamePolicy;
pub use references::{ReferenceResolver, ReferenceStore, SqliteReferenceStore};
pub use rename::{rename_object, Coordinator, RenameExecutor};
pub use report::{NullReporter, ProgressReporter};
pub use retry::{RetryConfig, RetryStats};
pub use storage::{
    AssetLister, CopyBehavior, CopyStatus, FsObjectStore, ListItem, ListPage, MemoryObjectStore,
    ObjectStore,
};
