//! Object storage access.
//!
//! Provides:
//! - The [`ObjectStore`] capability trait used by the rename workflow
//! - A directory-backed store and an in-memory store
//! - [`AssetLister`], which pages a container into a sorted asset list

mod fs;
mod lister;
mod memory;
mod traits;

pub use fs::FsObjectStore;
pub use lister::AssetLister;
pub use memory::{CopyBehavior, MemoryObjectStore};
pub use traits::{CopyStatus, ListItem, ListPage, ObjectStore};
