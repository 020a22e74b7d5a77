//! The rename workflow.
//!
//! - [`rename_object`]: copy, poll, delete inside the object store
//! - [`RenameExecutor`]: one candidate across both stores, with compensation
//! - [`Coordinator`]: a whole run over a container

mod coordinator;
mod executor;
mod object;

pub use coordinator::Coordinator;
pub use executor::RenameExecutor;
pub use object::rename_object;
