//! In-process object store with scriptable copy behaviour.
//!
//! Useful for tests and rehearsals: objects live in a `BTreeMap`, and copies
//! can be told to finish late, fail, or never finish.

use super::traits::{object_url, validate_object_name, CopyStatus, ListItem, ListPage, ObjectStore};
use crate::error::{BlobmendError, Result};
use crate::models::Asset;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// How the next copies started on a [`MemoryObjectStore`] behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyBehavior {
    /// Finish during `start_copy`.
    #[default]
    Immediate,
    /// Report `Pending` for this many status polls, then succeed.
    AfterPolls(u32),
    /// Report `Pending` once, then end in the given terminal status.
    EndWith(CopyStatus),
    /// Stay `Pending` forever.
    Never,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingCopy {
    source: String,
    behavior: CopyBehavior,
    polls: u32,
    status: CopyStatus,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    prefixes: Vec<String>,
    copies: HashMap<String, PendingCopy>,
    copy_behavior: CopyBehavior,
    failing_lists: u32,
    failing_deletes: bool,
    list_calls: u32,
}

/// Object store held entirely in memory.
#[derive(Debug)]
pub struct MemoryObjectStore {
    container: String,
    base_url: Url,
    state: Mutex<MemoryState>,
}

impl MemoryObjectStore {
    /// Create an empty container.
    pub fn new(container: impl Into<String>) -> Result<Self> {
        let container = container.into();
        validate_object_name(&container)?;
        let base_url = Url::parse(&format!("memory:///{}/", container))
            .map_err(|e| BlobmendError::Config {
                message: format!("invalid container name '{}': {}", container, e),
            })?;
        Ok(Self {
            container,
            base_url,
            state: Mutex::new(MemoryState::default()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|e| BlobmendError::Storage {
            message: format!("memory store lock poisoned: {}", e),
            source: None,
        })
    }

    /// Add or replace an object.
    pub fn insert(
        &self,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
    ) -> Result<()> {
        let name = name.into();
        validate_object_name(&name)?;
        self.lock()?.objects.insert(
            name,
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
        Ok(())
    }

    /// Add a virtual-directory marker that shows up in listings.
    pub fn insert_prefix(&self, prefix: impl Into<String>) -> Result<()> {
        self.lock()?.prefixes.push(prefix.into());
        Ok(())
    }

    /// Contents of an object, if present.
    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.objects.get(name).map(|o| o.data.clone()))
    }

    /// All object names in key order.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.objects.keys().cloned().collect())
    }

    /// Set how copies started from now on behave.
    pub fn set_copy_behavior(&self, behavior: CopyBehavior) -> Result<()> {
        self.lock()?.copy_behavior = behavior;
        Ok(())
    }

    /// Make the next `count` listing calls fail with a transient error.
    pub fn fail_next_lists(&self, count: u32) -> Result<()> {
        self.lock()?.failing_lists = count;
        Ok(())
    }

    /// Make every delete fail with a transient error.
    pub fn fail_deletes(&self, fail: bool) -> Result<()> {
        self.lock()?.failing_deletes = fail;
        Ok(())
    }

    /// Number of `list_page` calls served, failed ones included.
    pub fn list_calls(&self) -> Result<u32> {
        Ok(self.lock()?.list_calls)
    }

    fn transient(message: &str) -> BlobmendError {
        BlobmendError::storage(
            message,
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected failure"),
        )
    }

    fn finish_copy(state: &mut MemoryState, target: &str) -> CopyStatus {
        let Some(copy) = state.copies.get(target).cloned() else {
            return CopyStatus::Failed;
        };
        match state.objects.get(&copy.source).cloned() {
            Some(object) => {
                state.objects.insert(
                    target.to_string(),
                    StoredObject {
                        data: object.data,
                        last_modified: Utc::now(),
                    },
                );
                CopyStatus::Success
            }
            None => CopyStatus::Failed,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn list_page(&self, marker: Option<&str>, max_results: usize) -> Result<ListPage> {
        let mut state = self.lock()?;
        state.list_calls += 1;
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(Self::transient("list failed"));
        }

        let mut entries: Vec<(String, Option<StoredObject>)> = state
            .objects
            .iter()
            .map(|(name, object)| (name.clone(), Some(object.clone())))
            .chain(state.prefixes.iter().map(|p| (p.clone(), None)))
            .filter(|(name, _)| marker.map_or(true, |m| name.as_str() > m))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let has_more = entries.len() > max_results;
        entries.truncate(max_results);
        let continuation = if has_more {
            entries.last().map(|(name, _)| name.clone())
        } else {
            None
        };

        let mut items = Vec::with_capacity(entries.len());
        for (name, object) in entries {
            match object {
                Some(object) => items.push(ListItem::Object(Asset {
                    address: object_url(&self.base_url, &name)?,
                    name,
                    last_modified: object.last_modified,
                })),
                None => items.push(ListItem::Prefix(name)),
            }
        }

        Ok(ListPage {
            items,
            continuation,
        })
    }

    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyStatus> {
        validate_object_name(target)?;
        let mut state = self.lock()?;
        if !state.objects.contains_key(source) {
            return Err(BlobmendError::ObjectNotFound {
                name: source.to_string(),
            });
        }

        let behavior = state.copy_behavior;
        state.copies.insert(
            target.to_string(),
            PendingCopy {
                source: source.to_string(),
                behavior,
                polls: 0,
                status: CopyStatus::Pending,
            },
        );

        if behavior == CopyBehavior::Immediate {
            let status = Self::finish_copy(&mut state, target);
            if let Some(copy) = state.copies.get_mut(target) {
                copy.status = status;
            }
            return Ok(status);
        }
        Ok(CopyStatus::Pending)
    }

    async fn copy_status(&self, target: &str) -> Result<CopyStatus> {
        let mut state = self.lock()?;
        let Some(copy) = state.copies.get_mut(target) else {
            return Err(BlobmendError::ObjectNotFound {
                name: target.to_string(),
            });
        };
        if copy.status.is_terminal() {
            return Ok(copy.status);
        }

        copy.polls += 1;
        let polls = copy.polls;
        let behavior = copy.behavior;
        let status = match behavior {
            CopyBehavior::Immediate => Self::finish_copy(&mut state, target),
            CopyBehavior::AfterPolls(n) if polls >= n => Self::finish_copy(&mut state, target),
            CopyBehavior::AfterPolls(_) | CopyBehavior::Never => CopyStatus::Pending,
            CopyBehavior::EndWith(CopyStatus::Success) => Self::finish_copy(&mut state, target),
            CopyBehavior::EndWith(status) => status,
        };

        if let Some(copy) = state.copies.get_mut(target) {
            copy.status = status;
        }
        Ok(status)
    }

    async fn abort_copy(&self, target: &str) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(copy) = state.copies.get_mut(target) {
            if copy.status == CopyStatus::Pending {
                copy.status = CopyStatus::Aborted;
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing_deletes {
            return Err(Self::transient("delete failed"));
        }
        state
            .objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BlobmendError::ObjectNotFound {
                name: name.to_string(),
            })
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.objects.contains_key(name))
    }
}
