//! Directory-backed object store.
//!
//! A container is a directory below a root; objects are the regular files
//! directly inside it and sub-directories are reported as prefixes. Copies run
//! on a background task writing to a hidden temp file that is renamed into
//! place, so a target name only ever appears with complete contents.

use super::traits::{object_url, validate_object_name, CopyStatus, ListItem, ListPage, ObjectStore};
use crate::error::{BlobmendError, Result};
use crate::models::Asset;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;
use walkdir::WalkDir;

/// Temp files written by in-flight copies start with this and are never listed.
const TEMP_PREFIX: &str = ".blobmend-copy-";

#[derive(Debug)]
struct FsCopy {
    status: CopyStatus,
    temp_path: PathBuf,
    task: Option<JoinHandle<()>>,
}

type CopyTable = Arc<Mutex<HashMap<String, FsCopy>>>;

enum DirEntryKind {
    File { modified: DateTime<Utc> },
    Dir,
}

/// Object store over a local (or mounted) directory.
#[derive(Debug)]
pub struct FsObjectStore {
    container: String,
    dir: PathBuf,
    base_url: Url,
    copies: CopyTable,
}

impl FsObjectStore {
    /// Open the container `container` below `root`.
    ///
    /// The container directory must already exist.
    pub fn open(root: impl AsRef<Path>, container: impl Into<String>) -> Result<Self> {
        let container = container.into();
        validate_object_name(&container).map_err(|_| BlobmendError::Config {
            message: format!("invalid container name '{}'", container),
        })?;

        let dir = root.as_ref().join(&container);
        if !dir.is_dir() {
            return Err(BlobmendError::Config {
                message: format!("container directory does not exist: {}", dir.display()),
            });
        }
        let dir = dir
            .canonicalize()
            .map_err(|e| BlobmendError::io_with_path(e, &dir))?;

        let base_url = Url::from_directory_path(&dir).map_err(|_| BlobmendError::Config {
            message: format!("cannot express {} as a file URL", dir.display()),
        })?;

        Ok(Self {
            container,
            dir,
            base_url,
            copies: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Directory backing this container.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_copies(copies: &CopyTable) -> Result<MutexGuard<'_, HashMap<String, FsCopy>>> {
        copies.lock().map_err(|e| BlobmendError::Storage {
            message: format!("copy table lock poisoned: {}", e),
            source: None,
        })
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        validate_object_name(name)?;
        Ok(self.dir.join(name))
    }

    fn scan(dir: &Path) -> Result<Vec<(String, DirEntryKind)>> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let message = format!("failed to read {}: {}", dir.display(), e);
                match e.into_io_error() {
                    Some(io) => BlobmendError::storage(message, io),
                    None => BlobmendError::Storage {
                        message,
                        source: None,
                    },
                }
            })?;

            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!("Skipping non UTF-8 entry {}", entry.path().display());
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }

            if entry.file_type().is_dir() {
                entries.push((format!("{}/", name), DirEntryKind::Dir));
            } else if entry.file_type().is_file() {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(Utc::now);
                entries.push((name, DirEntryKind::File { modified }));
            }
        }
        Ok(entries)
    }
}

async fn copy_via_temp(source: &Path, temp: &Path, target: &Path) -> std::io::Result<()> {
    tokio::fs::copy(source, temp).await?;
    tokio::fs::rename(temp, target).await
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BlobmendError::storage(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn list_page(&self, marker: Option<&str>, max_results: usize) -> Result<ListPage> {
        let dir = self.dir.clone();
        let entries = tokio::task::spawn_blocking(move || Self::scan(&dir))
            .await
            .map_err(|e| BlobmendError::Storage {
                message: format!("listing task failed: {}", e),
                source: None,
            })??;

        let mut remaining: Vec<(String, DirEntryKind)> = entries
            .into_iter()
            .filter(|(name, _)| marker.map_or(true, |m| name.as_str() > m))
            .collect();
        let has_more = remaining.len() > max_results;
        remaining.truncate(max_results);
        let continuation = if has_more {
            remaining.last().map(|(name, _)| name.clone())
        } else {
            None
        };

        let mut items = Vec::with_capacity(remaining.len());
        for (name, kind) in remaining {
            match kind {
                DirEntryKind::Dir => items.push(ListItem::Prefix(name)),
                DirEntryKind::File { modified } => items.push(ListItem::Object(Asset {
                    address: object_url(&self.base_url, &name)?,
                    name,
                    last_modified: modified,
                })),
            }
        }

        debug!(
            "Listed {} entries from {} (more: {})",
            items.len(),
            self.dir.display(),
            continuation.is_some()
        );
        Ok(ListPage {
            items,
            continuation,
        })
    }

    async fn start_copy(&self, source: &str, target: &str) -> Result<CopyStatus> {
        let source_path = self.object_path(source)?;
        let target_path = self.object_path(target)?;

        match tokio::fs::metadata(&source_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(BlobmendError::ObjectNotFound {
                    name: source.to_string(),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobmendError::ObjectNotFound {
                    name: source.to_string(),
                })
            }
            Err(e) => {
                return Err(BlobmendError::storage(
                    format!("failed to stat {}", source_path.display()),
                    e,
                ))
            }
        }

        let temp_path = self.dir.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        {
            let mut copies = Self::lock_copies(&self.copies)?;
            if matches!(copies.get(target), Some(c) if c.status == CopyStatus::Pending) {
                return Err(BlobmendError::Storage {
                    message: format!("a copy to '{}' is already pending", target),
                    source: None,
                });
            }
            copies.insert(
                target.to_string(),
                FsCopy {
                    status: CopyStatus::Pending,
                    temp_path: temp_path.clone(),
                    task: None,
                },
            );
        }

        let copies = self.copies.clone();
        let key = target.to_string();
        let task = tokio::spawn(async move {
            let status = match copy_via_temp(&source_path, &temp_path, &target_path).await {
                Ok(()) => CopyStatus::Success,
                Err(e) => {
                    warn!(
                        "Copy {} -> {} failed: {}",
                        source_path.display(),
                        target_path.display(),
                        e
                    );
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    CopyStatus::Failed
                }
            };
            if let Ok(mut copies) = copies.lock() {
                if let Some(copy) = copies.get_mut(&key) {
                    if copy.status == CopyStatus::Pending {
                        copy.status = status;
                    }
                }
            }
        });

        let mut copies = Self::lock_copies(&self.copies)?;
        if let Some(copy) = copies.get_mut(target) {
            if copy.status == CopyStatus::Pending {
                copy.task = Some(task);
            }
        }
        Ok(CopyStatus::Pending)
    }

    async fn copy_status(&self, target: &str) -> Result<CopyStatus> {
        let mut copies = Self::lock_copies(&self.copies)?;
        let status = copies
            .get(target)
            .map(|c| c.status)
            .ok_or_else(|| BlobmendError::ObjectNotFound {
                name: target.to_string(),
            })?;
        if status.is_terminal() {
            copies.remove(target);
        }
        Ok(status)
    }

    async fn abort_copy(&self, target: &str) -> Result<()> {
        let temp_path = {
            let mut copies = Self::lock_copies(&self.copies)?;
            let Some(mut copy) = copies.remove(target) else {
                return Ok(());
            };
            if copy.status != CopyStatus::Pending {
                return Ok(());
            }
            if let Some(task) = copy.task.take() {
                task.abort();
            }
            copy.temp_path
        };

        // The task may have renamed the temp file just before it was aborted.
        remove_if_present(&temp_path).await?;
        remove_if_present(&self.object_path(target)?).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.object_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobmendError::ObjectNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(BlobmendError::storage(
                format!("failed to delete {}", path.display()),
                e,
            )),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.object_path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BlobmendError::storage(
                format!("failed to stat {}", path.display()),
                e,
            )),
        }
    }
}
