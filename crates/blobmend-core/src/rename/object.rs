//! Copy-then-delete rename inside one container.

use crate::config::CopyPollConfig;
use crate::error::{BlobmendError, Result};
use crate::storage::{CopyStatus, ObjectStore};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rename `source` to `target` by server-side copy followed by delete.
///
/// The source is deleted only after the copy reports success. A copy still
/// pending after `poll.timeout` is aborted and reported as
/// [`BlobmendError::CopyTimedOut`]. A timeout too large to express as an
/// instant means no deadline.
///
/// When deleting the source fails, the copy is removed only if the source is
/// confirmed to still exist. Otherwise the copy is kept and the rename counts
/// as done, since the source may already be gone.
pub async fn rename_object(
    store: &dyn ObjectStore,
    source: &str,
    target: &str,
    poll: &CopyPollConfig,
) -> Result<()> {
    let started = Instant::now();
    let deadline = started.checked_add(poll.timeout);

    let mut status = store.start_copy(source, target).await?;
    let mut polls = 0u32;

    while status == CopyStatus::Pending {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            if let Err(e) = store.abort_copy(target).await {
                warn!(target_name = target, error = %e, "Failed to abort timed-out copy");
            }
            return Err(BlobmendError::CopyTimedOut {
                target_name: target.to_string(),
                waited: now - started,
            });
        }

        let wait = match deadline {
            Some(deadline) => poll.interval.min(deadline - now),
            None => poll.interval,
        };
        tokio::time::sleep(wait).await;
        status = store.copy_status(target).await?;
        polls += 1;
    }
    debug!(source_name = source, target_name = target, polls, %status, "Copy finished");

    if status != CopyStatus::Success {
        return Err(BlobmendError::CopyFailed {
            source_name: source.to_string(),
            target_name: target.to_string(),
            status,
        });
    }

    let Err(e) = store.delete(source).await else {
        return Ok(());
    };

    match store.exists(source).await {
        Ok(true) => {
            // The source is still there, so drop the copy to leave the
            // container as it was before the rename started.
            if let Err(cleanup) = store.delete(target).await {
                warn!(
                    target_name = target,
                    error = %cleanup,
                    "Failed to remove copy after delete failure"
                );
            }
            Err(e)
        }
        Ok(false) => {
            warn!(
                source_name = source,
                target_name = target,
                error = %e,
                "Delete reported failure but source is gone, keeping copy"
            );
            Ok(())
        }
        Err(check) => {
            warn!(
                source_name = source,
                target_name = target,
                error = %e,
                check_error = %check,
                "Source state unknown after delete failure, keeping copy"
            );
            Ok(())
        }
    }
}
