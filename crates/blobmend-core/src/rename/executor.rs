//! Two-phase rename of one candidate across both stores.
//!
//! Order of operations:
//! 1. Resolve the referencing record (none: skip, nothing touched)
//! 2. Plan a fresh conformant name
//! 3. Rewrite `/<old>` to `/<new>` in that record (forward action)
//! 4. Copy the object to the new name, poll, delete the old one
//! 5. If step 4 fails, rewrite `/<new>` back to `/<old>` (compensation)
//!
//! The object is only touched after the reference update succeeded, and the
//! old object is only deleted after the copy succeeded. The one state this
//! cannot heal is a failed compensation: the reference then points at a name
//! that does not exist, which is reported as `RollbackFailed`.

use super::object::rename_object;
use crate::config::CopyPollConfig;
use crate::error::BlobmendError;
use crate::models::{RenameCandidate, RenameOutcome, RenamePlan};
use crate::naming::FilenamePolicy;
use crate::references::{ReferenceResolver, ReferenceStore};
use crate::report::ProgressReporter;
use crate::storage::ObjectStore;
use tracing::{error, info, info_span, warn, Instrument};

/// Executes rename plans against a reference store and an object store.
pub struct RenameExecutor<'a> {
    policy: &'a FilenamePolicy,
    references: &'a dyn ReferenceStore,
    objects: &'a dyn ObjectStore,
    poll: CopyPollConfig,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> RenameExecutor<'a> {
    pub fn new(
        policy: &'a FilenamePolicy,
        references: &'a dyn ReferenceStore,
        objects: &'a dyn ObjectStore,
        poll: CopyPollConfig,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            policy,
            references,
            objects,
            poll,
            reporter,
        }
    }

    /// Run every phase for one candidate. Never returns an error: every
    /// failure is folded into the outcome.
    pub async fn execute(&self, candidate: &RenameCandidate) -> RenameOutcome {
        let old_name = candidate.asset.name.as_str();
        let span = info_span!("rename", old_name);
        let outcome = self.execute_inner(old_name).instrument(span).await;

        match &outcome {
            RenameOutcome::Renamed { plan } => info!(
                old_name,
                new_name = %plan.new_name,
                record_id = %plan.record_id,
                outcome = outcome.label(),
                "Renamed asset"
            ),
            RenameOutcome::SkippedNoReference { stale } => info!(
                old_name,
                stale,
                outcome = outcome.label(),
                "Asset not referenced by any post"
            ),
            RenameOutcome::RolledBack {
                plan,
                rows_restored,
                cause,
            } => warn!(
                old_name,
                new_name = %plan.new_name,
                record_id = %plan.record_id,
                rows_restored,
                error = %cause,
                outcome = outcome.label(),
                "Object rename failed, reference update rolled back"
            ),
            RenameOutcome::Failed { plan, error } if error.is_unrecoverable() => error!(
                old_name,
                new_name = plan.as_ref().map(|p| p.new_name.as_str()),
                error = %error,
                outcome = outcome.label(),
                "INCONSISTENT: reference points at a missing object, manual repair required"
            ),
            RenameOutcome::Failed { plan, error } => warn!(
                old_name,
                new_name = plan.as_ref().map(|p| p.new_name.as_str()),
                error = %error,
                error_kind = error.kind(),
                outcome = outcome.label(),
                "Rename failed"
            ),
        }

        self.reporter.outcome(old_name, &outcome);
        outcome
    }

    async fn execute_inner(&self, old_name: &str) -> RenameOutcome {
        // 1. Resolve
        let resolver = ReferenceResolver::new(self.references);
        let reference = match resolver.find_referencing(old_name) {
            Ok(Some(reference)) => reference,
            Ok(None) => return RenameOutcome::SkippedNoReference { stale: false },
            Err(error) => return RenameOutcome::Failed { plan: None, error },
        };
        self.reporter.reference_found(old_name, &reference);

        // 2. Plan
        let new_name = match self.policy.generate_name(old_name) {
            Ok(name) => name,
            Err(error) => return RenameOutcome::Failed { plan: None, error },
        };
        let plan = RenamePlan {
            old_name: old_name.to_string(),
            new_name,
            record_id: reference.record_id.clone(),
        };
        info!(
            new_name = %plan.new_name,
            record_id = %plan.record_id,
            title = %reference.title,
            "Renaming in referencing post"
        );
        self.reporter.renaming(&plan, &reference);

        // 3. Forward update
        let rows = match self.references.replace_in_body(
            &plan.record_id,
            &plan.old_reference(),
            &plan.new_reference(),
        ) {
            Ok(rows) => rows,
            Err(error) => {
                return RenameOutcome::Failed {
                    plan: Some(plan),
                    error,
                }
            }
        };
        if rows == 0 {
            return RenameOutcome::SkippedNoReference { stale: true };
        }

        // 4. Rename object
        let cause =
            match rename_object(self.objects, &plan.old_name, &plan.new_name, &self.poll).await {
                Ok(()) => return RenameOutcome::Renamed { plan },
                Err(cause) => cause,
            };

        // 5. Compensate
        self.compensate(plan, cause)
    }

    fn compensate(&self, plan: RenamePlan, cause: BlobmendError) -> RenameOutcome {
        warn!(error = %cause, "Object rename failed, rolling back reference update");

        let restored = self.references.replace_in_body(
            &plan.record_id,
            &plan.new_reference(),
            &plan.old_reference(),
        );

        let failure = match restored {
            Ok(rows) if rows > 0 => {
                return RenameOutcome::RolledBack {
                    plan,
                    rows_restored: rows,
                    cause,
                }
            }
            Ok(_) => "compensating update matched no rows".to_string(),
            Err(e) => e.to_string(),
        };

        let error = BlobmendError::RollbackFailed {
            record_id: plan.record_id.to_string(),
            old_name: plan.old_name.clone(),
            new_name: plan.new_name.clone(),
            message: format!("{} (after: {})", failure, cause),
        };
        RenameOutcome::Failed {
            plan: Some(plan),
            error,
        }
    }
}
