//! Data types shared by the lister, resolver, executor and coordinator.

use crate::error::BlobmendError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A named object in the storage container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Object name; unique within its container.
    pub name: String,
    pub last_modified: DateTime<Utc>,
    /// Where the object can be fetched from.
    pub address: Url,
}

/// An asset whose name fails the conformance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCandidate {
    pub asset: Asset,
}

/// Primary key of a record in the reference store.
///
/// Kept opaque: callers only ever hand it back to the store that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Integer(id) => write!(f, "{}", id),
            RecordId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// The record found to reference an asset name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMatch {
    pub record_id: RecordId,
    pub title: String,
}

/// Old/new name pair plus the record to rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePlan {
    pub old_name: String,
    pub new_name: String,
    pub record_id: RecordId,
}

impl RenamePlan {
    /// Substring replaced in the record body by the forward update.
    pub fn old_reference(&self) -> String {
        format!("/{}", self.old_name)
    }

    /// Substring written into the record body by the forward update.
    pub fn new_reference(&self) -> String {
        format!("/{}", self.new_name)
    }
}

/// Terminal result of one rename attempt.
#[derive(Debug)]
pub enum RenameOutcome {
    /// Reference rewritten and object renamed.
    Renamed { plan: RenamePlan },
    /// Nothing references the asset. `stale` is set when a match was found but
    /// the record no longer contained the reference at update time.
    SkippedNoReference { stale: bool },
    /// Object rename failed; the reference update was undone.
    RolledBack {
        plan: RenamePlan,
        rows_restored: usize,
        cause: BlobmendError,
    },
    /// Anything else, including a failed compensation.
    Failed {
        plan: Option<RenamePlan>,
        error: BlobmendError,
    },
}

impl RenameOutcome {
    /// Short label for log fields and reports.
    pub fn label(&self) -> &'static str {
        match self {
            RenameOutcome::Renamed { .. } => "renamed",
            RenameOutcome::SkippedNoReference { .. } => "skipped_no_reference",
            RenameOutcome::RolledBack { .. } => "rolled_back",
            RenameOutcome::Failed { error, .. } if error.is_unrecoverable() => "rollback_failed",
            RenameOutcome::Failed { .. } => "failed",
        }
    }

    /// True when the reference store was left pointing at a name that does not
    /// exist in the object store.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, RenameOutcome::Failed { error, .. } if error.is_unrecoverable())
    }
}

/// What a dry run would do for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRename {
    pub asset_name: String,
    /// Referencing record, if any.
    pub reference: Option<ReferenceMatch>,
    /// Name the asset would get; only present when a reference exists.
    pub new_name: Option<String>,
    /// Why this candidate could not be planned.
    pub error: Option<String>,
}

/// Counters and notable names collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub listed: usize,
    pub candidates: usize,
    pub renamed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
    /// Failures that left both stores consistent.
    pub failed: usize,
    /// Failed compensations. Never counted in `failed`.
    pub unrecoverable: usize,
    /// Candidates no record references; deletion candidates for an operator.
    pub unreferenced: Vec<String>,
    /// Plans whose compensation failed, for manual repair.
    pub inconsistent: Vec<RenamePlan>,
}

impl RunSummary {
    /// Fold one candidate's outcome into the tally.
    pub fn record(&mut self, asset_name: &str, outcome: &RenameOutcome) {
        match outcome {
            RenameOutcome::Renamed { .. } => self.renamed += 1,
            RenameOutcome::SkippedNoReference { stale } => {
                self.skipped += 1;
                if !stale {
                    self.unreferenced.push(asset_name.to_string());
                }
            }
            RenameOutcome::RolledBack { .. } => self.rolled_back += 1,
            RenameOutcome::Failed { plan, error } if error.is_unrecoverable() => {
                self.unrecoverable += 1;
                if let Some(plan) = plan {
                    self.inconsistent.push(plan.clone());
                }
            }
            RenameOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Assets that were listed but not renamed, for whatever reason.
    pub fn not_renamed(&self) -> usize {
        self.listed.saturating_sub(self.renamed)
    }

    /// No candidate failed or was rolled back.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.unrecoverable == 0 && self.rolled_back == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> RenamePlan {
        RenamePlan {
            old_name: "abc123.jpg".to_string(),
            new_name: "img-1.jpg".to_string(),
            record_id: RecordId::Integer(7),
        }
    }

    #[test]
    fn test_plan_references_carry_leading_slash() {
        let plan = plan();
        assert_eq!(plan.old_reference(), "/abc123.jpg");
        assert_eq!(plan.new_reference(), "/img-1.jpg");
    }

    #[test]
    fn test_summary_keeps_unrecoverable_apart() {
        let mut summary = RunSummary::default();
        summary.record(
            "a.jpg",
            &RenameOutcome::Failed {
                plan: Some(plan()),
                error: BlobmendError::RollbackFailed {
                    record_id: "7".into(),
                    old_name: "abc123.jpg".into(),
                    new_name: "img-1.jpg".into(),
                    message: "disk I/O error".into(),
                },
            },
        );
        summary.record(
            "b.jpg",
            &RenameOutcome::Failed {
                plan: None,
                error: BlobmendError::Other("boom".into()),
            },
        );

        assert_eq!(summary.unrecoverable, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.inconsistent, vec![plan()]);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_stale_skip_is_not_reported_unreferenced() {
        let mut summary = RunSummary::default();
        summary.record("a.jpg", &RenameOutcome::SkippedNoReference { stale: true });
        summary.record("logo.png", &RenameOutcome::SkippedNoReference { stale: false });

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.unreferenced, vec!["logo.png".to_string()]);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_record_id_display() {
        assert_eq!(RecordId::Integer(42).to_string(), "42");
        assert_eq!(
            RecordId::Text("5f0c-aa".to_string()).to_string(),
            "5f0c-aa"
        );
    }

    #[test]
    fn test_summary_json_shape() {
        let mut summary = RunSummary {
            listed: 2,
            candidates: 2,
            ..RunSummary::default()
        };
        summary.record("logo.png", &RenameOutcome::SkippedNoReference { stale: false });
        summary.record("abc123.jpg", &RenameOutcome::Renamed { plan: plan() });

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["renamed"], 1);
        assert_eq!(json["unreferenced"], serde_json::json!(["logo.png"]));

        let plan_json = serde_json::to_value(plan()).unwrap();
        assert_eq!(plan_json["record_id"], 7);
    }
}
