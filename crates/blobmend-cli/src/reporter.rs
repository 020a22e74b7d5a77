//! Console progress output.

use blobmend::{
    Asset, PlannedRename, ProgressReporter, ReferenceMatch, RenameOutcome, RenamePlan, RunSummary,
};
use std::io::Write;
use std::sync::Mutex;

/// Writes one human-readable line per progress event.
///
/// Write errors are ignored; logging still carries the same information.
pub struct ConsoleReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn line(&self, text: std::fmt::Arguments<'_>) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", text);
        }
    }
}

impl<W: Write + Send> ProgressReporter for ConsoleReporter<W> {
    fn listed(&self, container: &str, assets: &[Asset]) {
        self.line(format_args!(
            "Container '{}' holds {} assets",
            container,
            assets.len()
        ));
    }

    fn candidates_found(&self, count: usize) {
        self.line(format_args!("{} assets do not follow the naming convention", count));
    }

    fn reference_found(&self, asset_name: &str, reference: &ReferenceMatch) {
        self.line(format_args!(
            "{} is used by post {} ('{}')",
            asset_name, reference.record_id, reference.title
        ));
    }

    fn renaming(&self, plan: &RenamePlan, _reference: &ReferenceMatch) {
        self.line(format_args!("  renaming {} -> {}", plan.old_name, plan.new_name));
    }

    fn outcome(&self, asset_name: &str, outcome: &RenameOutcome) {
        match outcome {
            RenameOutcome::Renamed { plan } => {
                self.line(format_args!("  done: {}", plan.new_name));
            }
            RenameOutcome::SkippedNoReference { stale: false } => {
                self.line(format_args!(
                    "{} is not used by any post, consider deleting it",
                    asset_name
                ));
            }
            RenameOutcome::SkippedNoReference { stale: true } => {
                self.line(format_args!(
                    "  skipped {}: reference disappeared before the update",
                    asset_name
                ));
            }
            RenameOutcome::RolledBack { cause, .. } => {
                self.line(format_args!(
                    "  rolled back {}: {} (post restored)",
                    asset_name, cause
                ));
            }
            RenameOutcome::Failed { error, .. } if outcome.is_unrecoverable() => {
                self.line(format_args!("  INCONSISTENT {}: {}", asset_name, error));
            }
            RenameOutcome::Failed { error, .. } => {
                self.line(format_args!("  failed {}: {}", asset_name, error));
            }
        }
    }

    fn planned(&self, planned: &PlannedRename) {
        if let Some(error) = &planned.error {
            self.line(format_args!("could not plan {}: {}", planned.asset_name, error));
            return;
        }
        match (&planned.reference, &planned.new_name) {
            (Some(reference), Some(new_name)) => self.line(format_args!(
                "would rename {} -> {} (post {} '{}')",
                planned.asset_name, new_name, reference.record_id, reference.title
            )),
            _ => self.line(format_args!(
                "{} is not used by any post, consider deleting it",
                planned.asset_name
            )),
        }
    }

    fn finished(&self, summary: &RunSummary) {
        self.line(format_args!(
            "Renamed {} assets, {} not renamed ({} unreferenced, {} rolled back, {} failed)",
            summary.renamed,
            summary.not_renamed(),
            summary.unreferenced.len(),
            summary.rolled_back,
            summary.failed
        ));
        if summary.unrecoverable > 0 {
            self.line(format_args!(
                "{} posts now reference objects that do not exist, repair by hand:",
                summary.unrecoverable
            ));
            for plan in &summary.inconsistent {
                self.line(format_args!(
                    "  post {}: change /{} back to /{}",
                    plan.record_id, plan.new_name, plan.old_name
                ));
            }
        }
    }
}
