//! Human-readable progress surface.
//!
//! Structured diagnostics go through `tracing`; this trait is the separate,
//! operator-facing status channel (a console, a UI, a test recorder). Every
//! method has an empty default so implementors pick what they show.

use crate::models::{Asset, PlannedRename, ReferenceMatch, RenameOutcome, RenamePlan, RunSummary};

/// Receives progress events from a rename run.
pub trait ProgressReporter: Send + Sync {
    /// The container listing finished.
    fn listed(&self, _container: &str, _assets: &[Asset]) {}

    /// Non-conformant assets were selected for renaming.
    fn candidates_found(&self, _count: usize) {}

    /// A referencing record was found for `asset_name`.
    fn reference_found(&self, _asset_name: &str, _reference: &ReferenceMatch) {}

    /// A rename is about to mutate both stores.
    fn renaming(&self, _plan: &RenamePlan, _reference: &ReferenceMatch) {}

    /// One candidate reached its terminal outcome.
    fn outcome(&self, _asset_name: &str, _outcome: &RenameOutcome) {}

    /// A dry run computed the plan for one candidate.
    fn planned(&self, _planned: &PlannedRename) {}

    /// The run is over.
    fn finished(&self, _summary: &RunSummary) {}
}

/// Reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {}
