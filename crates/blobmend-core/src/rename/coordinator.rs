//! Run-level orchestration: list, select, rename one candidate at a time.

use super::executor::RenameExecutor;
use crate::config::RenameConfig;
use crate::error::Result;
use crate::models::{PlannedRename, RenameCandidate, RunSummary};
use crate::naming::FilenamePolicy;
use crate::references::{ReferenceResolver, ReferenceStore};
use crate::report::ProgressReporter;
use crate::storage::{AssetLister, ObjectStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives a rename run over one container and one reference store.
///
/// Candidates are processed strictly one after another, in listing order
/// (most recently modified first). A failure on one candidate never stops
/// the run; only a listing failure does.
pub struct Coordinator {
    config: RenameConfig,
    policy: FilenamePolicy,
    references: Arc<dyn ReferenceStore>,
    objects: Arc<dyn ObjectStore>,
    reporter: Arc<dyn ProgressReporter>,
}

impl Coordinator {
    /// Create a coordinator. Fails if `config` is invalid.
    pub fn new(
        config: RenameConfig,
        references: Arc<dyn ReferenceStore>,
        objects: Arc<dyn ObjectStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = FilenamePolicy::new(config.prefix.clone());
        Ok(Self {
            config,
            policy,
            references,
            objects,
            reporter,
        })
    }

    pub fn config(&self) -> &RenameConfig {
        &self.config
    }

    /// List the container and keep the non-conformant assets.
    ///
    /// Returns the total number of listed assets alongside the candidates.
    pub async fn list_candidates(&self) -> Result<(usize, Vec<RenameCandidate>)> {
        let lister = AssetLister::new(
            self.objects.as_ref(),
            self.config.page_size,
            &self.config.listing_retry,
        );
        let assets = lister.list_all().await?;
        self.reporter.listed(self.objects.container(), &assets);

        let listed = assets.len();
        let candidates: Vec<RenameCandidate> = assets
            .into_iter()
            .filter(|asset| !self.policy.is_conformant(&asset.name))
            .map(|asset| RenameCandidate { asset })
            .collect();

        info!(
            container = self.objects.container(),
            listed,
            candidates = candidates.len(),
            prefix = self.policy.prefix(),
            "Selected rename candidates"
        );
        self.reporter.candidates_found(candidates.len());
        Ok((listed, candidates))
    }

    /// Rename every candidate and return the tally.
    pub async fn run(&self) -> Result<RunSummary> {
        let (listed, candidates) = self.list_candidates().await?;
        let mut summary = RunSummary {
            listed,
            candidates: candidates.len(),
            ..RunSummary::default()
        };

        let executor = RenameExecutor::new(
            &self.policy,
            self.references.as_ref(),
            self.objects.as_ref(),
            self.config.copy_poll,
            self.reporter.as_ref(),
        );
        for candidate in &candidates {
            let outcome = executor.execute(candidate).await;
            summary.record(&candidate.asset.name, &outcome);
        }

        info!(
            renamed = summary.renamed,
            not_renamed = summary.not_renamed(),
            rolled_back = summary.rolled_back,
            failed = summary.failed,
            unrecoverable = summary.unrecoverable,
            "Rename run finished"
        );
        self.reporter.finished(&summary);
        Ok(summary)
    }

    /// Resolve every candidate and generate names without mutating anything.
    ///
    /// A failed lookup is recorded on that candidate's entry; planning goes on
    /// with the next one.
    pub async fn plan(&self) -> Result<Vec<PlannedRename>> {
        let (_, candidates) = self.list_candidates().await?;
        let resolver = ReferenceResolver::new(self.references.as_ref());

        let mut planned = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let asset_name = candidate.asset.name;
            let resolved = resolver.find_referencing(&asset_name).and_then(|reference| {
                let new_name = match reference {
                    Some(_) => Some(self.policy.generate_name(&asset_name)?),
                    None => None,
                };
                Ok((reference, new_name))
            });

            let entry = match resolved {
                Ok((reference, new_name)) => PlannedRename {
                    asset_name,
                    reference,
                    new_name,
                    error: None,
                },
                Err(e) => {
                    warn!(old_name = %asset_name, error = %e, "Could not plan rename");
                    PlannedRename {
                        asset_name,
                        reference: None,
                        new_name: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            self.reporter.planned(&entry);
            planned.push(entry);
        }
        Ok(planned)
    }
}
