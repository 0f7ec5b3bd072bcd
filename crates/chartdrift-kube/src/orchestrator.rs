//! Release and cluster runs
//!
//! A release run takes a manifest bundle through acquisition, filtering,
//! materialization and comparison. A cluster run does the same for every
//! deployed release, several releases at once.

use chartdrift_core::{split_manifests, DriftedRelease, DriftedReleaseSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::DriftConfig;
use crate::disk::{materialize, Workspace};
use crate::engine::DiffEngine;
use crate::error::{KubeError, Result};
use crate::source::{ManifestSource, ReleaseLister, ReleaseTarget};

/// Label of the cluster scan in phase logs
const ALL_RELEASES: &str = "all";

/// Phase of a release run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Acquiring,
    Filtering,
    Materializing,
    Diffing,
    Aggregating,
    Rendering,
    CleaningUp,
    Done,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Initializing => "initializing",
            RunPhase::Acquiring => "acquiring",
            RunPhase::Filtering => "filtering",
            RunPhase::Materializing => "materializing",
            RunPhase::Diffing => "diffing",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Rendering => "rendering",
            RunPhase::CleaningUp => "cleaning-up",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Records and logs the phases a run goes through
#[derive(Debug)]
pub struct PhaseTracker {
    release: String,
    history: Vec<RunPhase>,
    failed_in: Option<RunPhase>,
}

impl PhaseTracker {
    pub fn new(release: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            history: vec![RunPhase::Initializing],
            failed_in: None,
        }
    }

    pub fn current(&self) -> RunPhase {
        self.history.last().copied().unwrap_or(RunPhase::Initializing)
    }

    pub fn advance(&mut self, next: RunPhase) {
        tracing::debug!(
            release = %self.release,
            from = %self.current(),
            to = %next,
            "phase transition"
        );
        self.history.push(next);
    }

    /// Remember that the run failed in the current phase
    pub fn fail(&mut self, error: &KubeError) {
        let phase = self.current();
        tracing::error!(release = %self.release, phase = %phase, error = %error, "run failed");
        self.failed_in = Some(phase);
    }

    /// Move to the terminal phase, `Failed` when [`fail`](Self::fail) was called
    pub fn finish(&mut self) {
        let terminal = if self.failed_in.is_some() {
            RunPhase::Failed
        } else {
            RunPhase::Done
        };
        self.advance(terminal);
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    pub fn failed_in(&self) -> Option<RunPhase> {
        self.failed_in
    }
}

/// Outcome of a cluster scan
#[derive(Debug, Default)]
pub struct ClusterScan {
    /// Releases with drift
    pub drifted: DriftedReleaseSet,

    /// One error per release whose detection failed
    pub failures: Vec<KubeError>,
}

impl ClusterScan {
    /// Drifted releases and, when some releases failed, their failures as one error
    pub fn into_parts(self) -> (DriftedReleaseSet, Option<KubeError>) {
        (self.drifted, KubeError::aggregate(self.failures))
    }
}

/// Drives release and cluster runs
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<DriftConfig>,
    source: Option<Arc<dyn ManifestSource>>,
    lister: Option<Arc<dyn ReleaseLister>>,
    engine: DiffEngine,
}

impl Orchestrator {
    pub fn new(config: Arc<DriftConfig>, engine: DiffEngine) -> Self {
        Self {
            config,
            source: None,
            lister: None,
            engine,
        }
    }

    /// Source used by release runs
    pub fn with_source(mut self, source: Arc<dyn ManifestSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Lister used by cluster runs
    pub fn with_lister(mut self, lister: Arc<dyn ReleaseLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Detect drift of a single release
    pub async fn run_release(&self, target: &ReleaseTarget) -> Result<DriftedRelease> {
        let mut tracker = PhaseTracker::new(&target.name);
        self.run_release_tracked(target, &mut tracker).await
    }

    /// Detect drift of a single release, recording its phases in `tracker`
    pub async fn run_release_tracked(
        &self,
        target: &ReleaseTarget,
        tracker: &mut PhaseTracker,
    ) -> Result<DriftedRelease> {
        let workspace = Workspace::for_release(self.config.temp_path(), &target.name);
        workspace.clean()?;
        let guard = workspace.guard(self.config.skip_clean);

        let result = self
            .process(target, None, &workspace.release_dir(target), tracker)
            .await;

        tracker.advance(RunPhase::CleaningUp);
        drop(guard);
        tracker.finish();
        result
    }

    /// Detect drift of every deployed release in scope
    ///
    /// Only releases with drift are part of the result. A failing release
    /// does not affect the others; its error is part of the returned scan.
    pub async fn run_all(&self) -> Result<ClusterScan> {
        let lister = self
            .lister
            .as_ref()
            .ok_or_else(|| KubeError::InvalidConfig("no release lister configured".to_string()))?;

        let workspace = Workspace::for_all(self.config.temp_path());
        workspace.clean()?;
        let guard = workspace.guard(self.config.skip_clean);

        let mut tracker = PhaseTracker::new(ALL_RELEASES);
        let scan = self.scan(lister.as_ref(), &workspace, &mut tracker).await;
        if let Err(e) = &scan {
            tracker.fail(e);
        }

        tracker.advance(RunPhase::CleaningUp);
        drop(guard);
        tracker.finish();
        scan
    }

    async fn scan(
        &self,
        lister: &dyn ReleaseLister,
        workspace: &Workspace,
        tracker: &mut PhaseTracker,
    ) -> Result<ClusterScan> {
        tracker.advance(RunPhase::Acquiring);
        let scope = self.config.release_scope();
        let releases = lister.list(scope).await?;
        let found = releases.len();
        let releases = self
            .config
            .skip_releases
            .filter(releases, |r| (r.name.as_str(), r.namespace.as_str()));

        tracing::info!(
            scope = scope.unwrap_or("all namespaces"),
            found,
            skipped = found - releases.len(),
            "identifying drifts in releases"
        );

        tracker.advance(RunPhase::Diffing);
        let permits = self
            .config
            .release_concurrency
            .unwrap_or(releases.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for info in releases {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let target = info.target();
            let dir = workspace.release_dir(&target);

            tasks.spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => {
                        let mut tracker = PhaseTracker::new(&target.name);
                        let result = this
                            .process(&target, Some(info.manifest), &dir, &mut tracker)
                            .await;
                        tracker.finish();
                        result
                    }
                    Err(e) => Err(KubeError::Task(format!("semaphore closed: {}", e))),
                };
                result.map_err(|e| KubeError::ReleaseFailed {
                    release: target.name,
                    namespace: target.namespace,
                    source: Box::new(e),
                })
            });
        }

        let mut scan = ClusterScan::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(release)) if release.has_drift => scan.drifted.push(release),
                Ok(Ok(release)) => {
                    tracing::info!(
                        release = %release.release,
                        namespace = %release.namespace,
                        "no drifts identified"
                    );
                }
                Ok(Err(e)) => scan.failures.push(e),
                Err(e) => scan.failures.push(KubeError::from(e)),
            }
        }

        tracker.advance(RunPhase::Aggregating);
        if !scan.failures.is_empty() {
            tracing::warn!(
                failed = scan.failures.len(),
                drifted = scan.drifted.len(),
                "some releases could not be checked"
            );
        }
        Ok(scan)
    }

    async fn process(
        &self,
        target: &ReleaseTarget,
        bundle: Option<String>,
        dir: &Path,
        tracker: &mut PhaseTracker,
    ) -> Result<DriftedRelease> {
        let result = self.stages(target, bundle, dir, tracker).await;
        if let Err(e) = &result {
            tracker.fail(e);
        }
        result
    }

    async fn stages(
        &self,
        target: &ReleaseTarget,
        bundle: Option<String>,
        dir: &Path,
        tracker: &mut PhaseTracker,
    ) -> Result<DriftedRelease> {
        tracker.advance(RunPhase::Acquiring);
        let bundle = match bundle {
            Some(bundle) => bundle,
            None => {
                let source = self.source.as_ref().ok_or_else(|| {
                    KubeError::InvalidConfig("no manifest source configured".to_string())
                })?;
                source.manifest(target).await?
            }
        };

        tracker.advance(RunPhase::Filtering);
        let documents = split_manifests(&bundle, &self.config.split_pattern);
        let documents = self.config.filter.apply(documents)?;
        tracing::debug!(release = %target.name, documents = documents.len(), "manifests filtered");

        tracker.advance(RunPhase::Materializing);
        let release = materialize(&documents, target, dir, self.config.drop_helm_labels)?;

        tracker.advance(RunPhase::Diffing);
        let mut release = self.engine.diff_release(release).await?;

        tracker.advance(RunPhase::Aggregating);
        release.refresh_drift();
        Ok(release)
    }
}
