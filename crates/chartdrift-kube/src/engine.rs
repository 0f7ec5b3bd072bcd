//! Concurrent diff engine
//!
//! Every deviation of a release is compared in its own task. A semaphore
//! bounds how many comparisons (autoscaler lookup plus `kubectl diff`) run
//! at once. All tasks are joined before returning; when any of them failed
//! the failures are reported together and no partial result is returned.

use chartdrift_core::{Deviation, DriftedRelease};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::DriftConfig;
use crate::error::{KubeError, Result};
use crate::hpa::{
    has_only_hpa_changes, is_managed_by_hpa, should_suppress, AutoscalerLister, DiffTool,
};
use crate::kubectl::{DiffRequest, DiffRunner};

/// Runs the comparisons of a release concurrently
#[derive(Clone)]
pub struct DiffEngine {
    runner: Arc<dyn DiffRunner>,
    autoscalers: Option<Arc<dyn AutoscalerLister>>,
    concurrency: Option<usize>,
    ignore_hpa_changes: bool,
    diff_tool: DiffTool,
}

impl DiffEngine {
    /// Create an engine without a concurrency limit or autoscaler handling
    pub fn new(runner: Arc<dyn DiffRunner>) -> Self {
        Self {
            runner,
            autoscalers: None,
            concurrency: None,
            ignore_hpa_changes: false,
            diff_tool: DiffTool::default(),
        }
    }

    /// Create an engine configured from a resolved configuration
    pub fn from_config(
        config: &DriftConfig,
        runner: Arc<dyn DiffRunner>,
        autoscalers: Option<Arc<dyn AutoscalerLister>>,
    ) -> Self {
        let engine = Self::new(runner).with_concurrency(config.diff_concurrency);
        match autoscalers {
            Some(lister) => engine.with_autoscalers(
                lister,
                config.ignore_hpa_changes,
                config.diff_tool.clone(),
            ),
            None => engine,
        }
    }

    /// Limit in-flight comparisons, `None` admits every deviation at once
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enable autoscaler-induced drift suppression
    pub fn with_autoscalers(
        mut self,
        lister: Arc<dyn AutoscalerLister>,
        ignore_hpa_changes: bool,
        diff_tool: DiffTool,
    ) -> Self {
        self.autoscalers = Some(lister);
        self.ignore_hpa_changes = ignore_hpa_changes;
        self.diff_tool = diff_tool;
        self
    }

    /// Number of comparisons admitted at once for `total` deviations
    pub fn permits(&self, total: usize) -> usize {
        self.concurrency.unwrap_or(total).max(1)
    }

    /// Compare every deviation of `release` with the cluster
    pub async fn diff_release(&self, release: DriftedRelease) -> Result<DriftedRelease> {
        let DriftedRelease {
            release: name,
            chart,
            namespace,
            deviations,
            ..
        } = release;

        let total = deviations.len();
        let semaphore = Arc::new(Semaphore::new(self.permits(total)));
        let mut tasks = JoinSet::new();

        tracing::debug!(
            release = %name,
            resources = total,
            permits = self.permits(total),
            "comparing resources"
        );

        for (index, deviation) in deviations.into_iter().enumerate() {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let release_namespace = namespace.clone();

            tasks.spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => engine.compare(deviation, &release_namespace).await,
                    Err(e) => Err(KubeError::Task(format!("semaphore closed: {}", e))),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Deviation>> = vec![None; total];
        let mut errors = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(deviation))) => slots[index] = Some(deviation),
                Ok((_, Err(e))) => errors.push(e),
                Err(e) => errors.push(KubeError::from(e)),
            }
        }

        if let Some(err) = KubeError::aggregate(errors) {
            tracing::error!(release = %name, "comparing resources failed");
            return Err(err);
        }

        let deviations = slots.into_iter().flatten().collect();
        Ok(DriftedRelease::new(name, namespace, chart).with_deviations(deviations))
    }

    async fn compare(
        &self,
        mut deviation: Deviation,
        release_namespace: &str,
    ) -> Result<Deviation> {
        let namespace = resolve_namespace(&deviation, release_namespace).to_string();

        let managed_by_hpa = match (&self.autoscalers, self.ignore_hpa_changes) {
            (Some(lister), true) => {
                is_managed_by_hpa(lister.as_ref(), &deviation.kind, &deviation.resource, &namespace)
                    .await?
            }
            _ => false,
        };

        let request = DiffRequest {
            manifest_path: deviation.manifest_path.clone(),
            namespace,
            kind: deviation.kind.clone(),
            name: deviation.resource.clone(),
        };
        let outcome = self.runner.diff(&request).await?;
        deviation.record(outcome.into_body());

        if deviation.has_drift {
            let only_hpa = has_only_hpa_changes(&deviation.diff, &self.diff_tool);
            if should_suppress(managed_by_hpa, only_hpa, self.ignore_hpa_changes) {
                tracing::info!(
                    kind = %deviation.kind,
                    name = %deviation.resource,
                    "ignoring drift caused by horizontal pod autoscaler"
                );
                deviation.suppress();
            }
        }

        Ok(deviation)
    }
}

/// Namespace a resource is compared in, the manifest namespace wins
pub fn resolve_namespace<'a>(deviation: &'a Deviation, release_namespace: &'a str) -> &'a str {
    deviation
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(release_namespace)
}
