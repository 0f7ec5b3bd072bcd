//! In-memory collaborators for testing
//!
//! These stand in for helm, kubectl and the API server so the engine and the
//! orchestrator can be exercised without a cluster.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{KubeError, Result};
use crate::hpa::{AutoscalerLister, ScaleTarget};
use crate::kubectl::{DiffOutcome, DiffRequest, DiffRunner};
use crate::source::{ManifestSource, ReleaseInfo, ReleaseLister, ReleaseTarget};

/// Manifest source serving fixed bundles keyed by release name
#[derive(Clone, Default)]
pub struct MockManifestSource {
    manifests: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockManifestSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(self, release: &str, manifest: &str) -> Self {
        self.manifests
            .write()
            .unwrap()
            .insert(release.to_string(), manifest.to_string());
        self
    }

    /// Number of manifest requests served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestSource for MockManifestSource {
    async fn manifest(&self, target: &ReleaseTarget) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.manifests
            .read()
            .unwrap()
            .get(&target.name)
            .cloned()
            .ok_or_else(|| KubeError::Acquisition {
                release: target.name.clone(),
                message: "no manifest registered".to_string(),
            })
    }
}

/// Release lister over a fixed set of releases
#[derive(Clone, Default)]
pub struct MockReleaseLister {
    releases: Arc<RwLock<Vec<ReleaseInfo>>>,
    scopes: Arc<RwLock<Vec<Option<String>>>>,
}

impl MockReleaseLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(self, name: &str, namespace: &str, manifest: &str) -> Self {
        self.releases.write().unwrap().push(ReleaseInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            chart: Some(format!("{}-1.0.0", name)),
            manifest: manifest.to_string(),
        });
        self
    }

    /// Scopes requested so far
    pub fn scopes(&self) -> Vec<Option<String>> {
        self.scopes.read().unwrap().clone()
    }
}

#[async_trait]
impl ReleaseLister for MockReleaseLister {
    async fn list(&self, scope: Option<&str>) -> Result<Vec<ReleaseInfo>> {
        self.scopes.write().unwrap().push(scope.map(str::to_string));
        Ok(self
            .releases
            .read()
            .unwrap()
            .iter()
            .filter(|r| scope.is_none_or(|ns| r.namespace == ns))
            .cloned()
            .collect())
    }
}

/// Autoscaler lister over fixed targets per namespace
#[derive(Clone, Default)]
pub struct MockAutoscalerLister {
    targets: Arc<RwLock<HashMap<String, Vec<ScaleTarget>>>>,
    failing: bool,
    lookups: Arc<AtomicUsize>,
}

impl MockAutoscalerLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(self, namespace: &str, target: ScaleTarget) -> Self {
        self.targets
            .write()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .push(target);
        self
    }

    /// Make every lookup fail
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutoscalerLister for MockAutoscalerLister {
    async fn list(&self, namespace: &str) -> Result<Vec<ScaleTarget>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(KubeError::AutoscalerLookup {
                namespace: namespace.to_string(),
                message: "forbidden".to_string(),
            });
        }
        Ok(self
            .targets
            .read()
            .unwrap()
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }
}

/// Scripted result of one mocked comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockDiff {
    NoDrift,
    Drift(String),
    /// Exit code other than 0 or 1
    Exit(i32, String),
}

/// Diff runner with scripted outcomes keyed by resource name
///
/// Tracks how many comparisons run at once.
#[derive(Clone, Default)]
pub struct MockDiffRunner {
    outcomes: Arc<RwLock<HashMap<String, MockDiff>>>,
    requests: Arc<RwLock<Vec<DiffRequest>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockDiffRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, name: &str, outcome: MockDiff) -> Self {
        self.outcomes
            .write()
            .unwrap()
            .insert(name.to_string(), outcome);
        self
    }

    /// Hold every comparison for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of comparisons observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<DiffRequest> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl DiffRunner for MockDiffRunner {
    async fn diff(&self, request: &DiffRequest) -> Result<DiffOutcome> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.requests.write().unwrap().push(request.clone());

        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let outcome = self
            .outcomes
            .read()
            .unwrap()
            .get(&request.name)
            .cloned()
            .unwrap_or(MockDiff::NoDrift);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            MockDiff::NoDrift => Ok(DiffOutcome::NoDrift),
            MockDiff::Drift(body) => Ok(DiffOutcome::Drift(body)),
            MockDiff::Exit(code, output) => {
                crate::kubectl::interpret_exit(Some(code), output, request)
            }
        }
    }
}
