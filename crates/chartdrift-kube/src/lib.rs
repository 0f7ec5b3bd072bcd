//! chartdrift kube - talking to helm, kubectl and the API server
//!
//! This crate provides:
//! - **Configuration**: options resolved once into an immutable [`DriftConfig`]
//! - **Sources**: manifests from `helm template` or from Helm's release Secrets
//! - **Materialization**: the per-release working directory and manifest files
//! - **Diff Engine**: bounded concurrent `kubectl diff` over every resource
//! - **Autoscaler Suppression**: hiding replica drift caused by HPAs
//! - **Orchestration**: single release and cluster-wide runs

pub mod client;
pub mod config;
pub mod disk;
pub mod engine;
pub mod error;
pub mod hpa;
pub mod kubectl;
pub mod mock;
pub mod orchestrator;
pub mod source;

pub use client::connect;
pub use config::{DriftConfig, DriftOptions, Environment, DEFAULT_NAMESPACE};
pub use disk::{materialize, Workspace, WorkspaceGuard};
pub use engine::{resolve_namespace, DiffEngine};
pub use error::{KubeError, Result};
pub use hpa::{
    has_only_hpa_changes, is_managed_by_hpa, should_suppress, AutoscalerLister, DiffTool,
    KubeAutoscalerLister, ScaleTarget,
};
pub use kubectl::{DiffOutcome, DiffRequest, DiffRunner, KubectlDiff};
pub use mock::{
    MockAutoscalerLister, MockDiff, MockDiffRunner, MockManifestSource, MockReleaseLister,
};
pub use orchestrator::{ClusterScan, Orchestrator, PhaseTracker, RunPhase};
pub use source::{
    decode_release, HelmSecretsSource, HelmTemplateSource, ManifestSource, ReleaseInfo,
    ReleaseLister, ReleaseTarget, TemplateOptions,
};
