//! Autoscaler-induced drift suppression
//!
//! A HorizontalPodAutoscaler rewrites `spec.replicas` of its target, which
//! shows up as drift on every comparison. When enabled, a drift is hidden if
//! the resource is an autoscaler target and the diff only touches replica
//! and generation counters.

use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Api, ListParams};
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::error::{KubeError, Result};

/// Fields an autoscaler is expected to change
const HPA_FIELDS: &[&str] = &["replicas:", "generation:"];
const DYFF_HPA_PATHS: &[&str] = &["spec.replicas", "metadata.generation"];

/// Object targeted by an autoscaler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScaleTarget {
    pub kind: String,
    pub name: String,
}

impl ScaleTarget {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Lists autoscaler targets of a namespace
#[async_trait]
pub trait AutoscalerLister: Send + Sync {
    async fn list(&self, namespace: &str) -> Result<Vec<ScaleTarget>>;
}

/// Lists `autoscaling/v2` HorizontalPodAutoscalers through the API server
#[derive(Clone)]
pub struct KubeAutoscalerLister {
    client: Client,
}

impl KubeAutoscalerLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AutoscalerLister for KubeAutoscalerLister {
    async fn list(&self, namespace: &str) -> Result<Vec<ScaleTarget>> {
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        let hpas = api
            .list(&ListParams::default())
            .await
            .map_err(|e| KubeError::AutoscalerLookup {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?;

        Ok(hpas
            .items
            .into_iter()
            .filter_map(|hpa| hpa.spec)
            .map(|spec| ScaleTarget::new(spec.scale_target_ref.kind, spec.scale_target_ref.name))
            .collect())
    }
}

/// Check whether `kind`/`name` is the target of an autoscaler in `namespace`
///
/// Matching is exact and case-sensitive.
pub async fn is_managed_by_hpa(
    lister: &dyn AutoscalerLister,
    kind: &str,
    name: &str,
    namespace: &str,
) -> Result<bool> {
    let targets = lister.list(namespace).await?;
    Ok(targets.iter().any(|t| t.kind == kind && t.name == name))
}

/// Comparison tool used by kubectl, derived from the custom diff command
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiffTool {
    #[default]
    Diff,
    Dyff,
    Other(String),
}

impl DiffTool {
    /// Detect the tool from the first token of the command
    pub fn detect(command: Option<&str>) -> Self {
        match command.and_then(|c| c.split_whitespace().next()) {
            None | Some("diff") => DiffTool::Diff,
            Some("dyff") => DiffTool::Dyff,
            Some(other) => DiffTool::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DiffTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffTool::Diff => write!(f, "diff"),
            DiffTool::Dyff => write!(f, "dyff"),
            DiffTool::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Check whether a diff body only contains autoscaler-driven changes
pub fn has_only_hpa_changes(diff: &str, tool: &DiffTool) -> bool {
    let plain = console::strip_ansi_codes(diff);

    match tool {
        DiffTool::Diff => !plain.lines().any(is_foreign_diff_line),
        DiffTool::Dyff => !plain.lines().any(is_foreign_dyff_line),
        DiffTool::Other(name) => {
            tracing::warn!(
                tool = %name,
                "autoscaler changes cannot be detected for this diff tool"
            );
            false
        }
    }
}

fn is_foreign_diff_line(line: &str) -> bool {
    if line.starts_with("+++") || line.starts_with("---") {
        return false;
    }
    match line.strip_prefix('+').or_else(|| line.strip_prefix('-')) {
        Some(change) => {
            let change = change.trim_start();
            !HPA_FIELDS.iter().any(|field| change.starts_with(field))
        }
        None => false,
    }
}

fn is_foreign_dyff_line(line: &str) -> bool {
    if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
        return false;
    }
    !DYFF_HPA_PATHS.iter().any(|path| line.contains(path))
}

/// Suppression applies only when every condition holds
pub fn should_suppress(managed_by_hpa: bool, only_hpa_changes: bool, ignore_enabled: bool) -> bool {
    managed_by_hpa && only_hpa_changes && ignore_enabled
}
