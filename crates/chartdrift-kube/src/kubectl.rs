//! Comparison of a manifest file against the live cluster with `kubectl diff`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::{DriftConfig, EXTERNAL_DIFF_ENV, KUBECONFIG_ENV};
use crate::error::{KubeError, Result};

/// One comparison to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRequest {
    pub manifest_path: PathBuf,
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

/// Result of a successful comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Live state matches the manifest
    NoDrift,
    /// Live state differs, with the tool output
    Drift(String),
}

impl DiffOutcome {
    pub fn into_body(self) -> Option<String> {
        match self {
            DiffOutcome::NoDrift => None,
            DiffOutcome::Drift(body) => Some(body),
        }
    }
}

/// Runs comparisons against the cluster
#[async_trait]
pub trait DiffRunner: Send + Sync {
    async fn diff(&self, request: &DiffRequest) -> Result<DiffOutcome>;
}

/// `kubectl diff` backed runner
#[derive(Debug, Clone)]
pub struct KubectlDiff {
    binary: String,
    kubeconfig: PathBuf,
    context: Option<String>,
    concurrency: u32,
    external_diff: Option<String>,
}

impl KubectlDiff {
    pub fn new(config: &DriftConfig) -> Self {
        Self {
            binary: "kubectl".to_string(),
            kubeconfig: config.kubeconfig.clone(),
            context: config.kube_context.clone(),
            concurrency: config.kubectl_concurrency,
            external_diff: config.custom_diff.clone(),
        }
    }

    /// Use another kubectl binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Arguments passed to kubectl for `request`
    pub fn args(&self, request: &DiffRequest) -> Vec<String> {
        let mut args = vec![
            "diff".to_string(),
            "-f".to_string(),
            request.manifest_path.display().to_string(),
            format!("-n={}", request.namespace),
            format!("--concurrency={}", self.concurrency),
        ];
        if let Some(context) = &self.context {
            args.push(format!("--context={}", context));
        }
        if !self.kubeconfig.as_os_str().is_empty() {
            args.push(format!("--kubeconfig={}", self.kubeconfig.display()));
        }
        args
    }

    fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }
}

#[async_trait]
impl DiffRunner for KubectlDiff {
    async fn diff(&self, request: &DiffRequest) -> Result<DiffOutcome> {
        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(self.args(request))
            .env(KUBECONFIG_ENV, self.kubeconfig())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(external) = &self.external_diff {
            command.env(EXTERNAL_DIFF_ENV, external);
        }

        tracing::debug!(
            kind = %request.kind,
            name = %request.name,
            namespace = %request.namespace,
            "running kubectl diff"
        );

        let output = command.output().await.map_err(|e| KubeError::DiffFailed {
            kind: request.kind.clone(),
            name: request.name.clone(),
            code: "spawn".to_string(),
            output: format!("failed to spawn {}: {}", self.binary, e),
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        interpret_exit(output.status.code(), combined, request)
    }
}

/// Map a kubectl exit code to an outcome
///
/// 0 means no drift, 1 means drift, anything else (or a signal) is an error.
pub fn interpret_exit(
    code: Option<i32>,
    output: String,
    request: &DiffRequest,
) -> Result<DiffOutcome> {
    match code {
        Some(0) => Ok(DiffOutcome::NoDrift),
        Some(1) => Ok(DiffOutcome::Drift(output)),
        other => Err(KubeError::DiffFailed {
            kind: request.kind.clone(),
            name: request.name.clone(),
            code: other.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            output,
        }),
    }
}
