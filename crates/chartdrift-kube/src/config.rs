//! Drift configuration
//!
//! [`DriftOptions`] is what the user asked for; [`DriftConfig`] is the
//! resolved, immutable configuration shared by every component of a run.
//! Everything that depends on the process environment (default namespace,
//! kubeconfig location, external diff tool, helm binary) is resolved here,
//! once.

use chartdrift_core::{split_pattern, ManifestFilter, ReleaseSkipList, DEFAULT_SPLIT_PATTERN};
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::{KubeError, Result};
use crate::hpa::DiffTool;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Environment variable kubectl reads its external diff command from
pub const EXTERNAL_DIFF_ENV: &str = "KUBECTL_EXTERNAL_DIFF";

/// Environment variable holding the kubeconfig path
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Environment variable overriding the helm binary
pub const HELM_BIN_ENV: &str = "HELM_BIN";

const DEFAULT_HELM_BINARY: &str = "helm";

/// Options as provided by the user
#[derive(Debug, Clone)]
pub struct DriftOptions {
    /// Release namespace (`default` when unset)
    pub namespace: Option<String>,

    /// Treat the `default` namespace as a real scope in cluster scans
    pub is_default_namespace: bool,

    /// Kubeconfig context
    pub kube_context: Option<String>,

    /// Kubeconfig path
    pub kubeconfig: Option<PathBuf>,

    /// Root of the working directory tree
    pub temp_path: Option<PathBuf>,

    /// Pattern used to split rendered bundles
    pub split_pattern: Option<String>,

    /// Document filters
    pub filter: ManifestFilter,

    /// Releases skipped in cluster scans, as `name=namespace`
    pub skip_releases: Vec<String>,

    /// Custom diff command handed to kubectl
    pub custom_diff: Option<String>,

    /// Value passed to `kubectl diff --concurrency`
    pub kubectl_concurrency: u32,

    /// Maximum in-flight comparisons per release (all at once when unset)
    pub diff_concurrency: Option<usize>,

    /// Maximum releases scanned at once (all at once when unset)
    pub release_concurrency: Option<usize>,

    /// Hide drift caused only by autoscaling
    pub ignore_hpa_changes: bool,

    /// Keep the working directory after the run
    pub skip_clean: bool,

    /// Strip standard Helm labels before comparing
    pub drop_helm_labels: bool,
}

impl Default for DriftOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            is_default_namespace: false,
            kube_context: None,
            kubeconfig: None,
            temp_path: None,
            split_pattern: None,
            filter: ManifestFilter::default(),
            skip_releases: Vec::new(),
            custom_diff: None,
            kubectl_concurrency: 1,
            diff_concurrency: None,
            release_concurrency: None,
            ignore_hpa_changes: false,
            skip_clean: false,
            drop_helm_labels: false,
        }
    }
}

/// Process environment consulted while resolving options
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub kubeconfig: Option<String>,
    pub external_diff: Option<String>,
    pub helm: Option<String>,
    pub home: Option<PathBuf>,
}

impl Environment {
    /// Capture the current process environment
    pub fn capture() -> Self {
        Self {
            kubeconfig: non_empty(std::env::var(KUBECONFIG_ENV).ok()),
            external_diff: non_empty(std::env::var(EXTERNAL_DIFF_ENV).ok()),
            helm: non_empty(std::env::var(HELM_BIN_ENV).ok()),
            home: dirs::home_dir(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolved, immutable drift configuration
#[derive(Debug, Clone)]
pub struct DriftConfig {
    pub namespace: String,
    pub is_default_namespace: bool,
    pub kube_context: Option<String>,
    pub kubeconfig: PathBuf,
    pub temp_path: PathBuf,
    pub split_pattern: Regex,
    pub filter: ManifestFilter,
    pub skip_releases: ReleaseSkipList,
    pub custom_diff: Option<String>,
    pub diff_tool: DiffTool,
    pub helm_binary: String,
    pub kubectl_concurrency: u32,
    pub diff_concurrency: Option<usize>,
    pub release_concurrency: Option<usize>,
    pub ignore_hpa_changes: bool,
    pub skip_clean: bool,
    pub drop_helm_labels: bool,
}

impl DriftConfig {
    /// Resolve options against the current process environment
    pub fn from_options(options: DriftOptions) -> Result<Self> {
        Self::resolve(options, &Environment::capture())
    }

    /// Resolve options against an explicit environment
    pub fn resolve(options: DriftOptions, env: &Environment) -> Result<Self> {
        let namespace = options
            .namespace
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let kubeconfig = options
            .kubeconfig
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| env.kubeconfig.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| home_or_temp(env).join(".kube").join("config"));

        let temp_path = options
            .temp_path
            .unwrap_or_else(|| default_temp_path(env));

        let pattern = options
            .split_pattern
            .as_deref()
            .unwrap_or(DEFAULT_SPLIT_PATTERN);

        let custom_diff = non_empty(options.custom_diff).or_else(|| env.external_diff.clone());
        let diff_tool = DiffTool::detect(custom_diff.as_deref());

        for (flag, value) in [
            ("diff concurrency", options.diff_concurrency),
            ("release concurrency", options.release_concurrency),
        ] {
            if value == Some(0) {
                return Err(KubeError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    flag
                )));
            }
        }

        if options.kubectl_concurrency == 0 {
            return Err(KubeError::InvalidConfig(
                "kubectl concurrency must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            namespace,
            is_default_namespace: options.is_default_namespace,
            kube_context: non_empty(options.kube_context),
            kubeconfig,
            temp_path,
            split_pattern: split_pattern(pattern)?,
            filter: options.filter,
            skip_releases: ReleaseSkipList::from_specs(&options.skip_releases)?,
            custom_diff,
            diff_tool,
            helm_binary: env
                .helm
                .clone()
                .unwrap_or_else(|| DEFAULT_HELM_BINARY.to_string()),
            kubectl_concurrency: options.kubectl_concurrency,
            diff_concurrency: options.diff_concurrency,
            release_concurrency: options.release_concurrency,
            ignore_hpa_changes: options.ignore_hpa_changes,
            skip_clean: options.skip_clean,
            drop_helm_labels: options.drop_helm_labels,
        })
    }

    /// Namespace restriction for release listing
    ///
    /// `default` only restricts the scan when explicitly requested, otherwise
    /// it means "every namespace".
    pub fn release_scope(&self) -> Option<&str> {
        if self.namespace == DEFAULT_NAMESPACE && !self.is_default_namespace {
            None
        } else {
            Some(self.namespace.as_str())
        }
    }

    /// Root of the working directory tree
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}

fn home_or_temp(env: &Environment) -> PathBuf {
    env.home.clone().unwrap_or_else(std::env::temp_dir)
}

fn default_temp_path(env: &Environment) -> PathBuf {
    home_or_temp(env).join(".chartdrift").join("templates")
}
