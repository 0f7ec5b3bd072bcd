//! CLI command implementations

pub mod all;
pub mod run;

use chartdrift_core::ManifestFilter;
use chartdrift_kube::{
    connect, AutoscalerLister, DiffEngine, DriftConfig, DriftOptions, KubeAutoscalerLister,
    KubectlDiff,
};
use clap::Args;
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::display::{self, OutputFormat, Scope};
use crate::error::{CliError, Result};
use crate::prereq;
use crate::GlobalArgs;

/// Flags shared by `run` and `all`
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Regular expression used to split the rendered manifests
    #[arg(long)]
    pub regex: Option<String>,

    /// Root of the working directory [default: $HOME/.chartdrift/templates]
    #[arg(long)]
    pub temp_path: Option<PathBuf>,

    /// Skip the prerequisite checks
    #[arg(long)]
    pub skip_validation: bool,

    /// Keep the rendered manifests after the run
    #[arg(long)]
    pub skip_cleaning: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain)]
    pub output: OutputFormat,

    /// Exit successfully even when drift is found
    #[arg(short = 'd', long)]
    pub disable_error_on_drift: bool,

    /// Diff command handed to kubectl through KUBECTL_EXTERNAL_DIFF
    #[arg(long)]
    pub custom_diff: Option<String>,

    /// Only compare the resource with this name (ignored when --kind is set)
    #[arg(long)]
    pub name: Option<String>,

    /// Only compare resources of these kinds
    #[arg(long, value_delimiter = ',')]
    pub kind: Vec<String>,

    /// Never compare resources of these kinds
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Compare hook resources as well
    #[arg(long)]
    pub consider_hooks: bool,

    /// Hook delete policies whose resources are not compared
    #[arg(long, value_delimiter = ',', default_values = ["hook-succeeded", "hook-failed"])]
    pub ignore_hooks: Vec<String>,

    /// Hide drift caused only by horizontal pod autoscalers
    #[arg(long)]
    pub ignore_hpa_changes: bool,

    /// Maximum resources compared at once [default: all]
    #[arg(long)]
    pub diff_concurrency: Option<usize>,

    /// Strip standard Helm labels and annotations before comparing
    #[arg(long)]
    pub drop_helm_labels: bool,

    /// Also write the json/yaml summary to a file in the current directory
    #[arg(long)]
    pub report: bool,
}

impl CommonArgs {
    pub fn filter(&self) -> ManifestFilter {
        ManifestFilter {
            consider_hooks: self.consider_hooks,
            ignore_hook_types: self.ignore_hooks.clone(),
            skip_kinds: self.skip.clone(),
            kinds: self.kind.clone(),
            name: self.name.clone(),
        }
    }

    /// Options shared by every command
    pub fn options(&self, global: &GlobalArgs) -> DriftOptions {
        DriftOptions {
            namespace: global.namespace.clone(),
            kube_context: global.kube_context.clone(),
            kubeconfig: global.kubeconfig.clone(),
            kubectl_concurrency: global.concurrency,
            temp_path: self.temp_path.clone(),
            split_pattern: self.regex.clone(),
            filter: self.filter(),
            custom_diff: self.custom_diff.clone(),
            diff_concurrency: self.diff_concurrency,
            ignore_hpa_changes: self.ignore_hpa_changes,
            skip_clean: self.skip_cleaning,
            drop_helm_labels: self.drop_helm_labels,
            ..Default::default()
        }
    }
}

/// Resolve options into the configuration of the run
pub fn resolve(options: DriftOptions) -> Result<DriftConfig> {
    Ok(DriftConfig::from_options(options)?)
}

/// Check kubectl and the kubeconfig unless validation is skipped
pub fn check_prerequisites(config: &DriftConfig, common: &CommonArgs) -> Result<()> {
    if common.skip_validation {
        tracing::debug!("skipping prerequisite checks");
        return Ok(());
    }
    prereq::validate_kubeconfig(&config.kubeconfig)?;
    let kubectl = prereq::validate_kubectl()?;
    tracing::debug!(kubectl = %kubectl.display(), "prerequisites satisfied");
    Ok(())
}

/// Lazily connected API client
pub struct ClusterClient<'a> {
    config: &'a DriftConfig,
    client: Option<Client>,
}

impl<'a> ClusterClient<'a> {
    pub fn new(config: &'a DriftConfig) -> Self {
        Self { config, client: None }
    }

    pub async fn get(&mut self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = connect(self.config).await?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

/// Build the diff engine, connecting to the API server only when autoscalers matter
pub async fn engine(config: &DriftConfig, cluster: &mut ClusterClient<'_>) -> Result<DiffEngine> {
    let runner = Arc::new(KubectlDiff::new(config));
    let autoscalers: Option<Arc<dyn AutoscalerLister>> = if config.ignore_hpa_changes {
        Some(Arc::new(KubeAutoscalerLister::new(cluster.get().await?)))
    } else {
        None
    };
    Ok(DiffEngine::from_config(config, runner, autoscalers))
}

/// Print the results, export the report and turn drift into an error
pub fn finish(
    mut set: chartdrift_core::DriftedReleaseSet,
    scope: Scope,
    release: &str,
    common: &CommonArgs,
    elapsed: Duration,
) -> Result<()> {
    set.sort_by_release();
    tracing::debug!(phase = %chartdrift_kube::RunPhase::Rendering, "rendering results");

    let rendered = display::render(&set, scope, common.output, elapsed)?;
    print!("{}", rendered);

    if common.report {
        match common.output.report_extension() {
            Some(extension) => {
                let dir = std::env::current_dir()?;
                let path = display::write_report(&dir, scope, release, extension, &rendered)?;
                tracing::info!(path = %path.display(), "report generated");
            }
            None => tracing::warn!("--report is only supported with json or yaml output"),
        }
    }

    let drifts: usize = set.iter().map(|r| r.drift_count()).sum();
    if drifts > 0 && !common.disable_error_on_drift {
        return Err(CliError::DriftFound { count: drifts });
    }
    Ok(())
}
