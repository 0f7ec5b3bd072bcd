//! Run command - detect drift of a single release

use chartdrift_core::DriftedReleaseSet;
use chartdrift_kube::{
    HelmSecretsSource, HelmTemplateSource, ManifestSource, Orchestrator, ReleaseTarget,
    TemplateOptions,
};
use clap::Args;
use std::sync::Arc;
use std::time::Instant;

use super::{check_prerequisites, engine, finish, resolve, ClusterClient, CommonArgs};
use crate::display::Scope;
use crate::error::Result;
use crate::prereq;
use crate::GlobalArgs;

/// Arguments of the run command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Release name
    pub release: String,

    /// Chart reference (path, repo/chart or URL)
    #[arg(required_unless_present = "from_release")]
    pub chart: Option<String>,

    /// Values files (`-` reads stdin)
    #[arg(short = 'f', long = "values", value_delimiter = ',')]
    pub values: Vec<String>,

    /// Set values on the command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Set string values on the command line (key=value)
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Set values from files (key=path)
    #[arg(long = "set-file")]
    pub set_file: Vec<String>,

    /// Chart version constraint
    #[arg(long = "version")]
    pub chart_version: Option<String>,

    /// Skip tests from the rendered templates
    #[arg(long)]
    pub skip_tests: bool,

    /// Do not render CRDs
    #[arg(long)]
    pub skip_crds: bool,

    /// Validate the rendered manifests against the cluster
    #[arg(long)]
    pub validate: bool,

    /// Compare the manifest stored with the deployed release instead of rendering the chart
    #[arg(long)]
    pub from_release: bool,

    /// Release revision to compare, the deployed one when unset
    #[arg(long, requires = "from_release")]
    pub revision: Option<u32>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl RunArgs {
    fn template_options(&self, global: &GlobalArgs) -> TemplateOptions {
        TemplateOptions {
            values: self.values.clone(),
            set: self.set.clone(),
            set_string: self.set_string.clone(),
            set_file: self.set_file.clone(),
            version: self.chart_version.clone(),
            skip_tests: self.skip_tests,
            skip_crds: self.skip_crds,
            validate: self.validate,
            debug: global.log_level.is_debug(),
            kube_context: global.kube_context.clone(),
            kubeconfig: global.kubeconfig.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Run the run command
pub async fn run(global: &GlobalArgs, args: RunArgs) -> Result<()> {
    let started = Instant::now();

    let config = Arc::new(resolve(args.common.options(global))?);
    check_prerequisites(&config, &args.common)?;
    if !args.common.skip_validation {
        prereq::validate_value_files(&args.values)?;
    }

    let mut cluster = ClusterClient::new(&config);
    let engine = engine(&config, &mut cluster).await?;

    let source: Arc<dyn ManifestSource> = if args.from_release {
        let client = cluster.get().await?;
        Arc::new(HelmSecretsSource::new(client).with_revision(args.revision))
    } else {
        Arc::new(HelmTemplateSource::new(
            &config.helm_binary,
            args.template_options(global),
        ))
    };

    let mut target = ReleaseTarget::new(&args.release, &config.namespace);
    if let Some(chart) = &args.chart {
        target = target.with_chart(chart);
    }

    tracing::info!(release = %target.name, namespace = %target.namespace, "identifying drifts");

    let orchestrator = Orchestrator::new(Arc::clone(&config), engine).with_source(source);
    let release = orchestrator.run_release(&target).await?;

    finish(
        DriftedReleaseSet::from(vec![release]),
        Scope::Release,
        &args.release,
        &args.common,
        started.elapsed(),
    )
}
