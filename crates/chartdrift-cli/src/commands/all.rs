//! All command - detect drift of every deployed release

use chartdrift_kube::{HelmSecretsSource, Orchestrator};
use clap::Args;
use std::sync::Arc;
use std::time::Instant;

use super::{check_prerequisites, engine, finish, resolve, ClusterClient, CommonArgs};
use crate::display::Scope;
use crate::error::Result;
use crate::GlobalArgs;

/// Arguments of the all command
#[derive(Args, Debug, Clone)]
pub struct AllArgs {
    /// Releases to skip, as name=namespace
    #[arg(long = "skip-release", value_name = "NAME=NAMESPACE")]
    pub skip_release: Vec<String>,

    /// Scan only the `default` namespace instead of every namespace when no namespace is set
    #[arg(long)]
    pub is_default_namespace: bool,

    /// Maximum releases scanned at once [default: all]
    #[arg(long)]
    pub release_concurrency: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run the all command
pub async fn run(global: &GlobalArgs, args: AllArgs) -> Result<()> {
    let started = Instant::now();

    let mut options = args.common.options(global);
    options.skip_releases = args.skip_release.clone();
    options.is_default_namespace = args.is_default_namespace;
    options.release_concurrency = args.release_concurrency;

    let config = Arc::new(resolve(options)?);
    check_prerequisites(&config, &args.common)?;

    let mut cluster = ClusterClient::new(&config);
    let engine = engine(&config, &mut cluster).await?;
    let lister = Arc::new(HelmSecretsSource::new(cluster.get().await?));

    let orchestrator = Orchestrator::new(Arc::clone(&config), engine).with_lister(lister);
    let (releases, failed) = orchestrator.run_all().await?.into_parts();

    // releases that were checked are reported even when others failed
    let outcome = finish(releases, Scope::All, "all", &args.common, started.elapsed());
    match failed {
        Some(err) => Err(err.into()),
        None => outcome,
    }
}
