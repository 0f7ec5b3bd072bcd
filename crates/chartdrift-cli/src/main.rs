//! chartdrift CLI - identify drift between Helm charts and live cluster resources

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;
mod display;
mod error;
mod exit_codes;
mod prereq;

use commands::all::AllArgs;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "chartdrift")]
#[command(author = "chartdrift Contributors")]
#[command(version)]
#[command(
    about = "Identify drift between the manifests of Helm releases and the live cluster",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Flags accepted by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Log level
    #[arg(short = 'l', long, value_enum, global = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Kubeconfig context
    #[arg(long, global = true, env = "HELM_KUBECONTEXT")]
    pub kube_context: Option<String>,

    /// Kubeconfig path [default: $HOME/.kube/config]
    #[arg(long, global = true, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Release namespace
    #[arg(short, long, global = true, env = "HELM_NAMESPACE")]
    pub namespace: Option<String>,

    /// Value passed to `kubectl diff --concurrency`
    #[arg(long, global = true, default_value_t = 1)]
    pub concurrency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, LogLevel::Trace | LogLevel::Debug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify drifts of a single release
    Run(RunArgs),

    /// Identify drifts of every deployed release
    All(AllArgs),
}

/// Logs go to stderr, `RUST_LOG` overrides the configured level
fn init_logger(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(global.log_level.as_str()));

    let layer = match global.log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(!global.no_color)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();

    if cli.global.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    init_logger(&cli.global);

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(&cli.global, args).await,
        Commands::All(args) => commands::all::run(&cli.global, args).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartdrift_core::DEFAULT_IGNORED_HOOKS;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["chartdrift", "run", "web", "charts/web"]).unwrap();
        assert_eq!(cli.global.concurrency, 1);
        assert_eq!(cli.global.log_level, LogLevel::Info);

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.release, "web");
        assert_eq!(args.chart.as_deref(), Some("charts/web"));
        assert_eq!(args.common.ignore_hooks, DEFAULT_IGNORED_HOOKS);
        assert_eq!(args.common.output, display::OutputFormat::Plain);
    }

    #[test]
    fn test_run_from_release_needs_no_chart() {
        let cli = Cli::try_parse_from([
            "chartdrift",
            "run",
            "web",
            "--from-release",
            "--revision",
            "3",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.chart.is_none());
        assert_eq!(args.revision, Some(3));

        assert!(Cli::try_parse_from(["chartdrift", "run", "web"]).is_err());
        assert!(
            Cli::try_parse_from(["chartdrift", "run", "web", "chart", "--revision", "3"]).is_err()
        );
    }

    #[test]
    fn test_comma_separated_lists() {
        let cli = Cli::try_parse_from([
            "chartdrift",
            "run",
            "web",
            "chart",
            "--kind",
            "Deployment,Service",
            "-f",
            "a.yaml,b.yaml",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.common.kind, vec!["Deployment", "Service"]);
        assert_eq!(args.values, vec!["a.yaml", "b.yaml"]);
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "chartdrift",
            "all",
            "--skip-release",
            "web=prod",
            "--skip-release",
            "api=staging",
            "--release-concurrency",
            "2",
            "-o",
            "json",
        ])
        .unwrap();
        let Commands::All(args) = cli.command else {
            panic!("expected all");
        };
        assert_eq!(args.skip_release.len(), 2);
        assert_eq!(args.release_concurrency, Some(2));
        assert_eq!(args.common.output, display::OutputFormat::Json);
    }
}
