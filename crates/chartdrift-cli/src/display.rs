//! Rendering of drift results
//!
//! Provides:
//! - plain output with the diff of every drifted resource
//! - a summary table (per resource for a release, per release for a scan)
//! - JSON and YAML summaries, optionally exported as report files

use chartdrift_core::deviation::{FAILED, NO, YES};
use chartdrift_core::{Deviation, DriftedRelease, DriftedReleaseSet};
use clap::ValueEnum;
use console::{style, StyledObject};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

const RULE: &str =
    "------------------------------------------------------------------------------------";
const SECTION: &str = "-----------";

/// Output format of the results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Diff of every drifted resource
    #[default]
    Plain,
    /// Summary table
    Table,
    /// JSON summary
    Json,
    /// YAML summary
    Yaml,
}

impl OutputFormat {
    /// File extension of exported reports, plain and table output are not exported
    pub fn report_extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Json => Some("json"),
            OutputFormat::Yaml => Some("yaml"),
            OutputFormat::Plain | OutputFormat::Table => None,
        }
    }
}

/// What was scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A single release
    Release,
    /// Every release of the cluster (or namespace)
    All,
}

/// Summary of one release as exported in JSON/YAML
#[derive(Debug, Serialize)]
pub struct DriftSummary<'a> {
    pub release: &'a str,
    pub namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<&'a str>,
    pub drifts: &'a [Deviation],
    pub total_drifts: usize,
    pub time: String,
    pub status: &'static str,
}

/// Human readable elapsed time, millisecond precision
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    format!("{:?}", Duration::from_millis(millis))
}

/// Build the exported summaries
pub fn summaries(set: &DriftedReleaseSet, elapsed: Duration) -> Vec<DriftSummary<'_>> {
    let time = format_elapsed(elapsed);
    set.iter()
        .map(|release| DriftSummary {
            release: &release.release,
            namespace: &release.namespace,
            chart: release.chart.as_deref(),
            drifts: &release.deviations,
            total_drifts: release.drift_count(),
            time: time.clone(),
            status: release.status(),
        })
        .collect()
}

/// Render the results in the requested format
pub fn render(
    set: &DriftedReleaseSet,
    scope: Scope,
    format: OutputFormat,
    elapsed: Duration,
) -> Result<String> {
    match format {
        OutputFormat::Plain => Ok(plain(set, scope, elapsed)),
        OutputFormat::Table => Ok(table(set, scope, elapsed)),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&summaries(set, elapsed))?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&summaries(set, elapsed))?;
            Ok(format!("---\n{}", yaml))
        }
    }
}

fn plain(set: &DriftedReleaseSet, scope: Scope, elapsed: Duration) -> String {
    let mut out = String::new();

    for release in set.iter().filter(|r| r.has_drift) {
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "{:<39}: {}", "Release", release.release);
        if let Some(chart) = &release.chart {
            let _ = writeln!(out, "{:<39}: {}", "Chart", chart);
        }

        for deviation in release.drifted_resources() {
            let _ = writeln!(out, "{}", RULE);
            let _ = writeln!(
                out,
                "Identified drifts in: '{}' '{}'\n",
                deviation.kind, deviation.resource
            );
            let _ = writeln!(out, "{}", SECTION);
            out.push_str(&deviation.diff);
            if !deviation.diff.ends_with('\n') {
                out.push('\n');
            }
            let _ = writeln!(out, "{}\n", SECTION);
        }

        let _ = writeln!(out, "{}", RULE);
    }

    if set.has_drift() {
        let _ = writeln!(out, "{}", style("OOPS...! DRIFTS FOUND").red().bold());
    } else {
        let _ = writeln!(out, "{}", style("YAY...! NO DRIFTS FOUND").green().bold());
    }

    let total = match scope {
        Scope::Release => set.iter().map(DriftedRelease::drift_count).sum(),
        Scope::All => set.count(),
    };

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "{:<39}: {}",
        "Total time spent on identifying drifts",
        format_elapsed(elapsed)
    );
    let _ = writeln!(out, "{:<39}: {}", "Total number of drifts found", total);
    let _ = writeln!(out, "{:<39}: {}", "Status", set.status());
    let _ = writeln!(out, "{}", RULE);
    out
}

fn table(set: &DriftedReleaseSet, scope: Scope, elapsed: Duration) -> String {
    let mut out = String::new();

    match scope {
        Scope::Release => {
            let _ = writeln!(
                out,
                "{:<20} {:<40} {:<8}",
                style("KIND").bold(),
                style("NAME").bold(),
                style("DRIFT").bold()
            );
            for release in set.iter() {
                for deviation in &release.deviations {
                    let _ = writeln!(
                        out,
                        "{:<20} {:<40} {:<8}",
                        deviation.kind,
                        deviation.resource,
                        marker(deviation.drifted())
                    );
                }
            }
        }
        Scope::All => {
            let _ = writeln!(
                out,
                "{:<30} {:<20} {:<8}",
                style("RELEASE").bold(),
                style("NAMESPACE").bold(),
                style("DRIFTED").bold()
            );
            for release in set.iter() {
                let _ = writeln!(
                    out,
                    "{:<30} {:<20} {:<8}",
                    release.release,
                    release.namespace,
                    marker(release.drifted())
                );
            }
        }
    }

    let width = match scope {
        Scope::Release => 20 + 1 + 40,
        Scope::All => 30 + 1 + 20,
    };
    let _ = writeln!(out, "{:>width$} {}", style("STATUS").bold(), status(set.status()));

    if scope == Scope::Release {
        if let Some(release) = set.iter().next() {
            let _ = writeln!(
                out,
                "\nNamespace: '{}'\nRelease: '{}'",
                release.namespace, release.release
            );
        }
    }

    let _ = writeln!(out, "Time spent in identifying drift: '{}'", format_elapsed(elapsed));
    out
}

fn marker(value: &'static str) -> StyledObject<&'static str> {
    match value {
        YES => style(value).red(),
        NO => style(value).green(),
        _ => style(value),
    }
}

fn status(value: &'static str) -> StyledObject<&'static str> {
    if value == FAILED {
        style(value).red().bold()
    } else {
        style(value).green().bold()
    }
}

/// Path of the exported report
pub fn report_path(dir: &Path, scope: Scope, release: &str, extension: &str) -> PathBuf {
    match scope {
        Scope::Release => dir.join(format!("chartdrift_{}.{}", release, extension)),
        Scope::All => dir.join(format!("chartdrift_all.{}", extension)),
    }
}

/// Write a rendered summary next to the current working directory
pub fn write_report(
    dir: &Path,
    scope: Scope,
    release: &str,
    extension: &str,
    content: &str,
) -> Result<PathBuf> {
    let path = report_path(dir, scope, release, extension);
    std::fs::write(&path, content)?;
    tracing::debug!(path = %path.display(), "summary report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> DriftedReleaseSet {
        let drifted = Deviation {
            kind: "Deployment".to_string(),
            resource: "web".to_string(),
            has_drift: true,
            diff: "-  image: a\n+  image: b\n".to_string(),
            ..Default::default()
        };
        let clean = Deviation {
            kind: "Service".to_string(),
            resource: "web".to_string(),
            ..Default::default()
        };
        let release = DriftedRelease::new("web", "prod", Some("web-1.0.0".to_string()))
            .with_deviations(vec![drifted, clean]);
        DriftedReleaseSet::from(vec![release])
    }

    #[test]
    fn test_plain_output() {
        console::set_colors_enabled(false);
        let elapsed = Duration::from_millis(1500);
        let out = render(&sample(), Scope::Release, OutputFormat::Plain, elapsed).unwrap();

        assert!(out.contains("Identified drifts in: 'Deployment' 'web'"));
        assert!(out.contains("+  image: b"));
        assert!(!out.contains("'Service'"));
        assert!(out.contains("OOPS...! DRIFTS FOUND"));
        assert!(out.contains("Chart"));
        assert!(out.contains("1.5s"));
    }

    #[test]
    fn test_plain_output_without_drift() {
        console::set_colors_enabled(false);
        let empty = DriftedReleaseSet::new();
        let out = render(&empty, Scope::All, OutputFormat::Plain, Duration::ZERO).unwrap();
        assert!(out.contains("YAY...! NO DRIFTS FOUND"));
        assert!(out.contains("SUCCESS"));
    }

    #[test]
    fn test_table_output() {
        console::set_colors_enabled(false);
        let out = render(&sample(), Scope::Release, OutputFormat::Table, Duration::ZERO).unwrap();
        assert!(out.contains("KIND"));
        assert!(out.lines().any(|l| l.contains("Deployment") && l.contains("YES")));
        assert!(out.lines().any(|l| l.contains("Service") && l.contains("NO")));
        assert!(out.contains("FAILED"));

        let out = render(&sample(), Scope::All, OutputFormat::Table, Duration::ZERO).unwrap();
        assert!(out.lines().any(|l| l.contains("web") && l.contains("prod") && l.contains("YES")));
    }

    #[test]
    fn test_json_summary() {
        let elapsed = Duration::from_secs(2);
        let out = render(&sample(), Scope::Release, OutputFormat::Json, elapsed).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        let summary = &value[0];
        assert_eq!(summary["release"], "web");
        assert_eq!(summary["chart"], "web-1.0.0");
        assert_eq!(summary["total_drifts"], 1);
        assert_eq!(summary["status"], "FAILED");
        assert_eq!(summary["time"], "2s");
        assert_eq!(summary["drifts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_yaml_summary() {
        let out = render(&sample(), Scope::All, OutputFormat::Yaml, Duration::ZERO).unwrap();
        assert!(out.starts_with("---\n"));
        let value: serde_yaml::Value =
            serde_yaml::from_str(out.trim_start_matches("---\n")).unwrap();
        assert_eq!(value[0]["namespace"], "prod");
    }

    #[test]
    fn test_write_report() {
        let tmp = TempDir::new().unwrap();
        let path = write_report(tmp.path(), Scope::Release, "web", "json", "[]\n").unwrap();
        assert_eq!(path, tmp.path().join("chartdrift_web.json"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]\n");

        assert_eq!(
            report_path(tmp.path(), Scope::All, "ignored", "yaml"),
            tmp.path().join("chartdrift_all.yaml")
        );
    }

    #[test]
    fn test_report_extension() {
        assert_eq!(OutputFormat::Json.report_extension(), Some("json"));
        assert_eq!(OutputFormat::Yaml.report_extension(), Some("yaml"));
        assert_eq!(OutputFormat::Table.report_extension(), None);
    }
}
