//! Integration tests for CLI commands

use std::process::{Command, Output};

/// Helper to run chartdrift command
fn chartdrift(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chartdrift"))
        .args(args)
        .env_remove("KUBECTL_EXTERNAL_DIFF")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute chartdrift")
}

mod usage {
    use super::*;

    #[test]
    fn test_help() {
        let output = chartdrift(&["--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("run"));
        assert!(stdout.contains("all"));
    }

    #[test]
    fn test_run_help_lists_flags() {
        let output = chartdrift(&["run", "--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--ignore-hpa-changes"));
        assert!(stdout.contains("--from-release"));
        assert!(stdout.contains("--diff-concurrency"));
    }

    #[test]
    fn test_missing_release_is_a_usage_error() {
        let output = chartdrift(&["run"]);
        assert_eq!(output.status.code(), Some(2));
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_invalid_skip_release() {
        let output = chartdrift(&["all", "--skip-release", "prometheus"]);
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("prometheus"));
    }

    #[test]
    fn test_zero_diff_concurrency() {
        let output = chartdrift(&["run", "web", "chart", "--diff-concurrency", "0"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_invalid_regex() {
        let output = chartdrift(&["run", "web", "chart", "--regex", "("]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[cfg(unix)]
    #[test]
    fn test_multiple_kubeconfigs_fail_prerequisites() {
        let output = chartdrift(&["run", "web", "chart", "--kubeconfig", "/a/config:/b/config"]);
        assert_eq!(output.status.code(), Some(3));
    }
}

#[cfg(unix)]
mod end_to_end {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    const BUNDLE: &str = "\
---
# Source: web/templates/service.yaml
apiVersion: v1
kind: Service
metadata:
  name: web
---
# Source: web/templates/deployment.yaml
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 2
";

    fn script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Fake helm printing a fixed bundle and a fake kubectl with a fixed exit code
    fn fake_tools(kubectl_exit: i32) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let bin = tmp.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(tmp.path().join("bundle.yaml"), BUNDLE).unwrap();

        script(&bin, "helm", &format!("cat '{}'", tmp.path().join("bundle.yaml").display()));
        script(
            &bin,
            "kubectl",
            &format!("echo '-  replicas: 1'\necho '+  replicas: 2'\nexit {}", kubectl_exit),
        );
        tmp
    }

    fn run(tmp: &TempDir, extra: &[&str]) -> Output {
        let bin = tmp.path().join("bin");
        let path = format!(
            "{}:{}",
            bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let temp_path = tmp.path().join("templates");
        let kubeconfig = tmp.path().join("kubeconfig");

        let mut args = vec![
            "run".to_string(),
            "web".to_string(),
            "charts/web".to_string(),
            "--temp-path".to_string(),
            temp_path.display().to_string(),
            "--kubeconfig".to_string(),
            kubeconfig.display().to_string(),
            "--no-color".to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));

        Command::new(env!("CARGO_BIN_EXE_chartdrift"))
            .args(&args)
            .env("PATH", path)
            .env("HELM_BIN", bin.join("helm"))
            .env_remove("KUBECTL_EXTERNAL_DIFF")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute chartdrift")
    }

    #[test]
    fn test_drift_exits_with_drift_code() {
        let tmp = fake_tools(1);
        let output = run(&tmp, &[]);

        assert_eq!(output.status.code(), Some(4));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("OOPS...! DRIFTS FOUND"));
        assert!(stdout.contains("Identified drifts in: 'Deployment' 'web'"));
        // working directory removed after the run
        assert!(!tmp.path().join("templates").join("web").exists());
    }

    #[test]
    fn test_disable_error_on_drift() {
        let tmp = fake_tools(1);
        let output = run(&tmp, &["-d", "-o", "json"]);

        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .expect("Output should be valid JSON");
        assert_eq!(json[0]["release"], "web");
        assert_eq!(json[0]["total_drifts"], 2);
        assert_eq!(json[0]["status"], "FAILED");
    }

    #[test]
    fn test_no_drift() {
        let tmp = fake_tools(0);
        let output = run(&tmp, &["--skip-cleaning"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("YAY...! NO DRIFTS FOUND"));
        assert!(tmp
            .path()
            .join("templates")
            .join("web")
            .join("web.Deployment.web.yaml")
            .exists());
    }

    #[test]
    fn test_kubectl_error_fails_the_run() {
        let tmp = fake_tools(2);
        let output = run(&tmp, &[]);

        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("exit code 2"));
    }

    #[test]
    fn test_kind_filter() {
        let tmp = fake_tools(1);
        let output = run(&tmp, &["--kind", "Service", "-o", "json", "-d"]);

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json[0]["total_drifts"], 1);
        assert_eq!(json[0]["drifts"][0]["kind"], "Service");
    }
}
