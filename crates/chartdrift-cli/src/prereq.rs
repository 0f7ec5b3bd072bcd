//! Prerequisite checks run before any drift detection

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Placeholder for reading values from stdin
const STDIN: &str = "-";

/// The kubeconfig must be a single file
pub fn validate_kubeconfig(kubeconfig: &Path) -> Result<()> {
    let paths = std::env::split_paths(kubeconfig.as_os_str()).count();
    if paths > 1 {
        return Err(CliError::prerequisite(format!(
            "kubeconfig '{}' holds {} paths, kubectl diff supports a single kubeconfig",
            kubeconfig.display(),
            paths
        )));
    }
    Ok(())
}

/// An executable `kubectl` must be on `PATH`
pub fn validate_kubectl() -> Result<PathBuf> {
    find_executable("kubectl", std::env::var_os("PATH"))
}

/// Every values file except `-` must exist
pub fn validate_value_files(files: &[String]) -> Result<()> {
    for file in files.iter().filter(|f| f.as_str() != STDIN) {
        if !Path::new(file).is_file() {
            return Err(CliError::prerequisite(format!(
                "values file '{}' does not exist",
                file
            )));
        }
    }
    Ok(())
}

fn find_executable(name: &str, search_path: Option<OsString>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    which::which_in(name, search_path, cwd).map_err(|e| {
        CliError::prerequisite(format!(
            "{} was not found on PATH ({}), it is required to compare manifests",
            name, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_kubeconfig() {
        assert!(validate_kubeconfig(Path::new("/home/ops/.kube/config")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_multiple_kubeconfigs_are_rejected() {
        let err = validate_kubeconfig(Path::new("/a/config:/b/config")).unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::PREREQUISITE_ERROR);
    }

    #[test]
    fn test_value_files() {
        let tmp = TempDir::new().unwrap();
        let values = tmp.path().join("values.yaml");
        std::fs::write(&values, "replicas: 2\n").unwrap();

        let existing = values.display().to_string();
        assert!(validate_value_files(&[existing.clone(), "-".to_string()]).is_ok());
        assert!(validate_value_files(&[existing, "missing.yaml".to_string()]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let kubectl = tmp.path().join("kubectl");
        std::fs::write(&kubectl, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o755)).unwrap();

        let search = std::env::join_paths([Path::new("/nonexistent"), tmp.path()]).unwrap();
        assert_eq!(
            find_executable("kubectl", Some(search.clone())).unwrap(),
            kubectl
        );

        let err = find_executable("helm", Some(search)).unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::PREREQUISITE_ERROR);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_kubectl_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let kubectl = tmp.path().join("kubectl");
        std::fs::write(&kubectl, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o644)).unwrap();

        let search = OsString::from(tmp.path());
        assert!(find_executable("kubectl", Some(search)).is_err());
    }
}
