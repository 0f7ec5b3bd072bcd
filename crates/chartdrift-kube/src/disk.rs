//! Working directory handling and manifest materialization
//!
//! Every filtered document is written to its own file so that `kubectl diff`
//! can be pointed at it. Single release runs use `root/<release>`, cluster
//! scans use `root/all/<namespace>/<release>` for each release. No two
//! documents of a run share a file.

use chartdrift_core::{drop_standard_labels, Deviation, DriftedRelease, ResourceIdentity};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{KubeError, Result};
use crate::source::ReleaseTarget;

/// Directory name used for cluster scans
const ALL_RELEASES_DIR: &str = "all";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Working directory of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
    all_releases: bool,
}

impl Workspace {
    /// Workspace of a single release run: `root/<release>`
    pub fn for_release(root: impl AsRef<Path>, release: &str) -> Self {
        Self {
            path: root.as_ref().join(release),
            all_releases: false,
        }
    }

    /// Workspace of a cluster scan: `root/all`
    pub fn for_all(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(ALL_RELEASES_DIR),
            all_releases: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the manifests of `target` are written to
    pub fn release_dir(&self, target: &ReleaseTarget) -> PathBuf {
        if self.all_releases {
            self.path.join(&target.namespace).join(&target.name)
        } else {
            self.path.clone()
        }
    }

    /// Remove the whole tree, a missing tree is not an error
    pub fn clean(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "removed working directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Clean the tree when the returned guard is dropped, unless `skip_clean`
    pub fn guard(&self, skip_clean: bool) -> WorkspaceGuard {
        WorkspaceGuard {
            workspace: self.clone(),
            skip_clean,
        }
    }
}

/// Removes the workspace on drop
#[derive(Debug)]
pub struct WorkspaceGuard {
    workspace: Workspace,
    skip_clean: bool,
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.skip_clean {
            tracing::debug!(
                path = %self.workspace.path().display(),
                "keeping working directory"
            );
            return;
        }
        if let Err(e) = self.workspace.clean() {
            tracing::warn!(
                path = %self.workspace.path().display(),
                error = %e,
                "cleaning working directory failed"
            );
        }
    }
}

/// Write every document to `dir` and build one Deviation per written file
///
/// Files are named `{name}.{kind}.{release}.yaml`, or
/// `{name}.{kind}.{namespace}.{release}.yaml` when the document declares a
/// namespace other than the release's. Write failures are collected; when any
/// document did not make it to disk the missing identities are reported
/// together. A document landing on an already written file is a failure.
pub fn materialize(
    documents: &[String],
    target: &ReleaseTarget,
    dir: &Path,
    drop_labels: bool,
) -> Result<DriftedRelease> {
    create_dir(dir)?;

    let mut deviations = Vec::with_capacity(documents.len());
    let mut failures = Vec::new();
    let mut claimed = HashSet::new();

    for document in documents {
        match write_document(document, target, dir, drop_labels, &mut claimed) {
            Ok(deviation) => deviations.push(deviation),
            Err(e) => {
                tracing::warn!(release = %target.name, error = %e, "writing manifest failed");
                failures.push(e.to_string());
            }
        }
    }

    if deviations.len() != documents.len() {
        let written: HashSet<(&str, &str, Option<&str>)> = deviations
            .iter()
            .map(|d| (d.kind.as_str(), d.resource.as_str(), d.namespace.as_deref()))
            .collect();

        let mut missing: Vec<String> = documents
            .iter()
            .filter_map(|doc| ResourceIdentity::parse(doc).ok())
            .filter(|id| {
                let namespace = namespace_override(id.namespace.as_deref(), &target.namespace);
                !written.contains(&(id.kind.as_str(), id.name.as_str(), namespace))
            })
            .map(|id| id.display_name())
            .collect();

        if missing.is_empty() {
            missing = failures;
        }
        return Err(KubeError::NotAllMaterialized { missing });
    }

    Ok(DriftedRelease::new(&target.name, &target.namespace, target.chart.clone())
        .with_deviations(deviations))
}

/// Namespace a document declares when it is not the release namespace
fn namespace_override<'a>(declared: Option<&'a str>, release_namespace: &str) -> Option<&'a str> {
    declared.filter(|ns| !ns.is_empty() && *ns != release_namespace)
}

fn write_document(
    document: &str,
    target: &ReleaseTarget,
    dir: &Path,
    drop_labels: bool,
    claimed: &mut HashSet<PathBuf>,
) -> Result<Deviation> {
    let identity = ResourceIdentity::parse(document)?;
    let namespace =
        namespace_override(identity.namespace.as_deref(), &target.namespace).map(str::to_string);

    let file_name = match &namespace {
        Some(ns) => format!("{}.{}.{}.{}.yaml", identity.name, identity.kind, ns, target.name),
        None => format!("{}.{}.{}.yaml", identity.name, identity.kind, target.name),
    };
    let manifest_path = dir.join(file_name);
    if !claimed.insert(manifest_path.clone()) {
        return Err(KubeError::DuplicateResource {
            resource: identity.display_name(),
        });
    }

    let content = if drop_labels {
        drop_standard_labels(document)?
    } else {
        document.to_string()
    };
    write_file(&manifest_path, content.as_bytes())?;

    Ok(Deviation {
        kind: identity.kind,
        resource: identity.name,
        namespace,
        api_version: identity.api_version,
        template_path: dir.to_path_buf(),
        manifest_path,
        ..Default::default()
    })
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target() -> ReleaseTarget {
        ReleaseTarget::new("web", "prod").with_chart("charts/web")
    }

    const SERVICE: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";
    const CONFIG: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: shared\n";
    const LOCAL: &str = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n  namespace: prod\n";

    #[test]
    fn test_workspace_layout() {
        let single = Workspace::for_release("/tmp/drift", "web");
        assert_eq!(single.path(), Path::new("/tmp/drift/web"));
        assert_eq!(single.release_dir(&target()), PathBuf::from("/tmp/drift/web"));

        let all = Workspace::for_all("/tmp/drift");
        assert_eq!(all.path(), Path::new("/tmp/drift/all"));
        assert_eq!(
            all.release_dir(&ReleaseTarget::new("api", "staging")),
            PathBuf::from("/tmp/drift/all/staging/api")
        );
    }

    #[test]
    fn test_same_release_name_in_two_namespaces() {
        let all = Workspace::for_all("/tmp/drift");
        assert_ne!(
            all.release_dir(&ReleaseTarget::new("redis", "prod")),
            all.release_dir(&ReleaseTarget::new("redis", "staging"))
        );
    }

    #[test]
    fn test_materialize_round_trip() {
        let tmp = TempDir::new().unwrap();
        let docs = vec![SERVICE.to_string(), CONFIG.to_string(), LOCAL.to_string()];

        let release = materialize(&docs, &target(), tmp.path(), false).unwrap();
        assert_eq!(release.deviations.len(), 3);
        assert!(!release.has_drift);
        assert_eq!(release.chart.as_deref(), Some("charts/web"));

        let service = &release.deviations[0];
        assert_eq!(service.manifest_path, tmp.path().join("web.Service.web.yaml"));
        assert_eq!(fs::read_to_string(&service.manifest_path).unwrap(), SERVICE);

        for (deviation, doc) in release.deviations.iter().zip(&docs) {
            let identity = ResourceIdentity::parse(doc).unwrap();
            let written = fs::read_to_string(&deviation.manifest_path).unwrap();
            assert_eq!(ResourceIdentity::parse(&written).unwrap(), identity);
            assert_eq!(deviation.kind, identity.kind);
            assert_eq!(deviation.resource, identity.name);
        }
    }

    #[test]
    fn test_namespace_override_only_when_different() {
        let tmp = TempDir::new().unwrap();
        let docs = vec![CONFIG.to_string(), LOCAL.to_string()];

        let release = materialize(&docs, &target(), tmp.path(), false).unwrap();
        assert_eq!(release.deviations[0].namespace.as_deref(), Some("shared"));
        assert_eq!(
            release.deviations[0].manifest_path,
            tmp.path().join("cfg.ConfigMap.shared.web.yaml")
        );
        assert_eq!(release.deviations[1].namespace, None);
        assert_eq!(
            release.deviations[1].manifest_path,
            tmp.path().join("creds.Secret.web.yaml")
        );
    }

    #[test]
    fn test_same_resource_in_two_namespaces() {
        let tmp = TempDir::new().unwrap();
        let first = "kind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: a\ndata:\n  v: one\n";
        let second = "kind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: b\ndata:\n  v: two\n";

        let release =
            materialize(&[first.to_string(), second.to_string()], &target(), tmp.path(), false)
                .unwrap();

        let (a, b) = (&release.deviations[0], &release.deviations[1]);
        assert_eq!(a.namespace.as_deref(), Some("a"));
        assert_eq!(b.namespace.as_deref(), Some("b"));
        assert_ne!(a.manifest_path, b.manifest_path);
        assert_eq!(fs::read_to_string(&a.manifest_path).unwrap(), first);
        assert_eq!(fs::read_to_string(&b.manifest_path).unwrap(), second);
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let copy = SERVICE.replace("name: web", "name: web\n  labels:\n    copy: \"2\"");

        let err = materialize(&[SERVICE.to_string(), copy], &target(), tmp.path(), false)
            .unwrap_err();
        match err {
            KubeError::NotAllMaterialized { missing } => {
                assert_eq!(missing.len(), 1);
                assert!(missing[0].contains("Service/web"), "{missing:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
        // the first copy is not overwritten
        assert_eq!(
            fs::read_to_string(tmp.path().join("web.Service.web.yaml")).unwrap(),
            SERVICE
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("web");
        let release = materialize(&[SERVICE.to_string()], &target(), &dir, false).unwrap();

        let meta = fs::metadata(&release.deviations[0].manifest_path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777 & !0o022, FILE_MODE & !0o022);
        assert!(fs::metadata(&dir).unwrap().is_dir());
    }

    #[test]
    fn test_materialize_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let docs = vec![SERVICE.to_string(), "kind: [broken".to_string()];

        let err = materialize(&docs, &target(), tmp.path(), false).unwrap_err();
        match err {
            KubeError::NotAllMaterialized { missing } => assert_eq!(missing.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_materialize_drops_labels() {
        let tmp = TempDir::new().unwrap();
        let doc = "kind: Service\nmetadata:\n  name: web\n  labels:\n    helm.sh/chart: web-1.0.0\n    tier: edge\n";

        let release = materialize(&[doc.to_string()], &target(), tmp.path(), true).unwrap();
        let written = fs::read_to_string(&release.deviations[0].manifest_path).unwrap();
        assert!(!written.contains("helm.sh/chart"));
        assert!(written.contains("tier: edge"));
    }

    #[test]
    fn test_guard_cleans_unless_skipped() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::for_release(tmp.path(), "web");
        fs::create_dir_all(workspace.path()).unwrap();

        drop(workspace.guard(true));
        assert!(workspace.path().exists());

        drop(workspace.guard(false));
        assert!(!workspace.path().exists());

        // cleaning a missing tree is fine
        workspace.clean().unwrap();
    }
}
