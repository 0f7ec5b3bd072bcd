//! Where rendered manifests come from
//!
//! A release is either rendered locally with `helm template` or read back
//! from the release record Helm keeps in a Secret of the release namespace.

use async_trait::async_trait;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::process::Stdio;

use crate::error::{KubeError, Result};

/// Values file name standing for stdin
const STDIN_VALUES: &str = "-";

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Release a run is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTarget {
    pub name: String,
    pub namespace: String,
    /// Chart reference (path, repo/name) or `name-version` for deployed releases
    pub chart: Option<String>,
}

impl ReleaseTarget {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart: None,
        }
    }

    pub fn with_chart(mut self, chart: impl Into<String>) -> Self {
        self.chart = Some(chart.into());
        self
    }
}

/// Produces the rendered manifest bundle of one release
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn manifest(&self, target: &ReleaseTarget) -> Result<String>;
}

/// A deployed release found in the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub chart: Option<String>,
    pub manifest: String,
}

impl ReleaseInfo {
    pub fn target(&self) -> ReleaseTarget {
        ReleaseTarget {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            chart: self.chart.clone(),
        }
    }
}

/// Lists deployed releases, optionally restricted to one namespace
#[async_trait]
pub trait ReleaseLister: Send + Sync {
    async fn list(&self, scope: Option<&str>) -> Result<Vec<ReleaseInfo>>;
}

/// Flags forwarded to `helm template`
#[derive(Debug, Clone, Default)]
pub struct TemplateOptions {
    pub values: Vec<String>,
    pub set: Vec<String>,
    pub set_string: Vec<String>,
    pub set_file: Vec<String>,
    pub version: Option<String>,
    pub skip_tests: bool,
    pub skip_crds: bool,
    pub validate: bool,
    pub debug: bool,
    pub kube_context: Option<String>,
    pub kubeconfig: Option<String>,
}

/// Renders charts with `helm template`
#[derive(Debug, Clone)]
pub struct HelmTemplateSource {
    helm: String,
    options: TemplateOptions,
}

impl HelmTemplateSource {
    pub fn new(helm: impl Into<String>, options: TemplateOptions) -> Self {
        Self {
            helm: helm.into(),
            options,
        }
    }

    /// Whether values are read from stdin (`-f -`)
    pub fn reads_stdin(&self) -> bool {
        self.options.values.iter().any(|v| v == STDIN_VALUES)
    }

    /// Arguments passed to helm for `target`
    pub fn args(&self, target: &ReleaseTarget) -> Result<Vec<String>> {
        let chart = target.chart.as_deref().ok_or_else(|| KubeError::Acquisition {
            release: target.name.clone(),
            message: "no chart given".to_string(),
        })?;

        let opts = &self.options;
        let mut args = vec![
            "template".to_string(),
            target.name.clone(),
            chart.to_string(),
            "--namespace".to_string(),
            target.namespace.clone(),
        ];

        for (flag, values) in [
            ("--set", &opts.set),
            ("--set-string", &opts.set_string),
            ("--set-file", &opts.set_file),
            ("--values", &opts.values),
        ] {
            for value in values {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }

        if let Some(version) = &opts.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if let Some(context) = &opts.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        if let Some(kubeconfig) = &opts.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.clone());
        }
        for (flag, enabled) in [
            ("--skip-tests", opts.skip_tests),
            ("--skip-crds", opts.skip_crds),
            ("--validate", opts.validate),
            ("--debug", opts.debug),
        ] {
            if enabled {
                args.push(flag.to_string());
            }
        }

        Ok(args)
    }
}

#[async_trait]
impl ManifestSource for HelmTemplateSource {
    async fn manifest(&self, target: &ReleaseTarget) -> Result<String> {
        let args = self.args(target)?;
        tracing::debug!(release = %target.name, helm = %self.helm, "rendering chart");

        let stdin = if self.reads_stdin() {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let output = tokio::process::Command::new(&self.helm)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| KubeError::Acquisition {
                release: target.name.clone(),
                message: format!("failed to spawn {}: {}", self.helm, e),
            })?;

        if !output.status.success() {
            return Err(KubeError::Acquisition {
                release: target.name.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Release record as stored by Helm
#[derive(Debug, Clone, Deserialize)]
pub struct HelmRelease {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub chart: Option<HelmChart>,
    #[serde(default)]
    pub info: Option<HelmReleaseInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelmChart {
    pub metadata: Option<HelmChartMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelmChartMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelmReleaseInfo {
    #[serde(default)]
    pub status: String,
}

impl HelmRelease {
    /// `name-version` of the chart the release was installed from
    pub fn chart_label(&self) -> Option<String> {
        self.chart
            .as_ref()
            .and_then(|c| c.metadata.as_ref())
            .map(|m| format!("{}-{}", m.name, m.version))
    }

    pub fn into_info(self) -> ReleaseInfo {
        let chart = self.chart_label();
        ReleaseInfo {
            name: self.name,
            namespace: self.namespace,
            chart,
            manifest: self.manifest,
        }
    }
}

/// Decode the `release` payload of a Helm Secret
///
/// The payload is base64 text of (optionally gzipped) JSON.
pub fn decode_release(data: &[u8]) -> Result<HelmRelease> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {}", e)))?;

    let json = if decoded.starts_with(GZIP_MAGIC) {
        let mut decoder = flate2::read::GzDecoder::new(decoded.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        out
    } else {
        decoded
    };

    Ok(serde_json::from_slice(&json)?)
}

/// Reads release records from Helm's Secret storage
#[derive(Clone)]
pub struct HelmSecretsSource {
    client: Client,
    revision: Option<u32>,
}

impl HelmSecretsSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            revision: None,
        }
    }

    /// Read a specific revision instead of the deployed one
    pub fn with_revision(mut self, revision: Option<u32>) -> Self {
        self.revision = revision;
        self
    }

    fn decode_secret(secret: &Secret) -> Result<HelmRelease> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get("release"))
            .ok_or_else(|| KubeError::ReleaseDecode {
                name: name.clone(),
                message: "secret has no 'release' data".to_string(),
            })?;

        decode_release(&data.0).map_err(|e| KubeError::ReleaseDecode {
            name,
            message: e.to_string(),
        })
    }

    async fn list_secrets(&self, namespace: Option<&str>, selector: &str) -> Result<Vec<Secret>> {
        let params = ListParams::default().labels(selector);
        let secrets = match namespace {
            Some(ns) => Api::<Secret>::namespaced(self.client.clone(), ns).list(&params).await?,
            None => Api::<Secret>::all(self.client.clone()).list(&params).await?,
        };
        Ok(secrets.items)
    }
}

#[async_trait]
impl ManifestSource for HelmSecretsSource {
    async fn manifest(&self, target: &ReleaseTarget) -> Result<String> {
        let selector = match self.revision {
            Some(revision) => format!("owner=helm,name={},version={}", target.name, revision),
            None => format!("owner=helm,name={},status=deployed", target.name),
        };

        let secrets = self.list_secrets(Some(&target.namespace), &selector).await?;
        let release = secrets
            .iter()
            .map(Self::decode_secret)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .max_by_key(|r| r.version)
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: target.name.clone(),
                namespace: target.namespace.clone(),
            })?;

        tracing::debug!(
            release = %target.name,
            revision = release.version,
            "loaded release record"
        );
        Ok(release.manifest)
    }
}

#[async_trait]
impl ReleaseLister for HelmSecretsSource {
    async fn list(&self, scope: Option<&str>) -> Result<Vec<ReleaseInfo>> {
        let secrets = self.list_secrets(scope, "owner=helm,status=deployed").await?;

        let mut releases = Vec::with_capacity(secrets.len());
        for secret in &secrets {
            match Self::decode_secret(secret) {
                Ok(release) => releases.push(release.into_info()),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable release record"),
            }
        }
        Ok(releases)
    }
}
