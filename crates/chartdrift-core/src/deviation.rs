//! Drift data model
//!
//! A [`Deviation`] is one compared resource, a [`DriftedRelease`] groups the
//! deviations of one release and a [`DriftedReleaseSet`] groups releases
//! scanned together. Release level `has_drift` is always derived from the
//! deviations through [`DriftedRelease::refresh_drift`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Status reported when at least one resource drifted
pub const FAILED: &str = "FAILED";
/// Status reported when nothing drifted
pub const SUCCESS: &str = "SUCCESS";
/// Drift marker
pub const YES: &str = "YES";
/// No-drift marker
pub const NO: &str = "NO";

fn yes_no(drifted: bool) -> &'static str {
    if drifted { YES } else { NO }
}

/// One tracked resource comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    /// Resource kind
    pub kind: String,

    /// Resource name
    pub resource: String,

    /// Namespace declared by the manifest when it differs from the release namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Declared apiVersion
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// Directory the manifest was written to
    #[serde(default)]
    pub template_path: PathBuf,

    /// File compared against the cluster
    #[serde(default)]
    pub manifest_path: PathBuf,

    /// Whether the live resource differs from the manifest
    #[serde(default)]
    pub has_drift: bool,

    /// Output of the comparison tool, empty unless drifted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff: String,
}

impl Deviation {
    /// Record the comparison outcome
    ///
    /// Drift is only recorded together with a non-empty diff body.
    pub fn record(&mut self, diff: Option<String>) {
        match diff {
            Some(body) if !body.is_empty() => {
                self.has_drift = true;
                self.diff = body;
            }
            _ => {
                self.has_drift = false;
                self.diff.clear();
            }
        }
    }

    /// Hide a detected drift
    pub fn suppress(&mut self) {
        self.has_drift = false;
    }

    /// `YES`/`NO` drift marker
    pub fn drifted(&self) -> &'static str {
        yes_no(self.has_drift)
    }

    /// `kind/name` of the compared resource
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind, self.resource)
    }
}

/// Drift information of one release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftedRelease {
    /// Release name
    pub release: String,

    /// Chart reference or source label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,

    /// Release namespace
    pub namespace: String,

    /// True iff any deviation drifted
    #[serde(default)]
    pub has_drift: bool,

    /// Deviations in filtered-manifest order
    #[serde(default)]
    pub deviations: Vec<Deviation>,
}

impl DriftedRelease {
    /// Create an empty release entry
    pub fn new(
        release: impl Into<String>,
        namespace: impl Into<String>,
        chart: Option<String>,
    ) -> Self {
        Self {
            release: release.into(),
            chart,
            namespace: namespace.into(),
            has_drift: false,
            deviations: Vec::new(),
        }
    }

    /// Replace the deviations and recompute the release drift flag
    pub fn with_deviations(mut self, deviations: Vec<Deviation>) -> Self {
        self.deviations = deviations;
        self.refresh_drift();
        self
    }

    /// Recompute `has_drift` from the deviations
    pub fn refresh_drift(&mut self) {
        self.has_drift = self.deviations.iter().any(|d| d.has_drift);
    }

    /// Number of drifted resources
    pub fn drift_count(&self) -> usize {
        self.deviations.iter().filter(|d| d.has_drift).count()
    }

    /// Drifted resources only
    pub fn drifted_resources(&self) -> impl Iterator<Item = &Deviation> {
        self.deviations.iter().filter(|d| d.has_drift)
    }

    /// `FAILED` if any resource drifted, `SUCCESS` otherwise
    pub fn status(&self) -> &'static str {
        if self.drift_count() > 0 { FAILED } else { SUCCESS }
    }

    /// `YES`/`NO` drift marker
    pub fn drifted(&self) -> &'static str {
        yes_no(self.has_drift)
    }
}

/// Releases scanned together in cluster mode
///
/// Order reflects completion order and carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriftedReleaseSet {
    pub releases: Vec<DriftedRelease>,
}

impl DriftedReleaseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, release: DriftedRelease) {
        self.releases.push(release);
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DriftedRelease> {
        self.releases.iter()
    }

    /// Sort releases by namespace then name for reproducible output
    pub fn sort_by_release(&mut self) {
        self.releases
            .sort_by(|a, b| a.namespace.cmp(&b.namespace).then_with(|| a.release.cmp(&b.release)));
    }

    /// Number of drifted releases
    pub fn count(&self) -> usize {
        self.releases.iter().filter(|r| r.has_drift).count()
    }

    pub fn has_drift(&self) -> bool {
        self.releases.iter().any(|r| r.has_drift)
    }

    /// `FAILED` if any release drifted, `SUCCESS` otherwise
    pub fn status(&self) -> &'static str {
        if self.has_drift() { FAILED } else { SUCCESS }
    }

    /// `YES`/`NO` drift marker
    pub fn drifted(&self) -> &'static str {
        yes_no(self.has_drift())
    }
}

impl From<Vec<DriftedRelease>> for DriftedReleaseSet {
    fn from(releases: Vec<DriftedRelease>) -> Self {
        Self { releases }
    }
}

impl IntoIterator for DriftedReleaseSet {
    type Item = DriftedRelease;
    type IntoIter = std::vec::IntoIter<DriftedRelease>;

    fn into_iter(self) -> Self::IntoIter {
        self.releases.into_iter()
    }
}

impl<'a> IntoIterator for &'a DriftedReleaseSet {
    type Item = &'a DriftedRelease;
    type IntoIter = std::slice::Iter<'a, DriftedRelease>;

    fn into_iter(self) -> Self::IntoIter {
        self.releases.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deviation(name: &str, drift: Option<&str>) -> Deviation {
        let mut dvn = Deviation {
            kind: "Deployment".to_string(),
            resource: name.to_string(),
            ..Default::default()
        };
        dvn.record(drift.map(str::to_string));
        dvn
    }

    #[test]
    fn test_record_requires_diff_body() {
        let mut dvn = deviation("web", None);
        assert!(!dvn.has_drift);

        dvn.record(Some(String::new()));
        assert!(!dvn.has_drift);

        dvn.record(Some("-  replicas: 3\n+  replicas: 5\n".to_string()));
        assert!(dvn.has_drift);
        assert!(!dvn.diff.is_empty());
        assert_eq!(dvn.drifted(), YES);
    }

    #[test]
    fn test_release_drift_is_derived() {
        let mut release = DriftedRelease::new("web", "default", None)
            .with_deviations(vec![deviation("a", None), deviation("b", Some("+x"))]);
        assert!(release.has_drift);
        assert_eq!(release.drift_count(), 1);
        assert_eq!(release.status(), FAILED);

        release.deviations[1].suppress();
        release.refresh_drift();
        assert!(!release.has_drift);
        assert_eq!(release.status(), SUCCESS);
        assert_eq!(release.drifted(), NO);
    }

    #[test]
    fn test_release_set_aggregates() {
        let drifted = DriftedRelease::new("a", "ns", None)
            .with_deviations(vec![deviation("x", Some("+y"))]);
        let clean =
            DriftedRelease::new("b", "ns", None).with_deviations(vec![deviation("x", None)]);

        let set = DriftedReleaseSet::from(vec![clean, drifted]);
        assert_eq!(set.count(), 1);
        assert_eq!(set.status(), FAILED);
        assert_eq!(set.drifted(), YES);
    }

    #[test]
    fn test_release_set_sorting() {
        let mut set = DriftedReleaseSet::from(vec![
            DriftedRelease::new("zeta", "b", None),
            DriftedRelease::new("alpha", "b", None),
            DriftedRelease::new("omega", "a", None),
        ]);
        set.sort_by_release();
        let names: Vec<_> = set.iter().map(|r| r.release.as_str()).collect();
        assert_eq!(names, vec!["omega", "alpha", "zeta"]);
    }

    #[test]
    fn test_serialized_field_names() {
        let release = DriftedRelease::new("web", "default", Some("charts/web".to_string()))
            .with_deviations(vec![deviation("web", Some("+x"))]);
        let json = serde_json::to_value(&release).unwrap();
        assert_eq!(json["has_drift"], true);
        assert_eq!(json["deviations"][0]["resource"], "web");
        assert_eq!(json["chart"], "charts/web");
    }
}
