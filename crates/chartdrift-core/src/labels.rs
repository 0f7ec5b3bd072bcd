//! Removal of the labels and annotations Helm stamps on every resource
//!
//! The release bookkeeping metadata differs between a rendered template and
//! the object Helm applied, which makes it pure noise in a drift report.

use serde_yaml::Value;

use crate::error::Result;
use crate::resource::{annotations, parse_document};

/// Labels added by the standard Helm chart scaffolding
pub const STANDARD_LABELS: &[&str] = &[
    "app.kubernetes.io/name",
    "helm.sh/chart",
    "app.kubernetes.io/managed-by",
    "app.kubernetes.io/instance",
    "app.kubernetes.io/version",
    "app.kubernetes.io/component",
    "app.kubernetes.io/part-of",
];

/// Strip standard Helm labels and `meta.helm.sh/*` annotations from a document
///
/// Returns the document re-serialized; an empty document yields an empty string.
pub fn drop_standard_labels(document: &str) -> Result<String> {
    let mut value = parse_document(document)?;
    if value.is_null() {
        return Ok(String::new());
    }

    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_mapping_mut) {
        if let Some(annotations) = metadata
            .get_mut("annotations")
            .and_then(Value::as_mapping_mut)
        {
            annotations.retain(|key, _| {
                !key.as_str()
                    .is_some_and(|k| k.starts_with(annotations::META_PREFIX))
            });
        }

        if let Some(labels) = metadata.get_mut("labels").and_then(Value::as_mapping_mut) {
            labels.retain(|key, _| !key.as_str().is_some_and(|k| STANDARD_LABELS.contains(&k)));
        }
    }

    Ok(serde_yaml::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_standard_labels() {
        let doc = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  labels:
    app.kubernetes.io/name: web
    helm.sh/chart: web-1.0.0
    team: platform
  annotations:
    meta.helm.sh/release-name: web
    meta.helm.sh/release-namespace: default
    owner: ops
data:
  key: value
"#;
        let out = drop_standard_labels(doc).unwrap();
        let value: Value = serde_yaml::from_str(&out).unwrap();

        let labels = &value["metadata"]["labels"];
        assert_eq!(labels["team"], "platform");
        assert!(labels.get("helm.sh/chart").is_none());
        assert!(labels.get("app.kubernetes.io/name").is_none());

        let annotations = &value["metadata"]["annotations"];
        assert_eq!(annotations["owner"], "ops");
        assert!(annotations.get("meta.helm.sh/release-name").is_none());
        assert_eq!(value["data"]["key"], "value");
    }

    #[test]
    fn test_document_without_labels_is_unchanged() {
        let doc = "kind: Service\nmetadata:\n  name: svc\n";
        let out = drop_standard_labels(doc).unwrap();
        let value: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(value["metadata"]["name"], "svc");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(drop_standard_labels("").unwrap(), "");
    }
}
