//! Resource introspection for single manifest documents
//!
//! Everything here is pure: a document goes in, typed identity or hook
//! information comes out. Fields that are simply absent are reported as
//! `None`/empty rather than errors, while fields that exist with the wrong
//! type are rejected.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{CoreError, Result};

/// Helm annotations consulted while classifying documents
pub mod annotations {
    /// Hook phase annotation
    pub const HOOK: &str = "helm.sh/hook";
    /// Hook delete policy
    pub const HOOK_DELETE_POLICY: &str = "helm.sh/hook-delete-policy";
    /// Prefix shared by the release bookkeeping annotations
    pub const META_PREFIX: &str = "meta.helm.sh/";
}

/// Identity of a Kubernetes resource as declared in its manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    /// Resource kind (Deployment, Service, ...)
    pub kind: String,

    /// `metadata.name`, empty when the document has no metadata
    pub name: String,

    /// `metadata.namespace`, if declared
    pub namespace: Option<String>,

    /// `apiVersion`, empty when not declared
    pub api_version: String,
}

impl ResourceIdentity {
    /// Parse a single manifest document and extract its identity
    pub fn parse(document: &str) -> Result<Self> {
        let value = parse_document(document)?;
        Self::from_value(&value)
    }

    /// Extract identity from an already parsed document
    pub fn from_value(value: &Value) -> Result<Self> {
        let kind = match value.get("kind") {
            Some(Value::String(kind)) => kind.clone(),
            _ => {
                return Err(CoreError::InvalidField {
                    field: "kind".to_string(),
                });
            }
        };

        let api_version = optional_string(value, "apiVersion")?.unwrap_or_default();

        let (name, namespace) = match value.get("metadata") {
            Some(metadata @ Value::Mapping(_)) => {
                let name = match metadata.get("name") {
                    Some(Value::String(name)) => name.clone(),
                    _ => {
                        return Err(CoreError::InvalidField {
                            field: "name".to_string(),
                        });
                    }
                };
                (name, optional_string(metadata, "namespace")?)
            }
            _ => (String::new(), None),
        };

        Ok(Self {
            kind,
            name,
            namespace,
            api_version,
        })
    }

    /// `kind/name` display form
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Parse a manifest document into a YAML value
pub fn parse_document(document: &str) -> Result<Value> {
    Ok(serde_yaml::from_str(document)?)
}

fn optional_string(value: &Value, key: &str) -> Result<Option<String>> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CoreError::InvalidField {
            field: key.to_string(),
        }),
    }
}

/// Read a string annotation from a parsed document
pub fn annotation<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(key))
        .and_then(|v| v.as_str())
}

/// Delete policies of a hook document
///
/// Returns `None` unless the document carries both the hook annotation and a
/// string delete policy.
pub fn hook_delete_policies(value: &Value) -> Option<Vec<String>> {
    annotation(value, annotations::HOOK)?;
    let policy = annotation(value, annotations::HOOK_DELETE_POLICY)?;

    Some(
        policy
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    )
}

/// Check whether a document is a Helm hook of one of the given delete policies
///
/// Documents that cannot be classified with certainty are not hooks.
pub fn is_helm_hook(document: &str, ignored_policies: &[String]) -> Result<bool> {
    let value = parse_document(document)?;
    Ok(hook_delete_policies(&value)
        .map(|policies| policies.iter().any(|p| ignored_policies.contains(p)))
        .unwrap_or(false))
}
