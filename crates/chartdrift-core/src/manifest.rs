//! Splitting rendered manifest bundles and filtering the resulting documents
//!
//! A bundle is the multi-document output of `helm template` (or the manifest
//! stored with a release). It is split on Helm's `# Source:` banner and then
//! run through an ordered filter pipeline:
//!
//! 1. hooks (unless hooks are considered)
//! 2. skipped kinds
//! 3. kind allow-list, or the resource name when no kinds are selected
//!
//! Hook exclusion always runs first so an explicit kind or name selection
//! can never bring an ignored hook back.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::resource::{is_helm_hook, ResourceIdentity};

/// Default pattern used to split one rendered bundle into documents
pub const DEFAULT_SPLIT_PATTERN: &str = r"---\n# Source:\s.*.";

/// Hook delete policies ignored by default
pub const DEFAULT_IGNORED_HOOKS: &[&str] = &["hook-succeeded", "hook-failed"];

/// Compile a split pattern
pub fn split_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(pattern)?)
}

/// Split a bundle into individual documents
///
/// The fragment preceding the first separator is always dropped, so the
/// number of documents equals the number of separators in the bundle.
pub fn split_manifests(bundle: &str, separator: &Regex) -> Vec<String> {
    separator
        .split(bundle)
        .skip(1)
        .map(str::to_string)
        .collect()
}

/// Ordered document filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFilter {
    /// Keep hook documents regardless of their delete policy
    #[serde(default)]
    pub consider_hooks: bool,

    /// Hook delete policies whose documents are dropped
    #[serde(default = "default_ignored_hooks")]
    pub ignore_hook_types: Vec<String>,

    /// Kinds that are never compared
    #[serde(default)]
    pub skip_kinds: Vec<String>,

    /// When non-empty, only these kinds are compared
    #[serde(default)]
    pub kinds: Vec<String>,

    /// When set, only the resource with this name is compared
    #[serde(default)]
    pub name: Option<String>,
}

fn default_ignored_hooks() -> Vec<String> {
    DEFAULT_IGNORED_HOOKS.iter().map(|s| s.to_string()).collect()
}

impl Default for ManifestFilter {
    fn default() -> Self {
        Self {
            consider_hooks: false,
            ignore_hook_types: default_ignored_hooks(),
            skip_kinds: Vec::new(),
            kinds: Vec::new(),
            name: None,
        }
    }
}

impl ManifestFilter {
    /// Run every filter in order
    ///
    /// The name filter only applies when no kind allow-list is configured.
    pub fn apply(&self, documents: Vec<String>) -> Result<Vec<String>> {
        if let Some(index) = documents.iter().position(|d| d.trim().is_empty()) {
            return Err(CoreError::InvalidManifest {
                message: format!("document {} is empty", index + 1),
            });
        }

        let documents = self.filter_hooks(documents)?;
        let documents = self.filter_skipped_kinds(documents)?;
        if self.kinds.is_empty() {
            self.filter_name(documents)
        } else {
            self.filter_kinds(documents)
        }
    }

    /// Drop hook documents whose delete policy is ignored
    pub fn filter_hooks(&self, documents: Vec<String>) -> Result<Vec<String>> {
        if self.consider_hooks {
            return Ok(documents);
        }
        retain(documents, |doc| {
            Ok(!is_helm_hook(doc, &self.ignore_hook_types)?)
        })
    }

    /// Drop documents whose kind is skipped
    pub fn filter_skipped_kinds(&self, documents: Vec<String>) -> Result<Vec<String>> {
        if self.skip_kinds.is_empty() {
            return Ok(documents);
        }
        retain(documents, |doc| {
            let id = ResourceIdentity::parse(doc)?;
            Ok(!self.skip_kinds.contains(&id.kind))
        })
    }

    /// Keep only documents of the selected kinds
    pub fn filter_kinds(&self, documents: Vec<String>) -> Result<Vec<String>> {
        if self.kinds.is_empty() {
            return Ok(documents);
        }
        retain(documents, |doc| {
            let id = ResourceIdentity::parse(doc)?;
            Ok(self.kinds.contains(&id.kind))
        })
    }

    /// Keep only the document with the selected name
    pub fn filter_name(&self, documents: Vec<String>) -> Result<Vec<String>> {
        let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) else {
            return Ok(documents);
        };
        retain(documents, |doc| {
            let id = ResourceIdentity::parse(doc)?;
            Ok(id.name == name)
        })
    }
}

fn retain<F>(documents: Vec<String>, mut keep: F) -> Result<Vec<String>>
where
    F: FnMut(&str) -> Result<bool>,
{
    let mut kept = Vec::with_capacity(documents.len());
    for doc in documents {
        if keep(&doc)? {
            kept.push(doc);
        }
    }
    Ok(kept)
}
