//! Release skip list
//!
//! Entries are given as `name=namespace` and parsed once while building the
//! configuration.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A release excluded from cluster scans
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseSkipEntry {
    pub name: String,
    pub namespace: String,
}

impl ReleaseSkipEntry {
    /// Parse a `name=namespace` entry
    pub fn parse(entry: &str) -> Result<Self> {
        match entry.split_once('=') {
            Some((name, namespace)) if !name.trim().is_empty() && !namespace.trim().is_empty() => {
                Ok(Self {
                    name: name.trim().to_string(),
                    namespace: namespace.trim().to_string(),
                })
            }
            _ => Err(CoreError::InvalidSkipEntry {
                entry: entry.to_string(),
            }),
        }
    }

    pub fn matches(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }
}

/// Parsed skip list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseSkipList {
    entries: Vec<ReleaseSkipEntry>,
}

impl ReleaseSkipList {
    /// Parse every `name=namespace` specification
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let entries = specs
            .iter()
            .map(|s| ReleaseSkipEntry::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a release is skipped
    pub fn matches(&self, name: &str, namespace: &str) -> bool {
        self.entries.iter().any(|e| e.matches(name, namespace))
    }

    /// Remove skipped releases, using `key` to read `(name, namespace)`
    pub fn filter<T, F>(&self, items: Vec<T>, key: F) -> Vec<T>
    where
        F: Fn(&T) -> (&str, &str),
    {
        items
            .into_iter()
            .filter(|item| {
                let (name, namespace) = key(item);
                !self.matches(name, namespace)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        let entry = ReleaseSkipEntry::parse("prometheus=monitoring").unwrap();
        assert_eq!(entry.name, "prometheus");
        assert_eq!(entry.namespace, "monitoring");
    }

    #[test]
    fn test_parse_invalid_entries() {
        for spec in ["prometheus", "=monitoring", "prometheus=", ""] {
            assert!(
                matches!(ReleaseSkipEntry::parse(spec), Err(CoreError::InvalidSkipEntry { .. })),
                "{spec} should be rejected"
            );
        }
    }

    #[test]
    fn test_filter_matches_name_and_namespace() {
        let skips = ReleaseSkipList::from_specs(&["web=prod"]).unwrap();
        let releases = vec![("web", "prod"), ("web", "staging"), ("api", "prod")];

        let kept = skips.filter(releases, |r| (r.0, r.1));
        assert_eq!(kept, vec![("web", "staging"), ("api", "prod")]);
    }

    #[test]
    fn test_from_specs_fails_on_first_bad_entry() {
        assert!(ReleaseSkipList::from_specs(&["a=b", "broken"]).is_err());
        assert!(ReleaseSkipList::from_specs::<&str>(&[]).unwrap().is_empty());
    }
}
