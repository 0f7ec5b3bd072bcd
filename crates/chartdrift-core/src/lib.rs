//! chartdrift core - the pure half of drift detection
//!
//! This crate provides:
//! - `resource`: identity and hook introspection of single manifest documents
//! - `manifest`: splitting rendered bundles and the ordered filter pipeline
//! - `deviation`: the drift data model (`Deviation`, `DriftedRelease`, `DriftedReleaseSet`)
//! - `skip`: the release skip list used in cluster scans
//! - `labels`: stripping Helm bookkeeping labels before comparison

pub mod deviation;
pub mod error;
pub mod labels;
pub mod manifest;
pub mod resource;
pub mod skip;

pub use deviation::{Deviation, DriftedRelease, DriftedReleaseSet};
pub use error::{CoreError, Result};
pub use labels::drop_standard_labels;
pub use manifest::{
    split_manifests, split_pattern, ManifestFilter, DEFAULT_IGNORED_HOOKS, DEFAULT_SPLIT_PATTERN,
};
pub use resource::{is_helm_hook, ResourceIdentity};
pub use skip::{ReleaseSkipEntry, ReleaseSkipList};
