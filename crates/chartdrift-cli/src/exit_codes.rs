//! Exit codes of the chartdrift binary

/// General error - acquisition, materialization or comparison failed
pub const ERROR: i32 = 1;

/// Configuration error - invalid flags or values
pub const CONFIG_ERROR: i32 = 2;

/// Prerequisite error - kubectl or kubeconfig unusable
pub const PREREQUISITE_ERROR: i32 = 3;

/// Drift found
pub const DRIFT_FOUND: i32 = 4;
