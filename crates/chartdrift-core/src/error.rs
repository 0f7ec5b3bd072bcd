//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse manifest: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Failed to get '{field}' from the manifest, '{field}' is not of type string")]
    InvalidField { field: String },

    #[error("Invalid split pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Unable to parse release skip '{entry}', expected format is 'name=namespace'")]
    InvalidSkipEntry { entry: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
