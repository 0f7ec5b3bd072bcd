//! CLI error types with exit code handling

use chartdrift_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI error type carrying its exit code
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid flags, skip entries or patterns
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(chartdrift::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The environment is not usable (kubectl, kubeconfig, value files)
    #[error("Prerequisite check failed: {message}")]
    #[diagnostic(
        code(chartdrift::cli::prerequisite),
        help("pass --skip-validation to bypass the prerequisite checks")
    )]
    Prerequisite { message: String },

    /// Drift was identified
    #[error("Drifts found in {count} resource(s)")]
    #[diagnostic(
        code(chartdrift::cli::drift),
        help("pass --disable-error-on-drift to exit successfully when drift is found")
    )]
    DriftFound { count: usize },

    /// Drift detection failed
    #[error("{message}")]
    #[diagnostic(code(chartdrift::cli::detection))]
    Detection { message: String },

    /// IO error (report files, stdout)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartdrift::cli::io))]
    Io { message: String },

    /// Serialization of the report failed
    #[error("Rendering failed: {message}")]
    #[diagnostic(code(chartdrift::cli::render))]
    Render { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Prerequisite { .. } => exit_codes::PREREQUISITE_ERROR,
            CliError::DriftFound { .. } => exit_codes::DRIFT_FOUND,
            CliError::Detection { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::ERROR,
            CliError::Render { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a prerequisite error
    pub fn prerequisite(message: impl Into<String>) -> Self {
        Self::Prerequisite {
            message: message.into(),
        }
    }

    /// Create a render error
    pub fn render(message: impl std::fmt::Display) -> Self {
        Self::Render {
            message: message.to_string(),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::InvalidConfig(message) => CliError::config(message),
            KubeError::Core(e @ chartdrift_core::CoreError::InvalidSkipEntry { .. }) => {
                CliError::config_with_help(
                    e.to_string(),
                    "skip entries are written as name=namespace",
                )
            }
            KubeError::Core(e @ chartdrift_core::CoreError::InvalidPattern(_)) => {
                CliError::config(e.to_string())
            }
            other => CliError::Detection {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::render(err)
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::render(err)
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("x").exit_code(), 2);
        assert_eq!(CliError::prerequisite("x").exit_code(), 3);
        assert_eq!(CliError::DriftFound { count: 1 }.exit_code(), 4);
        assert_eq!(CliError::render("x").exit_code(), 1);
    }

    #[test]
    fn test_kube_errors_are_mapped() {
        let err: CliError = KubeError::InvalidConfig("zero".to_string()).into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);

        let err: CliError = KubeError::Core(chartdrift_core::CoreError::InvalidSkipEntry {
            entry: "web".to_string(),
        })
        .into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);

        let err: CliError = KubeError::Aggregate {
            errors: vec!["a".to_string(), "b".to_string()],
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::ERROR);
        assert_eq!(err.to_string(), "a\nb");
    }
}
