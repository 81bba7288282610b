//! Error types for the Pulp operator

use thiserror::Error;

use crate::crd::SpecValidationError;

/// Result type alias used throughout the operator
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Invalid Pulp spec: {}", format_validation(.0))]
    ValidationError(Vec<SpecValidationError>),

    #[error("Remote execution in pod {pod} failed: {message}")]
    ExecError { pod: String, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Error::KubeError(err)
    }
}

impl Error {
    /// Whether the error is likely to clear up on its own (API hiccups,
    /// pods restarting) as opposed to requiring a spec change.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(_) | Error::ExecError { .. } => true,
            Error::ValidationError(_) | Error::SerializationError(_) | Error::ConfigError(_) => {
                false
            }
        }
    }

    /// Short label used for metrics and logs
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::ValidationError(_) => "validation",
            Error::ExecError { .. } => "exec",
            Error::SerializationError(_) => "serialization",
            Error::ConfigError(_) => "config",
        }
    }
}

fn format_validation(errors: &[SpecValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {} ({})", e.field, e.message, e.how_to_fix))
        .collect::<Vec<_>>()
        .join("; ")
}
