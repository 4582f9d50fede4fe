//! Error types for armada
//!
//! Errors carry the context name, the command, or the stage that failed so
//! a failed run can be reconstructed from its log alone.

use std::time::Duration;

use thiserror::Error;

/// Main error type for armada operations
#[derive(Debug, Error)]
pub enum Error {
    /// An external tool exited non-zero
    #[error("command failed: {command} - {message}")]
    CommandFailed {
        /// The command line that failed (never includes secret material)
        command: String,
        /// stderr of the failed command
        message: String,
    },

    /// The infra tool failed during init or plan; apply was never attempted
    #[error("infra planning failed for {context}: {message}")]
    InfraPlan {
        /// Context whose infrastructure was being planned
        context: String,
        /// Description of what failed
        message: String,
    },

    /// The infra tool failed during apply
    #[error("infra apply failed for {context}: {message}")]
    InfraApply {
        /// Context whose infrastructure was being applied
        context: String,
        /// Description of what failed
        message: String,
    },

    /// A readiness predicate did not hold within its bound
    #[error("timed out after {elapsed:?} waiting for {description}{}", .last_error.as_ref().map(|e| format!(" (last error: {})", e)).unwrap_or_default())]
    ReadinessTimeout {
        /// Human-readable description of the awaited condition
        description: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Last observation error, if the predicate was failing rather than false
        last_error: Option<String>,
    },

    /// A service-account credential could not be read or was empty
    #[error("missing credential for {context}: {message}")]
    MissingCredential {
        /// Context whose credential is missing
        context: String,
        /// What was missing
        message: String,
    },

    /// Invalid readiness or run configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what's invalid
        message: String,
        /// The offending field, if known
        field: Option<String>,
    },

    /// A stage failed for one or more contexts
    #[error("stage {stage} failed for {}", .failures.join("; "))]
    StageFailed {
        /// Stage name
        stage: String,
        /// One `context: message` entry per failed context
        failures: Vec<String>,
    },

    /// Kube-style configuration could not be read
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a command failure
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a planning failure for a context
    pub fn infra_plan(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InfraPlan {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an apply failure for a context
    pub fn infra_apply(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InfraApply {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a readiness timeout
    pub fn readiness_timeout(
        description: impl Into<String>,
        elapsed: Duration,
        last_error: Option<String>,
    ) -> Self {
        Self::ReadinessTimeout {
            description: description.into(),
            elapsed,
            last_error,
        }
    }

    /// Create a missing-credential error for a context
    pub fn missing_credential(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingCredential {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an aggregated stage failure
    pub fn stage_failed(stage: impl Into<String>, failures: Vec<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            failures,
        }
    }

    /// Whether the failure is a transient tool failure worth one more attempt
    ///
    /// Readiness timeouts, planning failures and credential gaps are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CommandFailed { message, .. } => !is_not_found(message),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Whether a command failed because the object already exists
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::CommandFailed { message, .. } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("already exists") || lower.contains("alreadyexists")
            }
            _ => false,
        }
    }

    /// Whether a command failed because the release name is taken
    pub fn is_release_conflict(&self) -> bool {
        match self {
            Self::CommandFailed { message, .. } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("cannot re-use a name that is still in use")
                    || (lower.contains("release") && lower.contains("already exists"))
            }
            _ => false,
        }
    }

    /// Context name carried by the error, if any
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::InfraPlan { context, .. }
            | Self::InfraApply { context, .. }
            | Self::MissingCredential { context, .. } => Some(context),
            _ => None,
        }
    }
}

fn is_not_found(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("notfound")
}
