//! # Errors
//!
//! Error types surfaced by the runtime.
//!
//! - [`ConfigError`]: a mandatory builder option is missing
//! - [`OperatorError`]: `run` could not start
//! - [`ClientError`]: a call across the client/watch boundary failed
//!
//! Reconciler failures are plain `anyhow::Error`s and never leave the dispatcher.

use thiserror::Error;

/// Missing mandatory operator option
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no resource type configured")]
    MissingResource,
    #[error("no client configured")]
    MissingClient,
    #[error("no reconciler configured")]
    MissingReconciler,
}

/// Failure returned from `Operator::run`
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("failed to open initial watch on {resource}: {source}")]
    Startup {
        resource: String,
        #[source]
        source: ClientError,
    },
    #[error("operator is already running")]
    AlreadyRunning,
}

/// Failure of a remote API or watch call
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource already exists: {0}")]
    Conflict(String),
    #[error("watch stream error: {0}")]
    Stream(String),
    #[error("client serves {served}, not {requested}")]
    ResourceTypeMismatch { requested: String, served: String },
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 404 => {
                Self::NotFound(response.message.clone())
            }
            kube::Error::Api(response) if response.code == 409 => {
                Self::Conflict(response.message.clone())
            }
            _ => Self::Kube(error),
        }
    }
}
