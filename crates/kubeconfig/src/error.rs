//! Error types for kubeconfig handling.

use thiserror::Error;

/// Errors that can occur while parsing or validating kubeconfigs.
#[derive(Error, Debug)]
pub enum KubeconfigError {
    /// Document parsed as YAML but is not a kubeconfig.
    #[error("invalid kubeconfig document: {0}")]
    InvalidDocument(String),

    /// Document is not parseable YAML at all.
    #[error("failed to parse kubeconfig YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Referenced context does not exist in the document.
    #[error("unknown context: {0}")]
    UnknownContext(String),

    /// A client could not be constructed from the document.
    #[error("failed to build client: {0}")]
    ClientBuild(String),

    /// A live connectivity probe failed.
    #[error("connectivity check failed: {0}")]
    Connectivity(String),
}
