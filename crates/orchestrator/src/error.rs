//! Error taxonomy for orchestration operations.
//!
//! Remote failures are classified structurally at the client-library
//! boundary ([`classify_kube_error`]); the retry layer consults only
//! the resulting kind, never error message text.

use thiserror::Error;

use skiff_kubeconfig::KubeconfigError;

/// Errors that can occur while orchestrating environments.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Malformed kubeconfig, YAML, or credential payload.
    #[error("invalid format: {0}")]
    Format(String),

    /// Cluster record missing or not active.
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// Remote resource missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient network failure (timeout, connection refused/reset).
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Remote authentication/authorization failure.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Datastore call failure.
    #[error("datastore failure: {0}")]
    Database(String),

    /// Request rejected before reaching the cluster.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation-level wrapper carrying the original cause.
    #[error("{op} failed: {source}")]
    Operation {
        op: String,
        #[source]
        source: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    /// Wrap an error with an operation-specific message, preserving the
    /// original cause for logs.
    #[must_use]
    pub fn wrap(op: impl Into<String>, source: OrchestratorError) -> Self {
        OrchestratorError::Operation {
            op: op.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::TransientNetwork(_) => true,
            OrchestratorError::Operation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this is a remote auth/authz failure.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        match self {
            OrchestratorError::Auth(_) => true,
            OrchestratorError::Operation { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

impl From<KubeconfigError> for OrchestratorError {
    fn from(e: KubeconfigError) -> Self {
        match e {
            KubeconfigError::Connectivity(msg) => OrchestratorError::TransientNetwork(msg),
            other => OrchestratorError::Format(other.to_string()),
        }
    }
}

/// Map a `kube::Error` into the taxonomy by kind.
///
/// API responses are classified by HTTP status; everything else comes
/// from the transport layer and is treated as transient.
#[must_use]
pub fn classify_kube_error(e: kube::Error, what: &str) -> OrchestratorError {
    match e {
        kube::Error::Api(ae) if ae.code == 401 || ae.code == 403 => {
            OrchestratorError::Auth(format!("{what}: {}", ae.message))
        }
        kube::Error::Api(ae) if ae.code == 404 => {
            OrchestratorError::NotFound(format!("{what}: {}", ae.message))
        }
        kube::Error::Api(ae) if ae.code == 408 || ae.code == 429 || ae.code >= 500 => {
            OrchestratorError::TransientNetwork(format!("{what}: {} ({})", ae.message, ae.code))
        }
        kube::Error::Api(ae) => {
            OrchestratorError::Validation(format!("{what}: {} ({})", ae.message, ae.code))
        }
        kube::Error::Auth(auth) => OrchestratorError::Auth(format!("{what}: {auth}")),
        other => OrchestratorError::TransientNetwork(format!("{what}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_classification_by_status_code() {
        assert!(classify_kube_error(api_error(401), "probe").is_auth());
        assert!(classify_kube_error(api_error(403), "probe").is_auth());
        assert!(classify_kube_error(api_error(503), "probe").is_retryable());
        assert!(classify_kube_error(api_error(429), "probe").is_retryable());
        assert!(matches!(
            classify_kube_error(api_error(404), "probe"),
            OrchestratorError::NotFound(_)
        ));
        assert!(!classify_kube_error(api_error(422), "probe").is_retryable());
    }

    #[test]
    fn test_wrap_preserves_classification() {
        let wrapped = OrchestratorError::wrap(
            "create environment",
            OrchestratorError::TransientNetwork("reset".to_string()),
        );
        assert!(wrapped.is_retryable());
        assert!(wrapped.to_string().contains("create environment"));

        let wrapped = OrchestratorError::wrap("exec", OrchestratorError::Auth("denied".to_string()));
        assert!(wrapped.is_auth());
        assert!(!wrapped.is_retryable());
    }

    #[test]
    fn test_database_and_format_are_not_retryable() {
        assert!(!OrchestratorError::Database("down".to_string()).is_retryable());
        assert!(!OrchestratorError::Format("bad yaml".to_string()).is_retryable());
        assert!(!OrchestratorError::ClusterUnavailable("gone".to_string()).is_retryable());
    }
}
