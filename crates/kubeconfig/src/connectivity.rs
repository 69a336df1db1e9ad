//! Live connectivity validation for kubeconfig documents.
//!
//! Each context is probed with a lightweight namespace listing; node
//! counting is strictly best-effort and can only degrade the reported
//! count, never the connectivity verdict.

use futures::future::join_all;
use k8s_openapi::api::core::v1::{Namespace, Node};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use serde::Serialize;
use tracing::{debug, warn};

use crate::document::KubeconfigDoc;
use crate::error::KubeconfigError;
use crate::parser::KubeconfigParser;

/// Node count reported when the node listing fails but the cluster is
/// otherwise reachable.
const FALLBACK_NODE_COUNT: i32 = 1;

/// Connectivity result for a single context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextConnectivity {
    /// Context name.
    pub context: String,
    /// Whether the namespace probe succeeded.
    pub connected: bool,
    /// Observed node count (best effort; defaults to 1 on failure).
    pub node_count: i32,
    /// Probe error, when disconnected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connectivity result for a whole document.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    /// True only when every context is connected.
    pub valid: bool,
    /// Per-context results, in document order.
    pub contexts: Vec<ContextConnectivity>,
}

/// Build a live API client from an in-memory kubeconfig document,
/// bound to the document's current context.
///
/// # Errors
/// Returns an error if the document cannot be converted into a client
/// configuration.
pub async fn client_for_document(doc: &KubeconfigDoc) -> Result<Client, KubeconfigError> {
    let yaml = serde_yaml::to_string(doc)?;
    let kubeconfig = Kubeconfig::from_yaml(&yaml)
        .map_err(|e| KubeconfigError::InvalidDocument(e.to_string()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| KubeconfigError::ClientBuild(e.to_string()))?;
    Client::try_from(config).map_err(|e| KubeconfigError::ClientBuild(e.to_string()))
}

impl KubeconfigParser {
    /// Validate live connectivity for every context in the document.
    ///
    /// All contexts are probed concurrently. The report is `valid` only
    /// if the document has at least one context and every context
    /// answered the namespace probe.
    ///
    /// # Errors
    /// Returns an error only when the document itself is invalid;
    /// unreachable clusters are reported, not raised.
    pub async fn validate_connectivity(
        &self,
        raw: &str,
    ) -> Result<ConnectivityReport, KubeconfigError> {
        let doc = self.parse_document(raw)?;

        let probes = doc
            .contexts
            .iter()
            .map(|named| self.check_context(&doc, named.name.clone()));
        let contexts = join_all(probes).await;

        let valid = !contexts.is_empty() && contexts.iter().all(|c| c.connected);
        Ok(ConnectivityReport { valid, contexts })
    }

    async fn check_context(&self, doc: &KubeconfigDoc, context: String) -> ContextConnectivity {
        match self.probe_context(doc, &context).await {
            Ok(node_count) => {
                debug!(context = %context, node_count, "context connectivity verified");
                ContextConnectivity {
                    context,
                    connected: true,
                    node_count,
                    error: None,
                }
            }
            Err(e) => {
                warn!(context = %context, error = %e, "context connectivity check failed");
                ContextConnectivity {
                    context,
                    connected: false,
                    node_count: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Probe one context: list namespaces to establish connectivity,
    /// then count nodes best-effort.
    async fn probe_context(
        &self,
        doc: &KubeconfigDoc,
        context: &str,
    ) -> Result<i32, KubeconfigError> {
        let minimal = self.create_context_kubeconfig(doc, context)?;
        let client = client_for_document(&minimal).await?;

        let namespaces: Api<Namespace> = Api::all(client.clone());
        namespaces
            .list(&ListParams::default().limit(1))
            .await
            .map_err(|e| KubeconfigError::Connectivity(e.to_string()))?;

        let nodes: Api<Node> = Api::all(client);
        let node_count = match nodes.list(&ListParams::default()).await {
            Ok(list) => i32::try_from(list.items.len()).unwrap_or(i32::MAX),
            Err(e) => {
                // Listing nodes needs broader RBAC than listing
                // namespaces; a failure here must not flip the
                // connectivity verdict.
                warn!(
                    context = %context,
                    error = %e,
                    "node listing failed, reporting fallback node count"
                );
                FALLBACK_NODE_COUNT
            }
        };

        Ok(node_count)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::KubeconfigParser;

    /// Points at a local port nothing listens on; probes fail fast with
    /// connection refused.
    const UNREACHABLE: &str = r"
apiVersion: v1
kind: Config
current-context: dead
clusters:
  - name: dead-cluster
    cluster:
      server: https://127.0.0.1:1
      insecure-skip-tls-verify: true
users:
  - name: dead-user
    user:
      token: irrelevant
contexts:
  - name: dead
    context:
      cluster: dead-cluster
      user: dead-user
";

    #[tokio::test]
    async fn test_unreachable_cluster_reports_disconnected() {
        let parser = KubeconfigParser::default();
        let report = parser.validate_connectivity(UNREACHABLE).await.unwrap();

        assert!(!report.valid);
        assert_eq!(report.contexts.len(), 1);
        assert!(!report.contexts[0].connected);
        assert!(report.contexts[0].error.is_some());
    }

    #[tokio::test]
    async fn test_invalid_document_is_an_error() {
        let parser = KubeconfigParser::default();
        assert!(parser
            .validate_connectivity("kind: Secret\napiVersion: v1\n")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_document_is_not_valid() {
        let parser = KubeconfigParser::default();
        let report = parser
            .validate_connectivity("apiVersion: v1\nkind: Config\n")
            .await
            .unwrap();
        assert!(!report.valid);
        assert!(report.contexts.is_empty());
    }
}
