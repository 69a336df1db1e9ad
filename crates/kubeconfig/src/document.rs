//! Serde model of the standard kubeconfig document.
//!
//! Only the fields this system reads or writes are modeled; unknown
//! fields are dropped on round trip. The schema is the usual
//! `apiVersion: v1` / `kind: Config` shape with named cluster, user,
//! and context entries.

use serde::{Deserialize, Serialize};

/// A kubeconfig document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeconfigDoc {
    /// API version (always "v1").
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Kind (always "Config").
    pub kind: String,
    /// Cluster entries.
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    /// User entries.
    #[serde(default)]
    pub users: Vec<NamedUser>,
    /// Context entries.
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    /// Name of the active context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
}

impl KubeconfigDoc {
    /// Look up a cluster entry by name.
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Look up a user entry by name.
    #[must_use]
    pub fn user(&self, name: &str) -> Option<&NamedUser> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Look up a context entry by name.
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&NamedContext> {
        self.contexts.iter().find(|c| c.name == name)
    }
}

/// Named cluster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterDetail,
}

/// Cluster connection details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterDetail {
    /// API server URL.
    pub server: String,
    /// CA certificate (base64 encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    /// Skip TLS verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
}

/// Named user entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserDetail,
}

/// User credential material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserDetail {
    /// Client certificate (base64 encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    /// Client private key (base64 encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Basic-auth username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Named context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextDetail,
}

/// A (cluster, user, namespace) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDetail {
    /// Cluster name (reference).
    pub cluster: String,
    /// User name (reference).
    pub user: String,
    /// Default namespace for this context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
apiVersion: v1
kind: Config
current-context: prod
clusters:
  - name: prod-cluster
    cluster:
      server: https://10.0.0.1:6443
      certificate-authority-data: Zm9v
users:
  - name: prod-admin
    user:
      token: abc123
contexts:
  - name: prod
    context:
      cluster: prod-cluster
      user: prod-admin
      namespace: default
";

    #[test]
    fn test_deserialize_sample() {
        let doc: KubeconfigDoc = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(doc.kind, "Config");
        assert_eq!(doc.api_version, "v1");
        assert_eq!(doc.current_context.as_deref(), Some("prod"));
        assert_eq!(doc.clusters.len(), 1);
        assert_eq!(
            doc.cluster("prod-cluster").unwrap().cluster.server,
            "https://10.0.0.1:6443"
        );
        assert_eq!(
            doc.user("prod-admin").unwrap().user.token.as_deref(),
            Some("abc123")
        );
        assert_eq!(
            doc.context("prod").unwrap().context.namespace.as_deref(),
            Some("default")
        );
    }

    #[test]
    fn test_yaml_round_trip() {
        let doc: KubeconfigDoc = serde_yaml::from_str(SAMPLE).unwrap();
        let emitted = serde_yaml::to_string(&doc).unwrap();
        let reparsed: KubeconfigDoc = serde_yaml::from_str(&emitted).unwrap();
        assert_eq!(doc, reparsed);
    }
}
