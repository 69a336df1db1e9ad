//! Kubeconfig parsing into normalized per-cluster records.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{KubeconfigDoc, NamedContext};
use crate::error::KubeconfigError;

/// Configuration for [`KubeconfigParser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Region reported when no heuristic matches.
    #[serde(default = "default_region")]
    pub default_region: String,

    /// Provider tag reported when no keyword matches.
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_provider() -> String {
    "generic".to_string()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_region: default_region(),
            default_provider: default_provider(),
        }
    }
}

/// One resolved context of a kubeconfig document.
///
/// Carries a copy of the complete source document: the full
/// multi-context text is what gets persisted (and encrypted) as a
/// unit, so it travels with every record derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedClusterContext {
    /// Context name.
    pub context_name: String,
    /// Referenced cluster name.
    pub cluster_name: String,
    /// Referenced user name.
    pub user_name: String,
    /// API server URL.
    pub server: String,
    /// CA certificate (base64 encoded), if present.
    pub certificate_authority_data: Option<String>,
    /// Bearer token, if the user entry carries one.
    pub token: Option<String>,
    /// Default namespace of the context.
    pub namespace: Option<String>,
    /// Inferred hosting provider.
    pub provider: String,
    /// Inferred region.
    pub region: String,
    /// Whether this context is the document's `current-context`.
    pub is_current_context: bool,
    /// The entire source document text.
    pub raw_document: String,
}

/// Parses kubeconfig documents and infers provider/region metadata.
///
/// Constructed explicitly with a [`ParserConfig`]; there is no hidden
/// process-wide instance.
pub struct KubeconfigParser {
    pub(crate) config: ParserConfig,
    pub(crate) aws_region: Regex,
    pub(crate) bare_label: Regex,
    pub(crate) embedded_region: Regex,
}

impl KubeconfigParser {
    /// Create a parser with the given configuration.
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            // AWS-style region token, e.g. "us-west-2" in
            // eks.us-west-2.amazonaws.com.
            aws_region: Regex::new(r"(?:^|[.-])([a-z]{2}-[a-z]+-\d)(?:[.-]|$)")
                .expect("static regex"),
            // Bare datacenter label, e.g. "gra7" in gra7.example.net.
            bare_label: Regex::new(r"^[a-z]+\d+$").expect("static regex"),
            // Embedded dotted region, e.g. ".eu-west." in
            // k8s.eu-west.provider.example.
            embedded_region: Regex::new(r"\.([a-z]{2}-[a-z]+)\.").expect("static regex"),
        }
    }

    /// Parse the raw document into a typed [`KubeconfigDoc`], enforcing
    /// `kind: Config`.
    ///
    /// # Errors
    /// Returns an error if the text is not parseable as the kubeconfig
    /// schema or is not a `Config` document.
    pub fn parse_document(&self, raw: &str) -> Result<KubeconfigDoc, KubeconfigError> {
        let doc: KubeconfigDoc = serde_yaml::from_str(raw)?;
        if doc.kind != "Config" {
            return Err(KubeconfigError::InvalidDocument(format!(
                "expected kind 'Config', got '{}'",
                doc.kind
            )));
        }
        Ok(doc)
    }

    /// Parse a multi-context document into per-cluster records.
    ///
    /// A context whose cluster or user reference is dangling is skipped
    /// with a warning; only a structurally invalid document is an
    /// error.
    ///
    /// # Errors
    /// Returns an error only when the document itself does not parse as
    /// a kubeconfig.
    pub fn parse_content(&self, raw: &str) -> Result<Vec<ParsedClusterContext>, KubeconfigError> {
        let doc = self.parse_document(raw)?;

        let mut records = Vec::with_capacity(doc.contexts.len());
        for named in &doc.contexts {
            let Some(cluster) = doc.cluster(&named.context.cluster) else {
                warn!(
                    context = %named.name,
                    cluster = %named.context.cluster,
                    "skipping context with dangling cluster reference"
                );
                continue;
            };
            let Some(user) = doc.user(&named.context.user) else {
                warn!(
                    context = %named.name,
                    user = %named.context.user,
                    "skipping context with dangling user reference"
                );
                continue;
            };

            records.push(ParsedClusterContext {
                context_name: named.name.clone(),
                cluster_name: named.context.cluster.clone(),
                user_name: named.context.user.clone(),
                server: cluster.cluster.server.clone(),
                certificate_authority_data: cluster.cluster.certificate_authority_data.clone(),
                token: user.user.token.clone(),
                namespace: named.context.namespace.clone(),
                provider: self.extract_provider(&named.context.cluster, &cluster.cluster.server),
                region: self.extract_region(&cluster.cluster.server),
                is_current_context: doc.current_context.as_deref() == Some(named.name.as_str()),
                raw_document: raw.to_string(),
            });
        }

        Ok(records)
    }

    /// Emit a minimal single-context document containing only the given
    /// context's cluster/user/context triple.
    ///
    /// # Errors
    /// Returns an error if the context or its references do not exist.
    pub fn create_context_kubeconfig(
        &self,
        doc: &KubeconfigDoc,
        context_name: &str,
    ) -> Result<KubeconfigDoc, KubeconfigError> {
        let named = doc
            .context(context_name)
            .ok_or_else(|| KubeconfigError::UnknownContext(context_name.to_string()))?;
        let cluster = doc.cluster(&named.context.cluster).ok_or_else(|| {
            KubeconfigError::InvalidDocument(format!(
                "context '{context_name}' references missing cluster '{}'",
                named.context.cluster
            ))
        })?;
        let user = doc.user(&named.context.user).ok_or_else(|| {
            KubeconfigError::InvalidDocument(format!(
                "context '{context_name}' references missing user '{}'",
                named.context.user
            ))
        })?;

        Ok(KubeconfigDoc {
            api_version: doc.api_version.clone(),
            kind: doc.kind.clone(),
            clusters: vec![cluster.clone()],
            users: vec![user.clone()],
            contexts: vec![NamedContext {
                name: named.name.clone(),
                context: named.context.clone(),
            }],
            current_context: Some(named.name.clone()),
        })
    }
}

impl Default for KubeconfigParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CONTEXTS: &str = r"
apiVersion: v1
kind: Config
current-context: alpha
clusters:
  - name: alpha-cluster
    cluster:
      server: https://51.79.10.20:6443
  - name: beta-cluster
    cluster:
      server: https://eks.us-west-2.amazonaws.com
users:
  - name: alpha-user
    user:
      token: alpha-token
contexts:
  - name: alpha
    context:
      cluster: alpha-cluster
      user: alpha-user
  - name: beta
    context:
      cluster: beta-cluster
      user: missing-user
";

    #[test]
    fn test_dangling_reference_is_skipped_not_fatal() {
        let parser = KubeconfigParser::default();
        let records = parser.parse_content(TWO_CONTEXTS).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context_name, "alpha");
        assert!(records[0].is_current_context);
    }

    #[test]
    fn test_record_carries_full_source_document() {
        let parser = KubeconfigParser::default();
        let records = parser.parse_content(TWO_CONTEXTS).unwrap();
        assert_eq!(records[0].raw_document, TWO_CONTEXTS);
        // Full text, not just the resolved context.
        assert!(records[0].raw_document.contains("beta-cluster"));
    }

    #[test]
    fn test_record_fields_resolved_from_references() {
        let parser = KubeconfigParser::default();
        let records = parser.parse_content(TWO_CONTEXTS).unwrap();
        let rec = &records[0];
        assert_eq!(rec.cluster_name, "alpha-cluster");
        assert_eq!(rec.user_name, "alpha-user");
        assert_eq!(rec.server, "https://51.79.10.20:6443");
        assert_eq!(rec.token.as_deref(), Some("alpha-token"));
        assert_eq!(rec.region, "eu-west-1");
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let parser = KubeconfigParser::default();
        let err = parser
            .parse_content("apiVersion: v1\nkind: Secret\n")
            .unwrap_err();
        assert!(err.to_string().contains("Config"));
    }

    #[test]
    fn test_unparseable_document_is_rejected() {
        let parser = KubeconfigParser::default();
        assert!(parser.parse_content("{ not yaml at all ::::").is_err());
        assert!(parser.parse_content("just a scalar").is_err());
    }

    #[test]
    fn test_create_context_kubeconfig_minimal() {
        let parser = KubeconfigParser::default();
        let doc = parser.parse_document(TWO_CONTEXTS).unwrap();
        let minimal = parser.create_context_kubeconfig(&doc, "alpha").unwrap();

        assert_eq!(minimal.clusters.len(), 1);
        assert_eq!(minimal.users.len(), 1);
        assert_eq!(minimal.contexts.len(), 1);
        assert_eq!(minimal.current_context.as_deref(), Some("alpha"));
        assert_eq!(minimal.clusters[0].name, "alpha-cluster");
    }

    #[test]
    fn test_create_context_kubeconfig_unknown_context() {
        let parser = KubeconfigParser::default();
        let doc = parser.parse_document(TWO_CONTEXTS).unwrap();
        assert!(parser.create_context_kubeconfig(&doc, "nope").is_err());
        // Dangling references inside the chosen context are also errors
        // here, unlike in parse_content.
        assert!(parser.create_context_kubeconfig(&doc, "beta").is_err());
    }
}
