//! Cluster client resolution from stored credentials.
//!
//! Loads a cluster's credential record, recovers the kubeconfig (with a
//! plaintext-compatibility path for records predating encryption), and
//! produces a live API client bound to the document's current context.
//! Clients are memoized per cluster, keyed by a fingerprint of the
//! stored credential, so a credential rotation invalidates the cached
//! client on the next lookup.

use std::collections::HashMap;
use std::sync::Arc;

use kube::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use skiff_crypto::EncryptionService;
use skiff_kubeconfig::{client_for_document, KubeconfigParser};

use crate::error::OrchestratorError;
use crate::store::{ClusterStatus, ClusterStore};

/// Outcome of credential recovery: where the kubeconfig text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Stored payload decrypted successfully.
    Decrypted(String),
    /// Stored payload is a pre-encryption plaintext record.
    Plaintext(String),
}

impl CredentialSource {
    /// The recovered kubeconfig text.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            CredentialSource::Decrypted(s) | CredentialSource::Plaintext(s) => s,
        }
    }
}

struct CachedClient {
    /// Fingerprint of the stored credential the client was built from.
    fingerprint: String,
    client: Client,
}

/// Resolves live API clients for registered clusters.
pub struct ClusterConnectionManager {
    clusters: Arc<dyn ClusterStore>,
    encryption: Arc<EncryptionService>,
    parser: KubeconfigParser,
    cache: RwLock<HashMap<String, CachedClient>>,
}

impl ClusterConnectionManager {
    /// Create a manager over the given cluster store and encryption
    /// service.
    #[must_use]
    pub fn new(
        clusters: Arc<dyn ClusterStore>,
        encryption: Arc<EncryptionService>,
        parser: KubeconfigParser,
    ) -> Self {
        Self {
            clusters,
            encryption,
            parser,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a live API client for the given cluster.
    ///
    /// # Errors
    /// Returns `ClusterUnavailable` if the cluster is missing or
    /// inactive, and `Format` if its stored credential is neither
    /// decryptable nor a valid plaintext kubeconfig.
    pub async fn get_client(&self, cluster_id: &str) -> Result<Client, OrchestratorError> {
        let record = self
            .clusters
            .get_cluster(cluster_id)
            .await?
            .filter(|r| r.status == ClusterStatus::Active)
            .ok_or_else(|| {
                OrchestratorError::ClusterUnavailable(format!(
                    "cluster {cluster_id} not found or inactive"
                ))
            })?;

        let fingerprint = EncryptionService::hash(&record.kubeconfig);

        if let Some(cached) = self.cache.read().await.get(cluster_id) {
            if cached.fingerprint == fingerprint {
                debug!(cluster_id, "using cached cluster client");
                return Ok(cached.client.clone());
            }
            info!(cluster_id, "stored credential changed, rebuilding client");
        }

        let source = self.resolve_credentials(cluster_id, &record.kubeconfig)?;
        let doc = self
            .parser
            .parse_document(source.content())
            .map_err(|e| OrchestratorError::Format(e.to_string()))?;
        let client = client_for_document(&doc)
            .await
            .map_err(|e| OrchestratorError::Format(e.to_string()))?;

        self.cache.write().await.insert(
            cluster_id.to_string(),
            CachedClient {
                fingerprint,
                client: client.clone(),
            },
        );

        Ok(client)
    }

    /// Evict any cached client for the given cluster. Called by
    /// credential-rotation flows; a later `get_client` rebuilds from
    /// the fresh record.
    pub async fn invalidate(&self, cluster_id: &str) {
        if self.cache.write().await.remove(cluster_id).is_some() {
            debug!(cluster_id, "evicted cached cluster client");
        }
    }

    /// Recover kubeconfig text from a stored credential as an explicit
    /// two-step sequence: decrypt, then plaintext-compatibility.
    pub(crate) fn resolve_credentials(
        &self,
        cluster_id: &str,
        stored: &str,
    ) -> Result<CredentialSource, OrchestratorError> {
        match self.encryption.decrypt_str(stored) {
            Ok(plaintext) => Ok(CredentialSource::Decrypted(plaintext)),
            Err(decrypt_err) => Self::try_plaintext(cluster_id, stored, &decrypt_err),
        }
    }

    /// Accept the stored string as an already-plaintext kubeconfig if
    /// it passes the structural pre-check; otherwise the credential is
    /// unusable.
    fn try_plaintext(
        cluster_id: &str,
        stored: &str,
        cause: &skiff_crypto::CryptoError,
    ) -> Result<CredentialSource, OrchestratorError> {
        if Self::validate_format(stored) {
            // Record predates encryption; logged so residual legacy
            // rows stay visible.
            warn!(
                cluster_id,
                "credential decrypt failed, using stored plaintext kubeconfig"
            );
            Ok(CredentialSource::Plaintext(stored.to_string()))
        } else {
            Err(OrchestratorError::Format(format!(
                "stored credential for cluster {cluster_id} is neither decryptable nor a plaintext kubeconfig: {cause}"
            )))
        }
    }

    /// Cheap static pre-check for kubeconfig-shaped content, used to
    /// short-circuit obviously invalid input before a full parse.
    #[must_use]
    pub fn validate_format(content: &str) -> bool {
        !content.trim().is_empty()
            && content.contains("apiVersion")
            && content.contains("kind: Config")
            && content.contains("clusters")
            && content.contains("contexts")
    }
}

#[cfg(test)]
mod tests {
    use skiff_crypto::EncryptionConfig;

    use super::*;
    use crate::store::{ClusterRecord, MockClusterStore};

    const VALID_KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
current-context: main
clusters:
  - name: main-cluster
    cluster:
      server: https://127.0.0.1:6443
      insecure-skip-tls-verify: true
users:
  - name: main-user
    user:
      token: test-token
contexts:
  - name: main
    context:
      cluster: main-cluster
      user: main-user
";

    fn encryption() -> Arc<EncryptionService> {
        let config = EncryptionConfig {
            scrypt_log_n: 4,
            ..EncryptionConfig::new("unit-test-secret")
        };
        Arc::new(EncryptionService::new(&config).unwrap())
    }

    fn record(id: &str, status: ClusterStatus, kubeconfig: &str) -> ClusterRecord {
        ClusterRecord {
            id: id.to_string(),
            name: format!("{id}-name"),
            status,
            kubeconfig: kubeconfig.to_string(),
            provider: "generic".to_string(),
            region: "us-east-1".to_string(),
            node_count: 1,
        }
    }

    fn manager(store: MockClusterStore) -> ClusterConnectionManager {
        ClusterConnectionManager::new(Arc::new(store), encryption(), KubeconfigParser::default())
    }

    #[tokio::test]
    async fn test_missing_cluster_rejected() {
        let mut store = MockClusterStore::new();
        store.expect_get_cluster().returning(|_| Ok(None));

        let err = match manager(store).get_client("nope").await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
        assert!(err.to_string().contains("not found or inactive"));
    }

    #[tokio::test]
    async fn test_inactive_cluster_rejected() {
        let mut store = MockClusterStore::new();
        store.expect_get_cluster().returning(|id| {
            Ok(Some(record(id, ClusterStatus::Inactive, VALID_KUBECONFIG)))
        });

        let err = match manager(store).get_client("c1").await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, OrchestratorError::ClusterUnavailable(_)));
    }

    #[tokio::test]
    async fn test_encrypted_credential_builds_client() {
        let encryption = encryption();
        let ciphertext = encryption.encrypt(VALID_KUBECONFIG).unwrap().to_string();

        let mut store = MockClusterStore::new();
        store
            .expect_get_cluster()
            .returning(move |id| Ok(Some(record(id, ClusterStatus::Active, &ciphertext))));

        let manager = ClusterConnectionManager::new(
            Arc::new(store),
            encryption,
            KubeconfigParser::default(),
        );
        // No connection is made at build time.
        assert!(manager.get_client("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_plaintext_fallback_builds_client() {
        let mut store = MockClusterStore::new();
        store
            .expect_get_cluster()
            .returning(|id| Ok(Some(record(id, ClusterStatus::Active, VALID_KUBECONFIG))));

        assert!(manager(store).get_client("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_garbage_credential_is_format_error() {
        let mut store = MockClusterStore::new();
        store
            .expect_get_cluster()
            .returning(|id| Ok(Some(record(id, ClusterStatus::Active, "not a credential"))));

        let err = match manager(store).get_client("c1").await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, OrchestratorError::Format(_)));
    }

    #[tokio::test]
    async fn test_client_memoized_until_credential_changes() {
        let mut store = MockClusterStore::new();
        store
            .expect_get_cluster()
            .times(2)
            .returning(|id| Ok(Some(record(id, ClusterStatus::Active, VALID_KUBECONFIG))));

        let manager = manager(store);
        manager.get_client("c1").await.unwrap();
        // Second call hits the cache but still revalidates the record.
        manager.get_client("c1").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_evicts_cached_client() {
        let mut store = MockClusterStore::new();
        store
            .expect_get_cluster()
            .times(2)
            .returning(|id| Ok(Some(record(id, ClusterStatus::Active, VALID_KUBECONFIG))));

        let manager = manager(store);
        manager.get_client("c1").await.unwrap();
        manager.invalidate("c1").await;
        assert!(manager.get_client("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_credentials_two_step() {
        let store = MockClusterStore::new();
        let manager = manager(store);

        // Plaintext step engages only after decryption fails.
        let source = manager
            .resolve_credentials("c1", VALID_KUBECONFIG)
            .unwrap();
        assert!(matches!(source, CredentialSource::Plaintext(_)));
        assert_eq!(source.content(), VALID_KUBECONFIG);

        let encrypted = manager.encryption.encrypt("apiVersion: v1\nkind: Config\nclusters: []\ncontexts: []\n").unwrap().to_string();
        let source = manager.resolve_credentials("c1", &encrypted).unwrap();
        assert!(matches!(source, CredentialSource::Decrypted(_)));

        assert!(manager.resolve_credentials("c1", "garbage").is_err());
    }

    #[test]
    fn test_validate_format() {
        assert!(ClusterConnectionManager::validate_format(VALID_KUBECONFIG));
        assert!(!ClusterConnectionManager::validate_format(""));
        assert!(!ClusterConnectionManager::validate_format("   "));
        assert!(!ClusterConnectionManager::validate_format(
            "apiVersion: v1\nkind: Secret\n"
        ));
        assert!(!ClusterConnectionManager::validate_format(
            "kind: Config\nclusters: []\n"
        ));
    }
}
