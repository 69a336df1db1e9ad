//! Cluster credential management and remote environment orchestration.
//!
//! This crate is the core behind Skiff's disposable development
//! environments: it recovers per-cluster kubeconfig credentials from
//! the datastore (decrypting them via [`skiff_crypto`]), resolves live
//! API clients on demand with per-cluster memoization, and drives
//! environment lifecycle operations against the target cluster with
//! bounded retry and structural failure classification.
//!
//! The HTTP layer and the relational schema are external
//! collaborators: they consume [`EnvironmentOrchestrator`] and
//! implement the [`ClusterStore`]/[`EnvironmentStore`] contracts.

pub mod config;
pub mod connection;
pub mod environment;
pub mod error;
pub mod retry;
pub mod store;
pub mod workload;

pub use config::OrchestratorConfig;
pub use connection::{ClusterConnectionManager, CredentialSource};
pub use environment::{EnvironmentInfo, EnvironmentOrchestrator, ExecOutput};
pub use error::{classify_kube_error, OrchestratorError};
pub use retry::{RetryConfig, RetryContext, RetryPolicy};
pub use store::{
    ClusterRecord, ClusterStatus, ClusterStore, EnvironmentRecord, EnvironmentStatus,
    EnvironmentStore,
};
pub use workload::{namespace_name, EnvironmentSpec};
