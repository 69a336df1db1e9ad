//! Datastore collaborator contracts.
//!
//! The relational schema lives outside this crate; these traits expose
//! only the cluster and environment fields this core reads and writes.
//! Implementations belong to the schema owner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// Cluster registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Active,
    Inactive,
}

/// A registered cluster, read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Unique cluster identifier.
    pub id: String,
    /// Cluster name.
    pub name: String,
    /// Registration status.
    pub status: ClusterStatus,
    /// Encrypted kubeconfig payload. Records predating encryption hold
    /// the plaintext document instead.
    pub kubeconfig: String,
    /// Hosting provider tag.
    pub provider: String,
    /// Region.
    pub region: String,
    /// Node count observed at registration.
    pub node_count: i32,
}

/// Environment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentStatus {
    Creating,
    Running,
    Stopped,
    Error,
    Deleting,
    Terminated,
}

impl std::fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Error => write!(f, "ERROR"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

impl EnvironmentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// CREATING → RUNNING, RUNNING ↔ STOPPED, any non-terminal state →
    /// ERROR, any non-terminal state → DELETING → TERMINATED.
    #[must_use]
    pub fn can_transition_to(self, next: EnvironmentStatus) -> bool {
        use EnvironmentStatus::{Creating, Deleting, Error, Running, Stopped, Terminated};
        match (self, next) {
            (Creating, Running) => true,
            (Running, Stopped) | (Stopped, Running) => true,
            (Deleting, Terminated) => true,
            (from, Deleting | Error) => from != Terminated,
            _ => false,
        }
    }

    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == EnvironmentStatus::Terminated
    }
}

/// Mutable runtime state of a user environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    /// Unique environment identifier.
    pub id: String,
    /// Cluster the environment is scheduled on.
    pub cluster_id: String,
    /// Current lifecycle status.
    pub status: EnvironmentStatus,
    /// Namespace hosting the environment workload, once provisioned.
    pub namespace: Option<String>,
    /// Last recorded failure message.
    pub last_error: Option<String>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Cluster-by-id lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a cluster record by id. `Ok(None)` means no such cluster.
    async fn get_cluster(&self, id: &str) -> Result<Option<ClusterRecord>, OrchestratorError>;
}

/// Environment lookups and status writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Fetch an environment record by id. `Ok(None)` means no such row.
    async fn get_environment(
        &self,
        id: &str,
    ) -> Result<Option<EnvironmentRecord>, OrchestratorError>;

    /// Write the environment's status and last-error fields.
    async fn update_status(
        &self,
        id: &str,
        status: EnvironmentStatus,
        last_error: Option<String>,
    ) -> Result<(), OrchestratorError>;

    /// Record the namespace the environment was provisioned into.
    async fn set_namespace(&self, id: &str, namespace: &str) -> Result<(), OrchestratorError>;
}
