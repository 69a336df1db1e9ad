//! Environment lifecycle orchestration.
//!
//! Drives create/start/stop/delete/inspect/logs/exec against the
//! environment's cluster, composing the connection manager and retry
//! policy, and keeping the environment row's status current.
//!
//! Mutating operations always fail loudly on unrecoverable errors,
//! after a best-effort ERROR status write. Read-only probes
//! ([`get_environment_info`](EnvironmentOrchestrator::get_environment_info),
//! [`get_environment_logs`](EnvironmentOrchestrator::get_environment_logs))
//! never fail: they degrade to a safe default and log the real cause.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::api::{
    AttachParams, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams,
};
use kube::Api;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::connection::ClusterConnectionManager;
use crate::error::{classify_kube_error, OrchestratorError};
use crate::retry::{RetryContext, RetryPolicy};
use crate::store::{EnvironmentRecord, EnvironmentStatus, EnvironmentStore};
use crate::workload::{
    build_deployment, build_namespace, build_service, namespace_name, EnvironmentSpec,
    ENVIRONMENT_LABEL, WORKLOAD_NAME,
};

/// Snapshot of an environment, for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentInfo {
    /// Environment identifier.
    pub environment_id: String,
    /// Lifecycle status from the datastore.
    pub status: EnvironmentStatus,
    /// Hosting namespace, or `"unknown"` on a degraded probe.
    pub namespace: String,
    /// Live ready replica count (best effort, 0 when unreachable).
    pub ready_replicas: i32,
    /// Last recorded failure, if any.
    pub last_error: Option<String>,
}

/// Captured output of a command executed inside an environment.
#[derive(Debug, Clone, Serialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Orchestrates environment lifecycle operations on remote clusters.
pub struct EnvironmentOrchestrator {
    environments: Arc<dyn EnvironmentStore>,
    connections: Arc<ClusterConnectionManager>,
    retry: RetryPolicy,
    config: OrchestratorConfig,
}

impl EnvironmentOrchestrator {
    /// Create an orchestrator from its collaborators and configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(
        environments: Arc<dyn EnvironmentStore>,
        connections: Arc<ClusterConnectionManager>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let retry = RetryPolicy::new(config.retry.clone());
        Ok(Self {
            environments,
            connections,
            retry,
            config,
        })
    }

    /// Provision the cluster-side resources for an existing environment
    /// row and mark it RUNNING.
    ///
    /// The row must already exist; this operation does not create it.
    /// On any failure — including before the first remote call — the
    /// row is best-effort updated to ERROR with the failure message and
    /// the wrapped error is returned.
    ///
    /// # Errors
    /// Returns the classified failure, wrapped with operation context.
    #[instrument(skip(self, spec), fields(environment_id = %spec.environment_id))]
    pub async fn create_environment(&self, spec: &EnvironmentSpec) -> Result<(), OrchestratorError> {
        info!(image = %spec.image, "creating environment");
        match self.try_create(spec).await {
            Ok(()) => {
                info!("environment created");
                Ok(())
            }
            Err(e) => self.fail_operation(&spec.environment_id, "create environment", e).await,
        }
    }

    /// Scale the environment's workspace back up and mark it RUNNING.
    ///
    /// # Errors
    /// Returns a validation error when the lifecycle forbids the
    /// transition, or the classified remote failure.
    #[instrument(skip(self))]
    pub async fn start_environment(&self, environment_id: &str) -> Result<(), OrchestratorError> {
        match self
            .scale_environment(environment_id, 1, EnvironmentStatus::Running)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => self.fail_operation(environment_id, "start environment", e).await,
        }
    }

    /// Scale the environment's workspace to zero and mark it STOPPED.
    ///
    /// # Errors
    /// Returns a validation error when the lifecycle forbids the
    /// transition, or the classified remote failure.
    #[instrument(skip(self))]
    pub async fn stop_environment(&self, environment_id: &str) -> Result<(), OrchestratorError> {
        match self
            .scale_environment(environment_id, 0, EnvironmentStatus::Stopped)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => self.fail_operation(environment_id, "stop environment", e).await,
        }
    }

    /// Tear down the environment's namespace and mark it TERMINATED.
    ///
    /// Deleting an already-terminated environment is a no-op.
    ///
    /// # Errors
    /// Returns the classified failure, wrapped with operation context.
    #[instrument(skip(self))]
    pub async fn delete_environment(&self, environment_id: &str) -> Result<(), OrchestratorError> {
        match self.try_delete(environment_id).await {
            Ok(()) => Ok(()),
            Err(e) => self.fail_operation(environment_id, "delete environment", e).await,
        }
    }

    /// Read-only status probe. Never fails: any internal error is
    /// logged in full and degraded to `{status: ERROR, namespace:
    /// "unknown"}`.
    #[instrument(skip(self))]
    pub async fn get_environment_info(&self, environment_id: &str) -> EnvironmentInfo {
        match self.probe_environment(environment_id).await {
            Ok(info) => info,
            Err(e) => {
                error!(
                    environment_id,
                    error = %e,
                    cause = ?e,
                    "environment info probe failed, returning degraded result"
                );
                EnvironmentInfo {
                    environment_id: environment_id.to_string(),
                    status: EnvironmentStatus::Error,
                    namespace: "unknown".to_string(),
                    ready_replicas: 0,
                    last_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Fetch recent workspace logs. Read-only and fail-soft: failures
    /// are logged and degrade to an empty string.
    #[instrument(skip(self))]
    pub async fn get_environment_logs(&self, environment_id: &str) -> String {
        match self.try_fetch_logs(environment_id).await {
            Ok(logs) => logs,
            Err(e) => {
                error!(
                    environment_id,
                    error = %e,
                    cause = ?e,
                    "log fetch failed, returning empty logs"
                );
                String::new()
            }
        }
    }

    /// Execute a command inside the environment's workspace pod.
    ///
    /// # Errors
    /// Returns a validation error for an empty command, or the
    /// classified remote failure. Does not touch environment status.
    #[instrument(skip(self, command))]
    pub async fn execute_command(
        &self,
        environment_id: &str,
        command: &[String],
    ) -> Result<ExecOutput, OrchestratorError> {
        if command.is_empty() {
            return Err(OrchestratorError::Validation(
                "command must not be empty".to_string(),
            ));
        }
        self.try_exec(environment_id, command)
            .await
            .map_err(|e| OrchestratorError::wrap("execute command", e))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn try_create(&self, spec: &EnvironmentSpec) -> Result<(), OrchestratorError> {
        let environment_id = &spec.environment_id;
        let record = self.load_environment(environment_id).await?;
        self.environments
            .update_status(environment_id, EnvironmentStatus::Creating, None)
            .await?;

        let client = self.connections.get_client(&record.cluster_id).await?;
        let context = retry_context(environment_id, &record.cluster_id);
        let namespace = namespace_name(environment_id);

        let namespaces: Api<Namespace> = Api::all(client.clone());
        self.apply_resource(&namespaces, &build_namespace(spec), "create-namespace", &context)
            .await?;

        let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
        self.apply_resource(&deployments, &build_deployment(spec), "create-workspace", &context)
            .await?;

        let services: Api<Service> = Api::namespaced(client, &namespace);
        self.apply_resource(&services, &build_service(spec), "create-service", &context)
            .await?;

        self.environments
            .set_namespace(environment_id, &namespace)
            .await?;
        self.environments
            .update_status(environment_id, EnvironmentStatus::Running, None)
            .await?;
        Ok(())
    }

    /// Create a resource, treating an existing one as success.
    async fn apply_resource<K>(
        &self,
        api: &Api<K>,
        object: &K,
        what: &'static str,
        context: &RetryContext,
    ) -> Result<(), OrchestratorError>
    where
        K: Clone + std::fmt::Debug + Serialize + serde::de::DeserializeOwned,
    {
        self.retry
            .retry_operation(
                || {
                    let api = api.clone();
                    let object = object.clone();
                    async move {
                        match api.create(&PostParams::default(), &object).await {
                            Ok(_) => Ok(()),
                            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                                debug!(what, "resource already exists, continuing");
                                Ok(())
                            }
                            Err(e) => Err(classify_kube_error(e, what)),
                        }
                    }
                },
                what,
                context,
            )
            .await
    }

    async fn scale_environment(
        &self,
        environment_id: &str,
        replicas: i32,
        target: EnvironmentStatus,
    ) -> Result<(), OrchestratorError> {
        let record = self.load_environment(environment_id).await?;
        if record.status == target {
            debug!(environment_id, status = %target, "environment already in target state");
            return Ok(());
        }
        if !record.status.can_transition_to(target) {
            return Err(OrchestratorError::Validation(format!(
                "cannot move environment {environment_id} from {} to {target}",
                record.status
            )));
        }

        let client = self.connections.get_client(&record.cluster_id).await?;
        let namespace = self.namespace_of(&record);
        let context = retry_context(environment_id, &record.cluster_id);

        let deployments: Api<Deployment> = Api::namespaced(client, &namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        self.retry
            .retry_operation(
                || {
                    let deployments = deployments.clone();
                    let patch = patch.clone();
                    async move {
                        deployments
                            .patch(WORKLOAD_NAME, &PatchParams::default(), &Patch::Merge(&patch))
                            .await
                            .map(|_| ())
                            .map_err(|e| classify_kube_error(e, "scale workspace"))
                    }
                },
                "scale-workspace",
                &context,
            )
            .await?;

        self.environments
            .update_status(environment_id, target, None)
            .await?;
        info!(environment_id, replicas, status = %target, "environment scaled");
        Ok(())
    }

    async fn try_delete(&self, environment_id: &str) -> Result<(), OrchestratorError> {
        let record = self.load_environment(environment_id).await?;
        if record.status == EnvironmentStatus::Terminated {
            debug!(environment_id, "environment already terminated");
            return Ok(());
        }

        self.environments
            .update_status(environment_id, EnvironmentStatus::Deleting, None)
            .await?;

        let client = self.connections.get_client(&record.cluster_id).await?;
        let namespace = self.namespace_of(&record);
        let context = retry_context(environment_id, &record.cluster_id);

        let namespaces: Api<Namespace> = Api::all(client);
        self.retry
            .retry_operation(
                || {
                    let namespaces = namespaces.clone();
                    let namespace = namespace.clone();
                    async move {
                        match namespaces.delete(&namespace, &DeleteParams::default()).await {
                            Ok(_) => Ok(()),
                            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                                debug!(namespace, "namespace already gone");
                                Ok(())
                            }
                            Err(e) => Err(classify_kube_error(e, "delete namespace")),
                        }
                    }
                },
                "delete-namespace",
                &context,
            )
            .await?;

        self.environments
            .update_status(environment_id, EnvironmentStatus::Terminated, None)
            .await?;
        info!(environment_id, "environment terminated");
        Ok(())
    }

    async fn probe_environment(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentInfo, OrchestratorError> {
        let record = self.load_environment(environment_id).await?;
        let namespace = self.namespace_of(&record);
        let ready_replicas = self.ready_replicas(&record, &namespace).await;
        Ok(EnvironmentInfo {
            environment_id: record.id,
            status: record.status,
            namespace,
            ready_replicas,
            last_error: record.last_error,
        })
    }

    /// Live replica count, best effort: an unreachable cluster degrades
    /// the count to zero without failing the probe.
    async fn ready_replicas(&self, record: &EnvironmentRecord, namespace: &str) -> i32 {
        let client = match self.connections.get_client(&record.cluster_id).await {
            Ok(client) => client,
            Err(e) => {
                warn!(environment_id = %record.id, error = %e, "replica probe skipped, cluster unreachable");
                return 0;
            }
        };

        let deployments: Api<Deployment> = Api::namespaced(client, namespace);
        match deployments.get_opt(WORKLOAD_NAME).await {
            Ok(Some(deployment)) => deployment
                .status
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!(environment_id = %record.id, error = %e, "replica probe failed");
                0
            }
        }
    }

    async fn try_fetch_logs(&self, environment_id: &str) -> Result<String, OrchestratorError> {
        let record = self.load_environment(environment_id).await?;
        let client = self.connections.get_client(&record.cluster_id).await?;
        let namespace = self.namespace_of(&record);
        let context = retry_context(environment_id, &record.cluster_id);

        let pods: Api<Pod> = Api::namespaced(client, &namespace);
        let pod_name = self.find_workload_pod(&pods, environment_id, &context).await?;
        let tail_lines = self.config.log_tail_lines;

        self.retry
            .retry_operation(
                || {
                    let pods = pods.clone();
                    let pod_name = pod_name.clone();
                    async move {
                        let params = LogParams {
                            tail_lines: Some(tail_lines),
                            ..LogParams::default()
                        };
                        pods.logs(&pod_name, &params)
                            .await
                            .map_err(|e| classify_kube_error(e, "fetch logs"))
                    }
                },
                "fetch-logs",
                &context,
            )
            .await
    }

    async fn try_exec(
        &self,
        environment_id: &str,
        command: &[String],
    ) -> Result<ExecOutput, OrchestratorError> {
        let record = self.load_environment(environment_id).await?;
        let client = self.connections.get_client(&record.cluster_id).await?;
        let namespace = self.namespace_of(&record);
        let context = retry_context(environment_id, &record.cluster_id);

        let pods: Api<Pod> = Api::namespaced(client, &namespace);
        let pod_name = self.find_workload_pod(&pods, environment_id, &context).await?;
        let timeout = Duration::from_secs(self.config.exec_timeout_secs);

        self.retry
            .retry_operation(
                || {
                    let pods = pods.clone();
                    let pod_name = pod_name.clone();
                    let command = command.to_vec();
                    async move {
                        match tokio::time::timeout(timeout, run_exec(&pods, &pod_name, command))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(OrchestratorError::TransientNetwork(format!(
                                "exec timed out after {}s",
                                timeout.as_secs()
                            ))),
                        }
                    }
                },
                "exec-command",
                &context,
            )
            .await
    }

    /// Find the environment's workspace pod, preferring a running one.
    async fn find_workload_pod(
        &self,
        pods: &Api<Pod>,
        environment_id: &str,
        context: &RetryContext,
    ) -> Result<String, OrchestratorError> {
        let selector = format!("{ENVIRONMENT_LABEL}={environment_id}");
        let list = self
            .retry
            .retry_operation(
                || {
                    let pods = pods.clone();
                    let selector = selector.clone();
                    async move {
                        pods.list(&ListParams::default().labels(&selector))
                            .await
                            .map_err(|e| classify_kube_error(e, "list workspace pods"))
                    }
                },
                "list-pods",
                context,
            )
            .await?;

        let running = list
            .items
            .iter()
            .find(|p| p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running"));

        running
            .or_else(|| list.items.first())
            .and_then(|p| p.metadata.name.clone())
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!(
                    "no workspace pod for environment {environment_id}"
                ))
            })
    }

    /// Best-effort ERROR write plus wrapping, shared by all mutating
    /// operations. Validation rejections are returned as-is without
    /// touching the row.
    async fn fail_operation<T>(
        &self,
        environment_id: &str,
        op: &str,
        cause: OrchestratorError,
    ) -> Result<T, OrchestratorError> {
        if !matches!(cause, OrchestratorError::Validation(_)) {
            self.record_failure(environment_id, &cause).await;
        }
        Err(OrchestratorError::wrap(op, cause))
    }

    async fn record_failure(&self, environment_id: &str, cause: &OrchestratorError) {
        warn!(environment_id, error = %cause, "recording environment failure");
        if let Err(status_err) = self
            .environments
            .update_status(
                environment_id,
                EnvironmentStatus::Error,
                Some(cause.to_string()),
            )
            .await
        {
            // A failing status write must not mask the original error.
            error!(
                environment_id,
                error = %status_err,
                "failed to record ERROR status for environment"
            );
        }
    }

    async fn load_environment(
        &self,
        environment_id: &str,
    ) -> Result<EnvironmentRecord, OrchestratorError> {
        self.environments
            .get_environment(environment_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("environment {environment_id} not found"))
            })
    }

    fn namespace_of(&self, record: &EnvironmentRecord) -> String {
        record
            .namespace
            .clone()
            .unwrap_or_else(|| namespace_name(&record.id))
    }
}

async fn run_exec(
    pods: &Api<Pod>,
    pod_name: &str,
    command: Vec<String>,
) -> Result<ExecOutput, OrchestratorError> {
    let params = AttachParams::default().stdout(true).stderr(true);
    let mut attached = pods
        .exec(pod_name, command, &params)
        .await
        .map_err(|e| classify_kube_error(e, "exec in workspace pod"))?;

    let stdout = read_stream(attached.stdout()).await;
    let stderr = read_stream(attached.stderr()).await;

    attached.join().await.map_err(|e| {
        OrchestratorError::TransientNetwork(format!("exec stream closed abnormally: {e}"))
    })?;

    Ok(ExecOutput { stdout, stderr })
}

async fn read_stream(stream: Option<impl AsyncRead + Unpin>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if stream.read_to_end(&mut buf).await.is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn retry_context(environment_id: &str, cluster_id: &str) -> RetryContext {
    RetryContext::from([
        ("environment_id".to_string(), environment_id.to_string()),
        ("cluster_id".to_string(), cluster_id.to_string()),
    ])
}
