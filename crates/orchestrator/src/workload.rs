//! Kubernetes resource builders for environment workloads.
//!
//! An environment is one namespace holding a single-replica Deployment
//! and a ClusterIP Service. Resource semantics (scheduling, rollout,
//! endpoint management) are delegated entirely to the remote cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Namespace, PodSpec, PodTemplateSpec, ResourceRequirements,
    Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

/// Label carrying the owning environment id.
pub const ENVIRONMENT_LABEL: &str = "skiff.dev/environment";

/// Name of the Deployment and Service inside an environment namespace.
pub const WORKLOAD_NAME: &str = "workspace";

/// Requested shape of an environment workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Environment identifier (row id in the datastore).
    pub environment_id: String,

    /// Container image to run.
    pub image: String,

    /// CPU request/limit in millicores.
    #[serde(default = "default_cpu_millis")]
    pub cpu_millis: u32,

    /// Memory request/limit in MiB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,

    /// Environment variables for the workspace container.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Container ports to expose through the service.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

fn default_cpu_millis() -> u32 {
    500
}

fn default_memory_mb() -> u32 {
    512
}

fn default_ports() -> Vec<u16> {
    vec![8080]
}

/// Namespace name for an environment.
#[must_use]
pub fn namespace_name(environment_id: &str) -> String {
    format!("env-{environment_id}")
}

fn labels(environment_id: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(ENVIRONMENT_LABEL.to_string(), environment_id.to_string());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "skiff".to_string(),
    );
    labels
}

fn resource_quantities(spec: &EnvironmentSpec) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(format!("{}m", spec.cpu_millis))),
        (
            "memory".to_string(),
            Quantity(format!("{}Mi", spec.memory_mb)),
        ),
    ])
}

/// Build the Namespace object for an environment.
#[must_use]
pub fn build_namespace(spec: &EnvironmentSpec) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(namespace_name(&spec.environment_id)),
            labels: Some(labels(&spec.environment_id)),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}

/// Build the single-replica workspace Deployment.
#[must_use]
pub fn build_deployment(spec: &EnvironmentSpec) -> Deployment {
    let labels = labels(&spec.environment_id);
    let quantities = resource_quantities(spec);

    let container = Container {
        name: WORKLOAD_NAME.to_string(),
        image: Some(spec.image.clone()),
        env: Some(
            spec.env
                .iter()
                .map(|(name, value)| EnvVar {
                    name: name.clone(),
                    value: Some(value.clone()),
                    value_from: None,
                })
                .collect(),
        ),
        ports: Some(
            spec.ports
                .iter()
                .map(|port| ContainerPort {
                    container_port: i32::from(*port),
                    ..ContainerPort::default()
                })
                .collect(),
        ),
        resources: Some(ResourceRequirements {
            requests: Some(quantities.clone()),
            limits: Some(quantities),
            ..ResourceRequirements::default()
        }),
        ..Container::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(WORKLOAD_NAME.to_string()),
            namespace: Some(namespace_name(&spec.environment_id)),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// Build the ClusterIP Service fronting the workspace ports.
#[must_use]
pub fn build_service(spec: &EnvironmentSpec) -> Service {
    let labels = labels(&spec.environment_id);

    Service {
        metadata: ObjectMeta {
            name: Some(WORKLOAD_NAME.to_string()),
            namespace: Some(namespace_name(&spec.environment_id)),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels),
            ports: Some(
                spec.ports
                    .iter()
                    .map(|port| ServicePort {
                        name: Some(format!("port-{port}")),
                        port: i32::from(*port),
                        target_port: Some(IntOrString::Int(i32::from(*port))),
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EnvironmentSpec {
        EnvironmentSpec {
            environment_id: "e42".to_string(),
            image: "ghcr.io/skiff-dev/workspace:1.4".to_string(),
            cpu_millis: 250,
            memory_mb: 256,
            env: BTreeMap::from([("EDITOR".to_string(), "vim".to_string())]),
            ports: vec![8080, 2222],
        }
    }

    #[test]
    fn test_namespace_naming_and_labels() {
        let ns = build_namespace(&spec());
        assert_eq!(ns.metadata.name.as_deref(), Some("env-e42"));
        let labels = ns.metadata.labels.unwrap();
        assert_eq!(labels.get(ENVIRONMENT_LABEL).unwrap(), "e42");
    }

    #[test]
    fn test_deployment_shape() {
        let deployment = build_deployment(&spec());
        assert_eq!(deployment.metadata.name.as_deref(), Some(WORKLOAD_NAME));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("env-e42"));

        let dspec = deployment.spec.unwrap();
        assert_eq!(dspec.replicas, Some(1));
        assert_eq!(
            dspec
                .selector
                .match_labels
                .as_ref()
                .unwrap()
                .get(ENVIRONMENT_LABEL)
                .unwrap(),
            "e42"
        );

        let container = &dspec.template.spec.unwrap().containers[0];
        assert_eq!(container.image.as_deref(), Some("ghcr.io/skiff-dev/workspace:1.4"));
        let resources = container.resources.as_ref().unwrap();
        assert_eq!(
            resources.limits.as_ref().unwrap().get("cpu").unwrap().0,
            "250m"
        );
        assert_eq!(
            resources.requests.as_ref().unwrap().get("memory").unwrap().0,
            "256Mi"
        );
        assert_eq!(container.ports.as_ref().unwrap().len(), 2);
        assert_eq!(container.env.as_ref().unwrap()[0].name, "EDITOR");
    }

    #[test]
    fn test_service_ports_mirror_spec() {
        let service = build_service(&spec());
        let sspec = service.spec.unwrap();
        assert_eq!(sspec.type_.as_deref(), Some("ClusterIP"));
        let ports = sspec.ports.unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 8080);
        assert_eq!(ports[1].target_port, Some(IntOrString::Int(2222)));
    }

    #[test]
    fn test_spec_defaults() {
        let spec: EnvironmentSpec = serde_json::from_str(
            r#"{"environment_id": "e1", "image": "busybox"}"#,
        )
        .unwrap();
        assert_eq!(spec.cpu_millis, 500);
        assert_eq!(spec.memory_mb, 512);
        assert_eq!(spec.ports, vec![8080]);
        assert!(spec.env.is_empty());
    }
}
