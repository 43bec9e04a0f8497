//! Shared fixtures and an in-memory cluster for tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::autoscaling::v2::{
    HPAScalingPolicy, MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;

use portico_common::crd::{
    App, Gateway, GatewayPort, GatewayService, GatewaySpec, GatewayStatus, License, Management,
    ManagementCluster,
};
use portico_common::kube_utils::{default_labels, status_patch};
use portico_common::Error;

use crate::client::GatewayKubeClient;
use crate::object::{ManagedObject, ObjectKind};

pub(crate) const IMAGE: &str = "caapim/gateway:11.0.00";
pub(crate) const SIDECAR_IMAGE: &str = "otel/collector:0.98";

fn started() -> Time {
    Time(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

/// Gateway `apps/edge`: two replicas behind a LoadBalancer, generated
/// management secret, no optional features.
pub(crate) fn gateway() -> Gateway {
    let mut gw = Gateway::new(
        "edge",
        GatewaySpec {
            license: License {
                accept: "true".to_string(),
                secret_name: "gateway-license".to_string(),
            },
            version: Some("11.0.00".to_string()),
            app: App {
                image: IMAGE.to_string(),
                replicas: 2,
                management: Management {
                    username: "admin".to_string(),
                    password: "admin-pass".to_string(),
                    cluster: ManagementCluster {
                        password: "cluster-pass".to_string(),
                        hostname: "edge.example.com".to_string(),
                    },
                    ..Default::default()
                },
                service: GatewayService {
                    enabled: true,
                    type_: Some("LoadBalancer".to_string()),
                    annotations: BTreeMap::new(),
                    ports: vec![
                        GatewayPort {
                            name: "https".to_string(),
                            port: 8443,
                            target_port: Some(8443),
                            protocol: None,
                        },
                        GatewayPort {
                            name: "management".to_string(),
                            port: 9443,
                            target_port: Some(9443),
                            protocol: None,
                        },
                    ],
                },
                ..Default::default()
            },
        },
    );
    gw.metadata.namespace = Some("apps".to_string());
    gw.metadata.uid = Some("uid-edge".to_string());
    gw.metadata.generation = Some(1);
    gw.metadata.resource_version = Some("1".to_string());
    gw
}

/// A gateway replica carrying the workload labels, with a gateway
/// container and a sidecar.
pub(crate) fn pod(name: &str, gateway_ready: bool, sidecar_ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("apps".to_string()),
            labels: Some(default_labels("edge")),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            start_time: Some(started()),
            container_statuses: Some(vec![
                ContainerStatus {
                    name: "gateway".to_string(),
                    image: IMAGE.to_string(),
                    ready: gateway_ready,
                    ..Default::default()
                },
                ContainerStatus {
                    name: "otel".to_string(),
                    image: SIDECAR_IMAGE.to_string(),
                    ready: sidecar_ready,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
    }
}

/// The workload as the deployment controller reports it
pub(crate) fn workload_with_status(replicas: i32, ready: i32) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some("edge".to_string()),
            namespace: Some("apps".to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(deployment_status(replicas, ready)),
    }
}

fn deployment_status(replicas: i32, ready: i32) -> DeploymentStatus {
    DeploymentStatus {
        replicas: Some(replicas),
        ready_replicas: Some(ready),
        conditions: Some(vec![DeploymentCondition {
            type_: "Available".to_string(),
            status: if replicas > 0 && ready == replicas { "True" } else { "False" }.to_string(),
            reason: Some("MinimumReplicasAvailable".to_string()),
            last_transition_time: Some(started()),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

// =============================================================================
// In-memory cluster
// =============================================================================

type Key = (ObjectKind, String, String);

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<Key, ManagedObject>,
    pods: Vec<Pod>,
    status: Option<GatewayStatus>,
    writes: Vec<String>,
    version: u64,
    /// Successful status writes left before one is rejected
    status_failure: Option<usize>,
}

impl ClusterState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// A namespaced object store with resourceVersion checks on replace.
///
/// Writes are defaulted the way the API server does for the kinds that
/// have server defaults, and status patches are applied with JSON merge
/// patch semantics. Every write is recorded as `"<verb> <Kind>/<name>"` so
/// tests can assert exactly which calls a pass made.
#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<ClusterState>,
}

fn conflict(message: &str) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}

fn key(object: &ManagedObject) -> Result<Key, Error> {
    Ok((
        object.kind(),
        object.namespace()?.to_string(),
        object.name()?.to_string(),
    ))
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A cluster holding the license secret the fixture gateway names
    pub(crate) fn with_license() -> Self {
        let cluster = Self::new();
        cluster.seed(ManagedObject::Secret(Secret {
            metadata: ObjectMeta {
                name: Some("gateway-license".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }));
        cluster
    }

    /// Store an object without recording a write
    pub(crate) fn seed(&self, mut object: ManagedObject) {
        let mut state = self.state.lock().expect("mutex should not be poisoned");
        let version = state.next_version();
        object.meta_mut().resource_version = Some(version);
        let key = key(&object).expect("seeded object has name and namespace");
        state.objects.insert(key, object);
    }

    pub(crate) fn object(&self, kind: ObjectKind, name: &str) -> Option<ManagedObject> {
        let state = self.state.lock().expect("mutex should not be poisoned");
        state
            .objects
            .get(&(kind, "apps".to_string(), name.to_string()))
            .cloned()
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("mutex should not be poisoned")
            .writes
            .clone()
    }

    pub(crate) fn clear_writes(&self) {
        self.state
            .lock()
            .expect("mutex should not be poisoned")
            .writes
            .clear();
    }

    /// Reject the status write that follows `successes` accepted ones,
    /// then accept again
    pub(crate) fn fail_status_write_after(&self, successes: usize) {
        self.state
            .lock()
            .expect("mutex should not be poisoned")
            .status_failure = Some(successes);
    }

    pub(crate) fn status(&self) -> Option<GatewayStatus> {
        self.state
            .lock()
            .expect("mutex should not be poisoned")
            .status
            .clone()
    }

    /// Play the deployment controller: report replica counts on the
    /// stored workload.
    pub(crate) fn report_workload(&self, replicas: i32, ready: i32) {
        let mut state = self.state.lock().expect("mutex should not be poisoned");
        let key = (ObjectKind::Workload, "apps".to_string(), "edge".to_string());
        if let Some(ManagedObject::Workload(d)) = state.objects.get_mut(&key) {
            d.status = Some(deployment_status(replicas, ready));
        }
    }

    pub(crate) fn set_pods(&self, pods: Vec<Pod>) {
        self.state.lock().expect("mutex should not be poisoned").pods = pods;
    }

    pub(crate) fn pods(&self) -> Vec<Pod> {
        self.state
            .lock()
            .expect("mutex should not be poisoned")
            .pods
            .clone()
    }

    /// Names of pods carrying `key=value`
    pub(crate) fn pods_labelled(&self, key: &str, value: &str) -> Vec<String> {
        self.pods()
            .iter()
            .filter(|p| p.labels().get(key).map(String::as_str) == Some(value))
            .map(|p| p.name_any())
            .collect()
    }
}

fn scaling_policy(type_: &str, value: i32) -> HPAScalingPolicy {
    HPAScalingPolicy {
        type_: type_.to_string(),
        value,
        period_seconds: 15,
    }
}

/// The object as the API server stores it after defaulting
pub(crate) fn server_defaulted(object: &ManagedObject) -> ManagedObject {
    let mut stored = object.clone();
    match &mut stored {
        ManagedObject::Autoscaler(hpa) => {
            if let Some(spec) = hpa.spec.as_mut() {
                spec.min_replicas.get_or_insert(1);
                if spec.metrics.as_ref().map_or(true, Vec::is_empty) {
                    spec.metrics = Some(vec![MetricSpec {
                        type_: "Resource".to_string(),
                        resource: Some(ResourceMetricSource {
                            name: "cpu".to_string(),
                            target: MetricTarget {
                                type_: "Utilization".to_string(),
                                average_utilization: Some(80),
                                ..Default::default()
                            },
                        }),
                        ..Default::default()
                    }]);
                }
                if let Some(behavior) = spec.behavior.as_mut() {
                    let up = behavior.scale_up.get_or_insert_with(Default::default);
                    up.select_policy.get_or_insert_with(|| "Max".to_string());
                    up.stabilization_window_seconds.get_or_insert(0);
                    up.policies.get_or_insert_with(|| {
                        vec![scaling_policy("Pods", 4), scaling_policy("Percent", 100)]
                    });
                    let down = behavior.scale_down.get_or_insert_with(Default::default);
                    down.select_policy.get_or_insert_with(|| "Max".to_string());
                    down.policies.get_or_insert_with(|| vec![scaling_policy("Percent", 100)]);
                }
            }
        }
        ManagedObject::Ingress(ingress) => {
            // empty lists do not survive a round trip
            if let Some(spec) = ingress.spec.as_mut() {
                if spec.rules.as_ref().is_some_and(Vec::is_empty) {
                    spec.rules = None;
                }
                if spec.tls.as_ref().is_some_and(Vec::is_empty) {
                    spec.tls = None;
                }
            }
        }
        _ => {}
    }
    stored
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => pod.labels().get(k).map(String::as_str) == Some(v),
            None => false,
        })
}

#[async_trait]
impl GatewayKubeClient for FakeCluster {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error> {
        let state = self.state.lock().expect("mutex should not be poisoned");
        Ok(state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = key(object)?;
        let mut state = self.state.lock().expect("mutex should not be poisoned");
        if state.objects.contains_key(&key) {
            return Err(conflict("already exists"));
        }
        let mut stored = server_defaulted(object);
        let version = state.next_version();
        stored.meta_mut().resource_version = Some(version);
        state.writes.push(format!("create {}/{}", key.0, key.2));
        state.objects.insert(key, stored);
        Ok(())
    }

    async fn replace(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = key(object)?;
        let mut state = self.state.lock().expect("mutex should not be poisoned");
        let current = state
            .objects
            .get(&key)
            .and_then(|o| o.meta().resource_version.clone());
        if current.is_none() || current != object.meta().resource_version {
            return Err(conflict("the object has been modified"));
        }
        let mut stored = server_defaulted(object);
        let version = state.next_version();
        stored.meta_mut().resource_version = Some(version);
        state.writes.push(format!("replace {}/{}", key.0, key.2));
        state.objects.insert(key, stored);
        Ok(())
    }

    async fn list_pods(&self, _namespace: &str, selector: &str) -> Result<Vec<Pod>, Error> {
        let state = self.state.lock().expect("mutex should not be poisoned");
        Ok(state
            .pods
            .iter()
            .filter(|p| matches_selector(p, selector))
            .cloned()
            .collect())
    }

    async fn patch_pod_labels(
        &self,
        _namespace: &str,
        name: &str,
        labels: &BTreeMap<String, Option<String>>,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().expect("mutex should not be poisoned");
        let pod = state
            .pods
            .iter_mut()
            .find(|p| p.name_any() == name)
            .ok_or_else(|| Error::internal_with_context("fake", format!("no pod {name}")))?;
        for (k, v) in labels {
            match v {
                Some(v) => {
                    pod.labels_mut().insert(k.clone(), v.clone());
                }
                None => {
                    pod.labels_mut().remove(k);
                }
            }
        }
        state.writes.push(format!("label Pod/{name}"));
        Ok(())
    }

    async fn patch_status(
        &self,
        gateway: &Gateway,
        status: &GatewayStatus,
    ) -> Result<Gateway, Error> {
        let mut state = self.state.lock().expect("mutex should not be poisoned");
        match state.status_failure {
            Some(0) => {
                state.status_failure = None;
                return Err(conflict("the object has been modified"));
            }
            Some(n) => state.status_failure = Some(n - 1),
            None => {}
        }

        let patch = status_patch(gateway, status)?;
        let mut stored = serde_json::to_value(&state.status)
            .map_err(|e| Error::internal_with_context("fake", e.to_string()))?;
        json_patch::merge(&mut stored, &patch["status"]);
        let merged: GatewayStatus = serde_json::from_value(stored)
            .map_err(|e| Error::internal_with_context("fake", e.to_string()))?;

        let mut updated = gateway.clone();
        updated.status = Some(merged.clone());
        updated.metadata.resource_version = Some(state.next_version());
        state.status = Some(merged);
        state.writes.push(format!("status Gateway/{}", gateway.name_any()));
        Ok(updated)
    }
}
