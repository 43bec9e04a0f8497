//! Create-or-update of a single sub-object
//!
//! The desired object is never written over the observed one wholesale.
//! Only the fields the operator controls are copied onto the observed
//! object; everything the API server or other controllers set (cluster IP,
//! node ports, server-side defaults, extra annotations) is kept. The merged
//! object is written back only when it differs from what was observed, so
//! a converged cluster sees no writes.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use portico_bundle::{equivalent, BUNDLE_KEY_SUFFIX};
use portico_common::Error;

use crate::client::GatewayKubeClient;
use crate::object::ManagedObject;

/// What converging one object did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// The object did not exist and was created
    Created,
    /// Controlled fields had drifted and were written back
    Updated,
    /// Nothing to do
    Unchanged,
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convergence::Created => write!(f, "created"),
            Convergence::Updated => write!(f, "updated"),
            Convergence::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Bring one sub-object to its desired state.
///
/// Fetch failures and write failures (including conflicts) are returned
/// unchanged; the pass is aborted and retried.
pub async fn converge(
    kube: &dyn GatewayKubeClient,
    desired: &ManagedObject,
) -> Result<Convergence, Error> {
    let namespace = desired.namespace()?;
    let name = desired.name()?;

    let Some(observed) = kube.get(desired.kind(), namespace, name).await? else {
        kube.create(desired).await?;
        return Ok(Convergence::Created);
    };

    let merged = merge_controlled(&observed, desired)?;
    if merged == observed {
        return Ok(Convergence::Unchanged);
    }

    debug!(kind = %desired.kind(), name, "controlled fields drifted");
    kube.replace(&merged).await?;
    Ok(Convergence::Updated)
}

/// Copy the controlled fields of `desired` onto a clone of `observed`.
pub fn merge_controlled(
    observed: &ManagedObject,
    desired: &ManagedObject,
) -> Result<ManagedObject, Error> {
    let mut merged = observed.clone();
    merge_metadata(merged.meta_mut(), desired.meta());

    match (&mut merged, desired) {
        (ManagedObject::ConfigMap(m), ManagedObject::ConfigMap(d)) => merge_config_map(m, d),
        (ManagedObject::Secret(m), ManagedObject::Secret(d)) => {
            m.data = d.data.clone();
            m.string_data = None;
            if d.type_.is_some() {
                m.type_ = d.type_.clone();
            }
        }
        (ManagedObject::Service(m), ManagedObject::Service(d)) => merge_service(m, d),
        (ManagedObject::Ingress(m), ManagedObject::Ingress(d)) => m.spec = d.spec.clone(),
        (ManagedObject::Autoscaler(m), ManagedObject::Autoscaler(d)) => m.spec = d.spec.clone(),
        (ManagedObject::Workload(m), ManagedObject::Workload(d)) => merge_workload(m, d),
        _ => {
            return Err(Error::internal_with_context(
                "converge",
                format!(
                    "observed {} cannot be merged with desired {}",
                    observed.kind(),
                    desired.kind()
                ),
            ))
        }
    }

    Ok(merged)
}

/// Our labels and annotations win; foreign ones stay. The owner reference
/// is added if missing.
fn merge_metadata(observed: &mut ObjectMeta, desired: &ObjectMeta) {
    insert_all(&mut observed.labels, desired.labels.as_ref());
    insert_all(&mut observed.annotations, desired.annotations.as_ref());

    for owner in desired.owner_references.iter().flatten() {
        let owners = observed.owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|o| o.uid == owner.uid) {
            owners.push(owner.clone());
        }
    }
}

fn insert_all(target: &mut Option<BTreeMap<String, String>>, source: Option<&BTreeMap<String, String>>) {
    let Some(source) = source.filter(|s| !s.is_empty()) else {
        return;
    };
    let target = target.get_or_insert_with(BTreeMap::new);
    for (k, v) in source {
        target.insert(k.clone(), v.clone());
    }
}

/// Data is replaced, except that a bundle differing only in its generated
/// identifiers keeps the observed text.
fn merge_config_map(observed: &mut ConfigMap, desired: &ConfigMap) {
    let previous = observed.data.take().unwrap_or_default();
    observed.data = desired.data.as_ref().map(|data| {
        data.iter()
            .map(|(key, value)| {
                let kept = previous
                    .get(key)
                    .filter(|old| key.ends_with(BUNDLE_KEY_SUFFIX) && equivalent(old, value));
                (key.clone(), kept.unwrap_or(value).clone())
            })
            .collect()
    });
}

/// Type, ports and selector are controlled. Allocated node ports carry over
/// so a NodePort or LoadBalancer service keeps its ports.
fn merge_service(observed: &mut Service, desired: &Service) {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return;
    };
    let spec = observed.spec.get_or_insert_with(Default::default);
    let previous_ports = spec.ports.take().unwrap_or_default();

    spec.type_ = desired_spec.type_.clone();
    spec.selector = desired_spec.selector.clone();
    spec.ports = desired_spec.ports.as_ref().map(|ports| {
        ports
            .iter()
            .map(|port| with_allocated_node_port(port, &previous_ports))
            .collect()
    });
}

fn with_allocated_node_port(desired: &ServicePort, observed: &[ServicePort]) -> ServicePort {
    let mut port = desired.clone();
    if port.node_port.is_none() {
        port.node_port = observed
            .iter()
            .find(|o| o.port == desired.port && o.name == desired.name)
            .and_then(|o| o.node_port);
    }
    port
}

/// Replica count (unless autoscaled), selector, strategy and the pod
/// template's labels, annotations and pod-level fields are controlled.
fn merge_workload(observed: &mut Deployment, desired: &Deployment) {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return;
    };
    let spec = observed.spec.get_or_insert_with(Default::default);

    // None means the autoscaler owns the count
    if desired_spec.replicas.is_some() {
        spec.replicas = desired_spec.replicas;
    }
    spec.selector = desired_spec.selector.clone();
    if desired_spec.strategy.is_some() {
        spec.strategy = desired_spec.strategy.clone();
    }

    if let Some(desired_meta) = desired_spec.template.metadata.as_ref() {
        let meta = spec.template.metadata.get_or_insert_with(Default::default);
        insert_all(&mut meta.labels, desired_meta.labels.as_ref());
        insert_all(&mut meta.annotations, desired_meta.annotations.as_ref());
    }

    if let Some(desired_pod) = desired_spec.template.spec.as_ref() {
        let pod = spec.template.spec.get_or_insert_with(Default::default);
        pod.containers = desired_pod.containers.clone();
        pod.init_containers = desired_pod.init_containers.clone();
        pod.volumes = desired_pod.volumes.clone();
        pod.service_account_name = desired_pod.service_account_name.clone();
        pod.image_pull_secrets = desired_pod.image_pull_secrets.clone();
        pod.termination_grace_period_seconds = desired_pod.termination_grace_period_seconds;
        pod.dns_policy = desired_pod.dns_policy.clone();
        pod.restart_policy = desired_pod.restart_policy.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockGatewayKubeClient;
    use crate::compiler::compile;
    use crate::object::ObjectKind;
    use crate::pipeline::Stage;
    use crate::testing::{gateway, server_defaulted};
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::autoscaling::v2::{HPAScalingRules, HorizontalPodAutoscalerBehavior};
    use k8s_openapi::api::core::v1::ServiceSpec;
    use mockall::predicate::eq;
    use portico_bundle::SequentialIds;
    use std::sync::{Arc, Mutex};

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("apps".to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
            ..Default::default()
        }
    }

    fn config_map(data: &[(&str, &str)]) -> ManagedObject {
        ManagedObject::ConfigMap(ConfigMap {
            metadata: meta("edge"),
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    /// Mimic the API server: same object plus server-set metadata
    fn as_stored(object: &ManagedObject) -> ManagedObject {
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some("7".to_string());
        stored.meta_mut().uid = Some("server-uid".to_string());
        stored
    }

    #[tokio::test]
    async fn story_missing_object_is_created() {
        let desired = config_map(&[("A", "1")]);
        let mut kube = MockGatewayKubeClient::new();
        kube.expect_get()
            .with(eq(ObjectKind::ConfigMap), eq("apps"), eq("edge"))
            .returning(|_, _, _| Ok(None));
        kube.expect_create().times(1).returning(|_| Ok(()));
        kube.expect_replace().never();

        assert_eq!(converge(&kube, &desired).await.unwrap(), Convergence::Created);
    }

    /// Story: a second pass against an unchanged cluster performs no writes
    #[tokio::test]
    async fn story_converged_object_is_left_alone() {
        let desired = config_map(&[("A", "1")]);
        let stored = as_stored(&desired);
        let mut kube = MockGatewayKubeClient::new();
        kube.expect_get()
            .returning(move |_, _, _| Ok(Some(stored.clone())));
        kube.expect_create().never();
        kube.expect_replace().never();

        assert_eq!(converge(&kube, &desired).await.unwrap(), Convergence::Unchanged);
    }

    #[tokio::test]
    async fn story_drifted_object_is_replaced_at_observed_version() {
        let desired = config_map(&[("A", "2")]);
        let stored = as_stored(&config_map(&[("A", "1")]));
        let replaced = Arc::new(Mutex::new(Vec::new()));

        let mut kube = MockGatewayKubeClient::new();
        kube.expect_get()
            .returning(move |_, _, _| Ok(Some(stored.clone())));
        let capture = replaced.clone();
        kube.expect_replace().times(1).returning(move |o| {
            capture.lock().expect("mutex should not be poisoned").push(o.clone());
            Ok(())
        });

        assert_eq!(converge(&kube, &desired).await.unwrap(), Convergence::Updated);

        let replaced = replaced.lock().expect("mutex should not be poisoned");
        let ManagedObject::ConfigMap(cm) = &replaced[0] else {
            panic!("expected config map");
        };
        assert_eq!(cm.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(cm.data.as_ref().map(|d| d["A"].as_str()), Some("2"));
    }

    #[tokio::test]
    async fn story_conflicting_write_fails_the_pass() {
        let desired = config_map(&[("A", "2")]);
        let stored = as_stored(&config_map(&[("A", "1")]));
        let mut kube = MockGatewayKubeClient::new();
        kube.expect_get()
            .returning(move |_, _, _| Ok(Some(stored.clone())));
        kube.expect_replace().returning(|_| {
            Err(Error::from(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "the object has been modified".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            })))
        });

        let err = converge(&kube, &desired).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn bundle_with_new_identifiers_keeps_observed_text() {
        let old = r#"<l7:Bundle><l7:Item><l7:Id>aaa</l7:Id></l7:Item></l7:Bundle>"#;
        let new = r#"<l7:Bundle><l7:Item><l7:Id>bbb</l7:Id></l7:Item></l7:Bundle>"#;
        let observed = as_stored(&config_map(&[("cwp.bundle", old)]));
        let desired = config_map(&[("cwp.bundle", new)]);

        let merged = merge_controlled(&observed, &desired).unwrap();
        assert_eq!(merged, observed);
    }

    #[test]
    fn bundle_with_changed_content_is_replaced() {
        let old = r#"<l7:Bundle><l7:Value>1</l7:Value></l7:Bundle>"#;
        let new = r#"<l7:Bundle><l7:Value>2</l7:Value></l7:Bundle>"#;
        let observed = as_stored(&config_map(&[("cwp.bundle", old)]));
        let desired = config_map(&[("cwp.bundle", new)]);

        let ManagedObject::ConfigMap(merged) = merge_controlled(&observed, &desired).unwrap() else {
            panic!("expected config map");
        };
        assert_eq!(merged.data.unwrap()["cwp.bundle"], new);
    }

    #[test]
    fn foreign_labels_and_annotations_survive() {
        let mut observed = as_stored(&config_map(&[("A", "1")]));
        observed
            .meta_mut()
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert("team".to_string(), "payments".to_string());
        observed.meta_mut().annotations = Some(BTreeMap::from([(
            "kubectl.kubernetes.io/last-applied-configuration".to_string(),
            "{}".to_string(),
        )]));

        let merged = merge_controlled(&observed, &config_map(&[("A", "1")])).unwrap();
        assert_eq!(merged, observed);
    }

    #[test]
    fn service_keeps_cluster_ip_and_node_ports() {
        let port = ServicePort {
            name: Some("https".to_string()),
            port: 8443,
            ..Default::default()
        };
        let desired = ManagedObject::Service(Service {
            metadata: meta("edge"),
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                ports: Some(vec![port.clone()]),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut observed = as_stored(&desired);
        if let ManagedObject::Service(svc) = &mut observed {
            let spec = svc.spec.as_mut().unwrap();
            spec.cluster_ip = Some("10.0.0.12".to_string());
            spec.ports.as_mut().unwrap()[0].node_port = Some(31443);
        }

        let merged = merge_controlled(&observed, &desired).unwrap();
        assert_eq!(merged, observed);
    }

    #[test]
    fn autoscaled_workload_keeps_observed_replicas() {
        let desired = ManagedObject::Workload(Deployment {
            metadata: meta("edge"),
            spec: Some(DeploymentSpec {
                replicas: None,
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut observed = as_stored(&desired);
        if let ManagedObject::Workload(d) = &mut observed {
            d.spec.as_mut().unwrap().replicas = Some(5);
        }

        let merged = merge_controlled(&observed, &desired).unwrap();
        let ManagedObject::Workload(d) = merged else {
            panic!("expected workload");
        };
        assert_eq!(d.spec.unwrap().replicas, Some(5));
    }

    #[test]
    fn fixed_workload_replicas_are_enforced() {
        let desired = ManagedObject::Workload(Deployment {
            metadata: meta("edge"),
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut observed = as_stored(&desired);
        if let ManagedObject::Workload(d) = &mut observed {
            d.spec.as_mut().unwrap().replicas = Some(5);
        }

        let ManagedObject::Workload(d) = merge_controlled(&observed, &desired).unwrap() else {
            panic!("expected workload");
        };
        assert_eq!(d.spec.unwrap().replicas, Some(2));
    }

    #[test]
    fn server_defaults_are_not_drift() {
        let mut gw = gateway();
        gw.spec.app.ingress.enabled = true;
        gw.spec.app.autoscaling.enabled = true;
        gw.spec.app.autoscaling.hpa.max_replicas = 4;
        gw.spec.app.autoscaling.hpa.behavior = Some(HorizontalPodAutoscalerBehavior {
            scale_down: Some(HPAScalingRules {
                stabilization_window_seconds: Some(600),
                ..Default::default()
            }),
            scale_up: None,
        });

        let compiled = compile(&gw, &SequentialIds::default()).expect("compile");
        for stage in [Stage::Ingress, Stage::Autoscaler] {
            for desired in compiled.objects(stage) {
                let observed = as_stored(&server_defaulted(&desired));
                let merged = merge_controlled(&observed, &desired).unwrap();
                assert_eq!(merged, observed, "{stage} drifted against server defaults");
            }
        }
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let desired = config_map(&[]);
        let observed = ManagedObject::Secret(Default::default());
        assert!(merge_controlled(&observed, &desired).is_err());
    }
}
