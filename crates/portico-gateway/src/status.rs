//! Status aggregation
//!
//! Pure: the status is derived from the spec, the observed workload and the
//! observed replicas. The caller writes it only when it differs from what is
//! stored, so an unchanged cluster produces no status writes.

use chrono::SecondsFormat;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use portico_common::crd::{
    GatewayCondition, GatewayPhase, GatewaySpec, GatewayStatus, ReplicaState,
};

/// Compute the gateway status.
///
/// `previous` contributes only the fields other stages own: the recorded
/// commit and the management leader.
pub fn aggregate(
    spec: &GatewaySpec,
    generation: Option<i64>,
    previous: &GatewayStatus,
    workload: Option<&Deployment>,
    pods: &[Pod],
) -> GatewayStatus {
    let workload_status = workload.and_then(|d| d.status.as_ref());
    let replicas = workload_status.and_then(|s| s.replicas).unwrap_or(0);
    let ready = workload_status.and_then(|s| s.ready_replicas).unwrap_or(0);

    let mut gateway: Vec<ReplicaState> = pods
        .iter()
        .map(|pod| replica_state(pod, &spec.app.image))
        .collect();
    gateway.sort_by(|a, b| a.name.cmp(&b.name));

    let conditions = workload_status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| GatewayCondition {
                    type_: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: c
                        .last_transition_time
                        .as_ref()
                        .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true)),
                })
                .collect()
        })
        .unwrap_or_default();

    GatewayStatus {
        host: Some(spec.app.management.cluster.hostname.clone()).filter(|h| !h.is_empty()),
        image: Some(spec.app.image.clone()),
        version: spec.version.clone(),
        replicas,
        ready,
        state: phase(replicas, ready),
        gateway,
        conditions,
        commit_id: previous.commit_id.clone(),
        management_pod: previous.management_pod.clone(),
        observed_generation: generation,
    }
}

/// Ready iff every replica is ready and there is at least one
pub fn phase(replicas: i32, ready: i32) -> GatewayPhase {
    if replicas > 0 && ready == replicas {
        GatewayPhase::Ready
    } else {
        GatewayPhase::Initializing
    }
}

/// A replica is ready when a container running the gateway image reports
/// ready. Sidecars do not count.
fn replica_state(pod: &Pod, image: &str) -> ReplicaState {
    let status = pod.status.as_ref();
    let ready = status
        .and_then(|s| s.container_statuses.as_ref())
        .is_some_and(|containers| containers.iter().any(|c| c.image == image && c.ready));

    ReplicaState {
        name: pod.name_any(),
        phase: status.and_then(|s| s.phase.clone()),
        ready,
        start_time: status
            .and_then(|s| s.start_time.as_ref())
            .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}
