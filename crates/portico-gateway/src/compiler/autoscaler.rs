//! Horizontal pod autoscaler

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerBehavior, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use kube::ResourceExt;

use portico_common::crd::Gateway;
use portico_common::kube_utils::owned_meta;
use portico_common::Error;

/// Minimum replica count the API server assumes when none is given
pub const DEFAULT_MIN_REPLICAS: i32 = 1;

/// CPU utilization target the API server assumes when no metric is given
pub const DEFAULT_CPU_UTILIZATION: i32 = 80;

const SCALING_PERIOD_SECONDS: i32 = 15;

/// Autoscaler `<gw>` scaling the workload of the same name.
///
/// While it exists the workload's replica count belongs to the autoscaler.
/// Fields the autoscaling/v2 API server defaults are filled here so the
/// stored object compares equal on the next pass.
pub fn compile_autoscaler(gateway: &Gateway) -> Result<HorizontalPodAutoscaler, Error> {
    let name = gateway.name_any();
    let hpa = &gateway.spec.app.autoscaling.hpa;

    let metrics = if hpa.metrics.is_empty() {
        vec![default_cpu_metric()]
    } else {
        hpa.metrics.clone()
    };

    Ok(HorizontalPodAutoscaler {
        metadata: owned_meta(gateway, name.clone())?,
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name,
            },
            min_replicas: Some(hpa.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS)),
            max_replicas: hpa.max_replicas,
            behavior: hpa.behavior.clone().map(with_default_rules),
            metrics: Some(metrics),
        }),
        ..Default::default()
    })
}

fn default_cpu_metric() -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: "cpu".to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(DEFAULT_CPU_UTILIZATION),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

/// A given behavior has both directions completed by the API server; unset
/// parts of each direction take the server's rules.
fn with_default_rules(
    mut behavior: HorizontalPodAutoscalerBehavior,
) -> HorizontalPodAutoscalerBehavior {
    behavior.scale_up = Some(fill_rules(behavior.scale_up.take(), scale_up_rules()));
    behavior.scale_down = Some(fill_rules(behavior.scale_down.take(), scale_down_rules()));
    behavior
}

fn fill_rules(given: Option<HPAScalingRules>, defaults: HPAScalingRules) -> HPAScalingRules {
    let Some(mut rules) = given else {
        return defaults;
    };
    if rules.policies.is_none() {
        rules.policies = defaults.policies;
    }
    if rules.select_policy.is_none() {
        rules.select_policy = defaults.select_policy;
    }
    if rules.stabilization_window_seconds.is_none() {
        rules.stabilization_window_seconds = defaults.stabilization_window_seconds;
    }
    rules
}

fn policy(type_: &str, value: i32) -> HPAScalingPolicy {
    HPAScalingPolicy {
        type_: type_.to_string(),
        value,
        period_seconds: SCALING_PERIOD_SECONDS,
    }
}

/// Scale up by at most 4 pods or 100% per 15s, whichever is more
fn scale_up_rules() -> HPAScalingRules {
    HPAScalingRules {
        policies: Some(vec![policy("Pods", 4), policy("Percent", 100)]),
        select_policy: Some("Max".to_string()),
        stabilization_window_seconds: Some(0),
    }
}

/// Scale down by at most 100% per 15s; the window stays unset
fn scale_down_rules() -> HPAScalingRules {
    HPAScalingRules {
        policies: Some(vec![policy("Percent", 100)]),
        select_policy: Some("Max".to_string()),
        stabilization_window_seconds: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::gateway;

    #[test]
    fn autoscaler_targets_workload() {
        let mut gw = gateway();
        gw.spec.app.autoscaling.enabled = true;
        gw.spec.app.autoscaling.hpa.min_replicas = Some(2);
        gw.spec.app.autoscaling.hpa.max_replicas = 6;

        let hpa = compile_autoscaler(&gw).expect("hpa");
        let spec = hpa.spec.expect("spec");
        assert_eq!(spec.scale_target_ref.kind, "Deployment");
        assert_eq!(spec.scale_target_ref.name, "edge");
        assert_eq!(spec.scale_target_ref.api_version.as_deref(), Some("apps/v1"));
        assert_eq!(spec.min_replicas, Some(2));
        assert_eq!(spec.max_replicas, 6);
        assert!(spec.behavior.is_none());
    }

    #[test]
    fn unset_fields_take_server_defaults() {
        let mut gw = gateway();
        gw.spec.app.autoscaling.enabled = true;
        gw.spec.app.autoscaling.hpa.max_replicas = 4;

        let spec = compile_autoscaler(&gw).expect("hpa").spec.expect("spec");
        assert_eq!(spec.min_replicas, Some(DEFAULT_MIN_REPLICAS));

        let metrics = spec.metrics.expect("metrics");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].type_, "Resource");
        let resource = metrics[0].resource.as_ref().expect("resource metric");
        assert_eq!(resource.name, "cpu");
        assert_eq!(resource.target.type_, "Utilization");
        assert_eq!(resource.target.average_utilization, Some(80));
    }

    #[test]
    fn partial_behavior_is_completed() {
        let mut gw = gateway();
        gw.spec.app.autoscaling.enabled = true;
        gw.spec.app.autoscaling.hpa.max_replicas = 4;
        gw.spec.app.autoscaling.hpa.behavior = Some(HorizontalPodAutoscalerBehavior {
            scale_down: Some(HPAScalingRules {
                stabilization_window_seconds: Some(600),
                ..Default::default()
            }),
            scale_up: None,
        });

        let behavior = compile_autoscaler(&gw)
            .expect("hpa")
            .spec
            .and_then(|s| s.behavior)
            .expect("behavior");

        let down = behavior.scale_down.expect("scale down");
        assert_eq!(down.stabilization_window_seconds, Some(600));
        assert_eq!(down.select_policy.as_deref(), Some("Max"));
        assert_eq!(down.policies, Some(vec![policy("Percent", 100)]));

        assert_eq!(behavior.scale_up, Some(scale_up_rules()));
    }
}
