//! Gateway compiler: pure synthesis of every desired sub-object
//!
//! `compile` reads the gateway (spec, name, uid and the recorded commit) and
//! produces the full set of objects the reconciler converges. Nothing here
//! talks to the API server; the only non-determinism is bundle item
//! identifiers, which come from the injected [`IdGenerator`].

mod autoscaler;
mod config;
mod ingress;
mod secret;
mod service;
mod workload;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;

use portico_bundle::IdGenerator;
use portico_common::crd::Gateway;
use portico_common::Error;

use crate::object::ManagedObject;
use crate::pipeline::Stage;

pub use config::{jvm_heap, quantity_bytes, DEFAULT_JVM_HEAP};
pub use workload::COMMIT_ANNOTATION;

/// Sub-object names, all derived from the gateway name
pub mod names {
    /// Environment config map, generated secret, traffic service, ingress,
    /// autoscaler and workload all share the gateway name
    pub fn environment(gateway: &str) -> String {
        gateway.to_string()
    }

    /// Config map holding `system.properties`
    pub fn system_properties(gateway: &str) -> String {
        format!("{gateway}-system")
    }

    /// Config map holding the cluster property bundle
    pub fn cwp_bundle(gateway: &str) -> String {
        format!("{gateway}-cwp-bundle")
    }

    /// Config map holding the listen port bundle
    pub fn listen_port_bundle(gateway: &str) -> String {
        format!("{gateway}-listen-port-bundle")
    }

    /// Service routed to the management leader only
    pub fn management_service(gateway: &str) -> String {
        format!("{gateway}-management-service")
    }
}

/// Every desired sub-object of one gateway
#[derive(Clone, Debug)]
pub struct CompiledGateway {
    /// Environment, system properties and bundle config maps
    pub config_maps: Vec<ConfigMap>,
    /// Generated management secret, absent when an existing one is named
    pub secret: Option<Secret>,
    /// Traffic service
    pub service: Option<Service>,
    /// Leader-only management service
    pub management_service: Option<Service>,
    /// Ingress in front of the traffic service
    pub ingress: Option<Ingress>,
    /// Autoscaler targeting the workload
    pub autoscaler: Option<HorizontalPodAutoscaler>,
    /// The gateway workload
    pub workload: Deployment,
}

impl CompiledGateway {
    /// Objects converged by `stage`, in order. Non-converging stages and
    /// disabled sub-objects yield nothing.
    pub fn objects(&self, stage: Stage) -> Vec<ManagedObject> {
        match stage {
            Stage::ConfigMaps => self
                .config_maps
                .iter()
                .cloned()
                .map(ManagedObject::ConfigMap)
                .collect(),
            Stage::Secret => self.secret.iter().cloned().map(ManagedObject::Secret).collect(),
            Stage::Services => self.service.iter().cloned().map(ManagedObject::Service).collect(),
            Stage::ManagementService => self
                .management_service
                .iter()
                .cloned()
                .map(ManagedObject::Service)
                .collect(),
            Stage::Ingress => self.ingress.iter().cloned().map(ManagedObject::Ingress).collect(),
            Stage::Autoscaler => self
                .autoscaler
                .iter()
                .cloned()
                .map(ManagedObject::Autoscaler)
                .collect(),
            Stage::Workload => vec![ManagedObject::Workload(self.workload.clone())],
            Stage::Status | Stage::Leader | Stage::ContentDrift => Vec::new(),
        }
    }
}

/// Synthesize every desired sub-object of `gateway`.
pub fn compile(gateway: &Gateway, ids: &dyn IdGenerator) -> Result<CompiledGateway, Error> {
    let app = &gateway.spec.app;
    Ok(CompiledGateway {
        config_maps: config::compile_config_maps(gateway, ids)?,
        secret: if gateway.generates_management_secret() {
            Some(secret::compile_secret(gateway)?)
        } else {
            None
        },
        service: if app.service.enabled {
            Some(service::compile_service(gateway)?)
        } else {
            None
        },
        management_service: if app.management.service.enabled {
            Some(service::compile_management_service(gateway)?)
        } else {
            None
        },
        ingress: if app.ingress.enabled {
            Some(ingress::compile_ingress(gateway)?)
        } else {
            None
        },
        autoscaler: if app.autoscaling.enabled {
            Some(autoscaler::compile_autoscaler(gateway)?)
        } else {
            None
        },
        workload: workload::compile_workload(gateway)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::STAGES;
    use crate::testing::gateway;
    use portico_bundle::SequentialIds;

    #[test]
    fn minimal_gateway_compiles_core_objects_only() {
        let compiled = compile(&gateway(), &SequentialIds::default()).expect("compile");
        assert_eq!(compiled.config_maps.len(), 2);
        assert!(compiled.secret.is_some());
        assert!(compiled.service.is_some());
        assert!(compiled.management_service.is_none());
        assert!(compiled.ingress.is_none());
        assert!(compiled.autoscaler.is_none());
        assert_eq!(compiled.workload.metadata.name.as_deref(), Some("edge"));
    }

    #[test]
    fn named_management_secret_suppresses_generated_one() {
        let mut gw = gateway();
        gw.spec.app.management.secret_name = Some("edge-credentials".to_string());
        let compiled = compile(&gw, &SequentialIds::default()).expect("compile");
        assert!(compiled.secret.is_none());
    }

    #[test]
    fn every_object_is_owned_and_labelled() {
        let mut gw = gateway();
        gw.spec.app.management.service.enabled = true;
        gw.spec.app.ingress.enabled = true;
        gw.spec.app.autoscaling.enabled = true;
        gw.spec.app.autoscaling.hpa.max_replicas = 4;

        let compiled = compile(&gw, &SequentialIds::default()).expect("compile");
        let objects: Vec<_> = STAGES.iter().flat_map(|s| compiled.objects(*s)).collect();
        assert_eq!(objects.len(), 8);
        for object in &objects {
            let meta = object.meta();
            assert_eq!(meta.namespace.as_deref(), Some("apps"));
            assert_eq!(
                meta.owner_references.as_ref().map(|o| o[0].uid.as_str()),
                Some("uid-edge"),
                "{} has no owner",
                object.name().unwrap_or_default()
            );
            assert!(meta.labels.as_ref().is_some_and(|l| l.len() >= 4));
        }
    }

    #[test]
    fn compile_is_deterministic_with_fixed_ids() {
        let mut gw = gateway();
        gw.spec.app.cwp.enabled = true;
        let a = compile(&gw, &SequentialIds::default()).expect("compile");
        let b = compile(&gw, &SequentialIds::default()).expect("compile");
        assert_eq!(a.config_maps, b.config_maps);
        assert_eq!(a.workload, b.workload);
    }
}
