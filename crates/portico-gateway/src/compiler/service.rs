//! Traffic and management services

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use portico_common::crd::{Gateway, GatewayPort, GatewayService};
use portico_common::kube_utils::{default_labels, owned_meta};
use portico_common::{Error, LEADER_LABEL_KEY, LEADER_LABEL_VALUE};

use super::names;

const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";
const DEFAULT_PROTOCOL: &str = "TCP";

/// Service `<gw>` selecting every gateway replica
pub fn compile_service(gateway: &Gateway) -> Result<Service, Error> {
    build(gateway, gateway.name_any(), &gateway.spec.app.service, false)
}

/// Service `<gw>-management-service` selecting only the replica labelled
/// as management leader
pub fn compile_management_service(gateway: &Gateway) -> Result<Service, Error> {
    build(
        gateway,
        names::management_service(&gateway.name_any()),
        &gateway.spec.app.management.service,
        true,
    )
}

fn build(
    gateway: &Gateway,
    name: String,
    config: &GatewayService,
    leader_only: bool,
) -> Result<Service, Error> {
    let mut metadata = owned_meta(gateway, name)?;
    if !config.annotations.is_empty() {
        metadata.annotations = Some(config.annotations.clone());
    }

    let mut selector = default_labels(&gateway.name_any());
    if leader_only {
        selector.insert(LEADER_LABEL_KEY.to_string(), LEADER_LABEL_VALUE.to_string());
    }

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some(
                config
                    .type_
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string()),
            ),
            ports: Some(config.ports.iter().map(service_port).collect()),
            selector: Some(selector),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn service_port(port: &GatewayPort) -> ServicePort {
    ServicePort {
        name: Some(port.name.clone()),
        port: port.port,
        target_port: Some(IntOrString::Int(port.target_port.unwrap_or(port.port))),
        protocol: Some(protocol(port)),
        ..Default::default()
    }
}

/// Port protocol, defaulting to TCP
pub(crate) fn protocol(port: &GatewayPort) -> String {
    port.protocol
        .clone()
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::gateway;

    #[test]
    fn traffic_service_selects_all_replicas() {
        let svc = compile_service(&gateway()).expect("service");
        let spec = svc.spec.expect("spec");
        assert_eq!(svc.metadata.name.as_deref(), Some("edge"));
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(spec.selector, Some(default_labels("edge")));

        let ports = spec.ports.expect("ports");
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 8443);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(8443)));
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
    }

    #[test]
    fn management_service_selects_leader_only() {
        let mut gw = gateway();
        gw.spec.app.management.service.enabled = true;
        gw.spec.app.management.service.ports = vec![GatewayPort {
            name: "management".to_string(),
            port: 9443,
            target_port: None,
            protocol: None,
        }];

        let svc = compile_management_service(&gw).expect("service");
        assert_eq!(svc.metadata.name.as_deref(), Some("edge-management-service"));
        let spec = svc.spec.expect("spec");
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        let selector = spec.selector.expect("selector");
        assert_eq!(selector.get(LEADER_LABEL_KEY).map(String::as_str), Some("leader"));
        assert_eq!(selector.len(), 5);
    }

    #[test]
    fn annotations_are_carried_on_metadata() {
        let mut gw = gateway();
        gw.spec
            .app
            .service
            .annotations
            .insert("service.beta.kubernetes.io/aws-load-balancer-internal".to_string(), "true".to_string());
        let svc = compile_service(&gw).expect("service");
        assert_eq!(svc.metadata.annotations.map(|a| a.len()), Some(1));
    }
}
