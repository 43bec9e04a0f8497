//! Ingress in front of the traffic service

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::ResourceExt;

use portico_common::crd::Gateway;
use portico_common::kube_utils::owned_meta;
use portico_common::Error;

/// Container port the ingress routes to
pub const INGRESS_TARGET_PORT: i32 = 8443;

/// Ingress `<gw>`: one rule per configured host, each routing `/` to the
/// traffic service port that exposes 8443.
pub fn compile_ingress(gateway: &Gateway) -> Result<Ingress, Error> {
    let name = gateway.name_any();
    let config = &gateway.spec.app.ingress;

    let port = gateway
        .spec
        .app
        .service
        .ports
        .iter()
        .find(|p| p.port == INGRESS_TARGET_PORT)
        .map(|p| ServiceBackendPort {
            name: Some(p.name.clone()),
            number: None,
        })
        .unwrap_or(ServiceBackendPort {
            name: None,
            number: Some(INGRESS_TARGET_PORT),
        });

    let rules: Vec<IngressRule> = config
        .rules
        .iter()
        .map(|rule| IngressRule {
            host: rule.host.clone(),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: name.clone(),
                            port: Some(port.clone()),
                        }),
                        resource: None,
                    },
                }],
            }),
        })
        .collect();

    let mut metadata = owned_meta(gateway, name.clone())?;
    if !config.annotations.is_empty() {
        metadata.annotations = Some(config.annotations.clone());
    }

    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: config.ingress_class_name.clone(),
            rules: if rules.is_empty() {
                None
            } else {
                Some(rules)
            },
            tls: if config.tls.is_empty() {
                None
            } else {
                Some(config.tls.clone())
            },
            default_backend: None,
        }),
        ..Default::default()
    })
}
