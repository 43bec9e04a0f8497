//! Generated management secret

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;

use portico_common::crd::Gateway;
use portico_common::kube_utils::owned_meta;
use portico_common::Error;

/// Credentials secret named after the gateway, read by the container
/// through `envFrom`. Only built when no existing secret is named.
pub fn compile_secret(gateway: &Gateway) -> Result<Secret, Error> {
    let management = &gateway.spec.app.management;

    let mut entries = vec![
        ("SSG_ADMIN_USERNAME", &management.username),
        ("SSG_ADMIN_PASSWORD", &management.password),
        ("SSG_CLUSTER_PASSWORD", &management.cluster.password),
    ];
    if management.database.enabled {
        entries.push(("SSG_DATABASE_USER", &management.database.username));
        entries.push(("SSG_DATABASE_PASSWORD", &management.database.password));
    }

    let data: BTreeMap<String, ByteString> = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
        .collect();

    Ok(Secret {
        metadata: owned_meta(gateway, gateway.name_any())?,
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })
}
