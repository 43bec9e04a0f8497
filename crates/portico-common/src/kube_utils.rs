//! Shared Kubernetes helpers: ownership labels, owner references, and
//! versioned status patches.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};

use crate::crd::{Gateway, GatewayStatus};
use crate::{Error, OPERATOR_NAME};

/// `app.kubernetes.io/name` label key
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// `app.kubernetes.io/managed-by` label key
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// `app.kubernetes.io/created-by` label key
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";
/// `app.kubernetes.io/part-of` label key
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";

/// The fixed label set attached to every sub-object of a gateway.
///
/// Pods carry the same labels through the workload template, so the set
/// doubles as the pod selector for status aggregation and leader election.
pub fn default_labels(gateway_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), gateway_name.to_string()),
        (LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
        (LABEL_CREATED_BY.to_string(), OPERATOR_NAME.to_string()),
        (LABEL_PART_OF.to_string(), gateway_name.to_string()),
    ])
}

/// Render labels as a `k=v,k=v` selector string for list calls.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Controller owner reference pointing at the gateway.
///
/// Sub-objects carrying it are garbage collected with the gateway.
pub fn owner_reference(gateway: &Gateway) -> Result<OwnerReference, Error> {
    let uid = gateway.uid().ok_or_else(|| {
        Error::internal_with_context(
            "owner-reference",
            format!("gateway {} has no uid", gateway.name_any()),
        )
    })?;
    Ok(OwnerReference {
        api_version: Gateway::api_version(&()).to_string(),
        kind: Gateway::kind(&()).to_string(),
        name: gateway.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Metadata for a sub-object named `name` owned by `gateway`.
pub fn owned_meta(gateway: &Gateway, name: impl Into<String>) -> Result<ObjectMeta, Error> {
    Ok(ObjectMeta {
        name: Some(name.into()),
        namespace: gateway.namespace(),
        labels: Some(default_labels(&gateway.name_any())),
        owner_references: Some(vec![owner_reference(gateway)?]),
        ..Default::default()
    })
}

/// Merge patch body writing `status` over the stored status.
///
/// Unset fields are sent as `null` and empty lists as `[]` so stale values
/// are cleared rather than left in place.
pub fn status_patch(
    gateway: &Gateway,
    status: &GatewayStatus,
) -> Result<serde_json::Value, Error> {
    let status = serde_json::to_value(status)
        .map_err(|e| Error::serialization_for_kind("Gateway", e.to_string()))?;
    Ok(serde_json::json!({
        "metadata": { "resourceVersion": gateway.resource_version() },
        "status": status,
    }))
}

/// Merge-patch the gateway status, guarded by the resourceVersion the
/// status was computed from.
///
/// Including `metadata.resourceVersion` in the patch body makes the API
/// server reject the write with 409 Conflict when the gateway changed in
/// between, so a stale status is never persisted.
pub async fn patch_gateway_status(
    client: &Client,
    gateway: &Gateway,
    status: &GatewayStatus,
    field_manager: &str,
) -> Result<Gateway, Error> {
    let namespace = gateway
        .namespace()
        .ok_or_else(|| Error::validation("gateway is missing a namespace"))?;
    let api: Api<Gateway> = Api::namespaced(client.clone(), &namespace);
    let patch = status_patch(gateway, status)?;
    let updated = api
        .patch_status(
            &gateway.name_any(),
            &PatchParams::apply(field_manager),
            &Patch::Merge(&patch),
        )
        .await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{App, GatewaySpec, License};

    fn gateway(uid: Option<&str>) -> Gateway {
        let mut gw = Gateway::new(
            "edge",
            GatewaySpec {
                license: License {
                    accept: "true".to_string(),
                    secret_name: "gateway-license".to_string(),
                },
                version: None,
                app: App {
                    image: "caapim/gateway:11".to_string(),
                    replicas: 1,
                    ..Default::default()
                },
            },
        );
        gw.metadata.namespace = Some("apps".to_string());
        gw.metadata.uid = uid.map(str::to_string);
        gw
    }

    #[test]
    fn default_labels_use_gateway_name_and_operator() {
        let labels = default_labels("edge");
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.get(LABEL_NAME).map(String::as_str), Some("edge"));
        assert_eq!(labels.get(LABEL_PART_OF).map(String::as_str), Some("edge"));
        assert_eq!(
            labels.get(LABEL_MANAGED_BY).map(String::as_str),
            Some(OPERATOR_NAME)
        );
    }

    #[test]
    fn label_selector_is_sorted_and_comma_joined() {
        let selector = label_selector(&default_labels("edge"));
        assert_eq!(
            selector,
            "app.kubernetes.io/created-by=portico-operator,\
             app.kubernetes.io/managed-by=portico-operator,\
             app.kubernetes.io/name=edge,\
             app.kubernetes.io/part-of=edge"
        );
    }

    #[test]
    fn owner_reference_marks_controller() {
        let owner = owner_reference(&gateway(Some("uid-1"))).expect("owner ref");
        assert_eq!(owner.kind, "Gateway");
        assert_eq!(owner.api_version, "portico.dev/v1");
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn owner_reference_requires_uid() {
        assert!(owner_reference(&gateway(None)).is_err());
    }

    #[test]
    fn status_patch_clears_stale_fields() {
        let mut gw = gateway(Some("uid-1"));
        gw.metadata.resource_version = Some("7".to_string());

        let patch = status_patch(&gw, &GatewayStatus::default()).expect("patch");
        assert_eq!(patch["metadata"]["resourceVersion"], "7");
        assert_eq!(patch["status"]["host"], serde_json::Value::Null);
        assert_eq!(patch["status"]["commitId"], serde_json::Value::Null);
        assert_eq!(patch["status"]["gateway"], serde_json::json!([]));
        assert_eq!(patch["status"]["conditions"], serde_json::json!([]));
        assert_eq!(patch["status"]["replicas"], 0);
    }

    #[test]
    fn owned_meta_carries_namespace_labels_and_owner() {
        let meta = owned_meta(&gateway(Some("uid-1")), "edge-system").expect("meta");
        assert_eq!(meta.name.as_deref(), Some("edge-system"));
        assert_eq!(meta.namespace.as_deref(), Some("apps"));
        assert_eq!(meta.labels, Some(default_labels("edge")));
        assert_eq!(meta.owner_references.map(|o| o.len()), Some(1));
    }
}
