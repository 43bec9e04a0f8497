//! Kubernetes access for the gateway reconciler
//!
//! Everything the reconciler reads or writes goes through
//! [`GatewayKubeClient`] so tests can drive a pass against a mock or an
//! in-memory cluster.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use portico_common::crd::{Gateway, GatewayStatus};
use portico_common::kube_utils::patch_gateway_status;
use portico_common::Error;

use crate::object::{ManagedObject, ObjectKind};

/// Kubernetes operations needed by one reconciliation pass
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayKubeClient: Send + Sync {
    /// Fetch a sub-object; `Ok(None)` when it does not exist
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error>;

    /// Create a sub-object
    async fn create(&self, object: &ManagedObject) -> Result<(), Error>;

    /// Replace a sub-object. The object carries the resourceVersion it was
    /// read at, so a concurrent change fails with a conflict.
    async fn replace(&self, object: &ManagedObject) -> Result<(), Error>;

    /// List pods matching a label selector, in API order
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error>;

    /// Set (`Some`) or remove (`None`) labels on a pod
    async fn patch_pod_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, Option<String>>,
    ) -> Result<(), Error>;

    /// Write the gateway status, guarded by the gateway's resourceVersion.
    /// Returns the updated gateway.
    async fn patch_status(&self, gateway: &Gateway, status: &GatewayStatus)
        -> Result<Gateway, Error>;
}

/// [`GatewayKubeClient`] backed by the API server
pub struct GatewayKubeClientImpl {
    client: Client,
    field_manager: String,
}

impl GatewayKubeClientImpl {
    /// Wrap a kube client, writing as `field_manager`
    pub fn with_field_manager(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_typed<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create_typed<K>(&self, namespace: &str, object: &K) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
    {
        self.api::<K>(namespace)
            .create(&self.post_params(), object)
            .await?;
        Ok(())
    }

    async fn replace_typed<K>(&self, namespace: &str, name: &str, object: &K) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
    {
        self.api::<K>(namespace)
            .replace(name, &self.post_params(), object)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GatewayKubeClient for GatewayKubeClientImpl {
    async fn get(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedObject>, Error> {
        Ok(match kind {
            ObjectKind::ConfigMap => self
                .get_typed::<ConfigMap>(namespace, name)
                .await?
                .map(ManagedObject::ConfigMap),
            ObjectKind::Secret => self
                .get_typed::<Secret>(namespace, name)
                .await?
                .map(ManagedObject::Secret),
            ObjectKind::Service => self
                .get_typed::<Service>(namespace, name)
                .await?
                .map(ManagedObject::Service),
            ObjectKind::Ingress => self
                .get_typed::<Ingress>(namespace, name)
                .await?
                .map(ManagedObject::Ingress),
            ObjectKind::Autoscaler => self
                .get_typed::<HorizontalPodAutoscaler>(namespace, name)
                .await?
                .map(ManagedObject::Autoscaler),
            ObjectKind::Workload => self
                .get_typed::<Deployment>(namespace, name)
                .await?
                .map(ManagedObject::Workload),
        })
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), Error> {
        let namespace = object.namespace()?;
        match object {
            ManagedObject::ConfigMap(o) => self.create_typed(namespace, o).await,
            ManagedObject::Secret(o) => self.create_typed(namespace, o).await,
            ManagedObject::Service(o) => self.create_typed(namespace, o).await,
            ManagedObject::Ingress(o) => self.create_typed(namespace, o).await,
            ManagedObject::Autoscaler(o) => self.create_typed(namespace, o).await,
            ManagedObject::Workload(o) => self.create_typed(namespace, o).await,
        }
    }

    async fn replace(&self, object: &ManagedObject) -> Result<(), Error> {
        let namespace = object.namespace()?;
        let name = object.name()?;
        match object {
            ManagedObject::ConfigMap(o) => self.replace_typed(namespace, name, o).await,
            ManagedObject::Secret(o) => self.replace_typed(namespace, name, o).await,
            ManagedObject::Service(o) => self.replace_typed(namespace, name, o).await,
            ManagedObject::Ingress(o) => self.replace_typed(namespace, name, o).await,
            ManagedObject::Autoscaler(o) => self.replace_typed(namespace, name, o).await,
            ManagedObject::Workload(o) => self.replace_typed(namespace, name, o).await,
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error> {
        let pods = self
            .api::<Pod>(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(pods.items)
    }

    async fn patch_pod_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, Option<String>>,
    ) -> Result<(), Error> {
        // merge patch: null removes a label
        let patch = serde_json::json!({ "metadata": { "labels": labels } });
        self.api::<Pod>(namespace)
            .patch(
                name,
                &PatchParams {
                    field_manager: Some(self.field_manager.clone()),
                    ..Default::default()
                },
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        gateway: &Gateway,
        status: &GatewayStatus,
    ) -> Result<Gateway, Error> {
        patch_gateway_status(&self.client, gateway, status, &self.field_manager).await
    }
}
