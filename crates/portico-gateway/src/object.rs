//! The closed set of sub-object kinds a gateway owns

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use portico_common::Error;

/// Kind of a managed sub-object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// core/v1 ConfigMap
    ConfigMap,
    /// core/v1 Secret
    Secret,
    /// core/v1 Service
    Service,
    /// networking.k8s.io/v1 Ingress
    Ingress,
    /// autoscaling/v2 HorizontalPodAutoscaler
    Autoscaler,
    /// apps/v1 Deployment
    Workload,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::Secret => "Secret",
            ObjectKind::Service => "Service",
            ObjectKind::Ingress => "Ingress",
            ObjectKind::Autoscaler => "HorizontalPodAutoscaler",
            ObjectKind::Workload => "Deployment",
        };
        f.write_str(kind)
    }
}

/// A desired or observed sub-object
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    /// Configuration and bundles
    ConfigMap(ConfigMap),
    /// Management credentials
    Secret(Secret),
    /// Traffic or management service
    Service(Service),
    /// Ingress
    Ingress(Ingress),
    /// Autoscaler
    Autoscaler(HorizontalPodAutoscaler),
    /// The gateway workload
    Workload(Deployment),
}

impl ManagedObject {
    /// Kind of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ManagedObject::Secret(_) => ObjectKind::Secret,
            ManagedObject::Service(_) => ObjectKind::Service,
            ManagedObject::Ingress(_) => ObjectKind::Ingress,
            ManagedObject::Autoscaler(_) => ObjectKind::Autoscaler,
            ManagedObject::Workload(_) => ObjectKind::Workload,
        }
    }

    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ManagedObject::ConfigMap(o) => &o.metadata,
            ManagedObject::Secret(o) => &o.metadata,
            ManagedObject::Service(o) => &o.metadata,
            ManagedObject::Ingress(o) => &o.metadata,
            ManagedObject::Autoscaler(o) => &o.metadata,
            ManagedObject::Workload(o) => &o.metadata,
        }
    }

    /// Mutable object metadata
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ManagedObject::ConfigMap(o) => &mut o.metadata,
            ManagedObject::Secret(o) => &mut o.metadata,
            ManagedObject::Service(o) => &mut o.metadata,
            ManagedObject::Ingress(o) => &mut o.metadata,
            ManagedObject::Autoscaler(o) => &mut o.metadata,
            ManagedObject::Workload(o) => &mut o.metadata,
        }
    }

    /// Object name; every synthesized object has one
    pub fn name(&self) -> Result<&str, Error> {
        self.meta()
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("object", format!("{} has no name", self.kind())))
    }

    /// Object namespace; every synthesized object has one
    pub fn namespace(&self) -> Result<&str, Error> {
        self.meta().namespace.as_deref().ok_or_else(|| {
            Error::internal_with_context("object", format!("{} has no namespace", self.kind()))
        })
    }
}
