//! Controller runner: builds the Gateway controller future
//!
//! The controller watches Gateways and the sub-object kinds it owns, so an
//! edit or deletion of a config map, secret, service, ingress, autoscaler or
//! workload re-triggers the owning gateway.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use portico_common::crd::Gateway;
use portico_gateway::{error_policy, reconcile, ControllerConfig, GatewayContext};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client times out.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the Gateway controller future.
///
/// `namespace` restricts every watch to one namespace; `None` watches all.
pub fn build_gateway_controller(
    client: Client,
    namespace: Option<&str>,
    field_manager: &str,
    config: ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(GatewayContext::from_client(
        client.clone(),
        field_manager,
        config,
    ));
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, "- Gateway controller"),
        None => tracing::info!("- Gateway controller (all namespaces)"),
    }

    Box::pin(
        Controller::new(scoped::<Gateway>(&client, namespace), watcher())
            .owns(scoped::<ConfigMap>(&client, namespace), watcher())
            .owns(scoped::<Secret>(&client, namespace), watcher())
            .owns(scoped::<Service>(&client, namespace), watcher())
            .owns(scoped::<Ingress>(&client, namespace), watcher())
            .owns(scoped::<HorizontalPodAutoscaler>(&client, namespace), watcher())
            .owns(scoped::<Deployment>(&client, namespace), watcher())
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("Gateway")),
    )
}

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
