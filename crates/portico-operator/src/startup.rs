//! CRD installation on startup
//!
//! The operator applies its own CRD with server-side apply so the installed
//! schema always matches the running version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use portico_common::crd::Gateway;

/// Name of the Gateway CRD object
pub const GATEWAY_CRD_NAME: &str = "gateways.portico.dev";

/// The Gateway CRD as YAML, for `--crd`
pub fn gateway_crd_yaml() -> anyhow::Result<String> {
    serde_yaml::to_string(&Gateway::crd())
        .map_err(|e| anyhow::anyhow!("failed to serialize Gateway CRD: {}", e))
}

/// Install or update the Gateway CRD
pub async fn ensure_crds_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    tracing::info!(crd = GATEWAY_CRD_NAME, "installing CRD");
    crds.patch(GATEWAY_CRD_NAME, &params, &Patch::Apply(&Gateway::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Gateway CRD: {}", e))?;

    tracing::info!("CRDs installed/updated");
    Ok(())
}
