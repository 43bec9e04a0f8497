//! Configuration config maps and JVM heap sizing
//!
//! Up to four config maps per gateway:
//! - `<gw>`: environment for the gateway container, plus the Hazelcast
//!   client configuration when shared state is external
//! - `<gw>-system`: raw `system.properties`
//! - `<gw>-cwp-bundle`: cluster-wide property bundle (when enabled)
//! - `<gw>-listen-port-bundle`: hardened listen ports (when enabled)

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;

use portico_bundle::{build_port_policy_bundle, build_property_bundle, IdGenerator};
use portico_common::crd::{App, Gateway};
use portico_common::kube_utils::owned_meta;
use portico_common::Error;

use super::names;

/// Heap used when nothing else applies
pub const DEFAULT_JVM_HEAP: &str = "2g";

/// Bytes to mebibytes, as the gateway image computes it
const BYTES_TO_MB: f64 = 0.000_000_953_674_32;

/// Key of the system properties file in `<gw>-system`
pub const SYSTEM_PROPERTIES_KEY: &str = "system.properties";
/// Key of the cluster property bundle in `<gw>-cwp-bundle`
pub const CWP_BUNDLE_KEY: &str = "cwp.bundle";
/// Key of the listen port bundle in `<gw>-listen-port-bundle`
pub const LISTEN_PORT_BUNDLE_KEY: &str = "listen-ports.bundle";
/// Key of the Hazelcast client configuration in `<gw>`
pub const HAZELCAST_CLIENT_KEY: &str = "hazelcast-client.xml";

const EXTERNAL_HAZELCAST_ARGS: &[&str] = &[
    "-Dcom.l7tech.server.extension.sharedCounterProvider=externalhazelcast",
    "-Dcom.l7tech.server.extension.sharedKeyValueStoreProvider=externalhazelcast",
    "-Dcom.l7tech.server.extension.sharedClusterInfoProvider=externalhazelcast",
];

/// Build every config map the gateway needs, in creation order.
pub fn compile_config_maps(gateway: &Gateway, ids: &dyn IdGenerator) -> Result<Vec<ConfigMap>, Error> {
    let name = gateway.name_any();
    let app = &gateway.spec.app;

    let mut maps = vec![
        config_map(gateway, names::environment(&name), environment(gateway)?)?,
        config_map(
            gateway,
            names::system_properties(&name),
            BTreeMap::from([(
                SYSTEM_PROPERTIES_KEY.to_string(),
                app.system.properties.clone(),
            )]),
        )?,
    ];

    if app.cwp.enabled {
        let properties: BTreeMap<String, String> = app
            .cwp
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        let bundle = build_property_bundle(&properties, ids)
            .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))?;
        maps.push(config_map(
            gateway,
            names::cwp_bundle(&name),
            BTreeMap::from([(CWP_BUNDLE_KEY.to_string(), bundle)]),
        )?);
    }

    if app.listen_ports.harden {
        let bundle = build_port_policy_bundle(
            &app.listen_ports.cipher_suites,
            &app.listen_ports.tls_versions,
            ids,
        )
        .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))?;
        maps.push(config_map(
            gateway,
            names::listen_port_bundle(&name),
            BTreeMap::from([(LISTEN_PORT_BUNDLE_KEY.to_string(), bundle)]),
        )?);
    }

    Ok(maps)
}

fn config_map(
    gateway: &Gateway,
    name: String,
    data: BTreeMap<String, String>,
) -> Result<ConfigMap, Error> {
    Ok(ConfigMap {
        metadata: owned_meta(gateway, name)?,
        data: Some(data),
        ..Default::default()
    })
}

/// Environment entries read by the gateway container through `envFrom`
fn environment(gateway: &Gateway) -> Result<BTreeMap<String, String>, Error> {
    let name = gateway.name_any();
    let app = &gateway.spec.app;

    let heap = jvm_heap(app).map_err(|e| Error::synthesis(&name, e))?;
    let mut java_args = app.java.extra_args.join(" ");

    let mut data = BTreeMap::from([
        ("ACCEPT_LICENSE".to_string(), gateway.spec.license.accept.clone()),
        (
            "SSG_CLUSTER_HOST".to_string(),
            app.management.cluster.hostname.clone(),
        ),
        ("SSG_JVM_HEAP".to_string(), heap),
    ]);

    if app.management.database.enabled {
        data.insert(
            "SSG_DATABASE_JDBC_URL".to_string(),
            app.management.database.jdbc_url.clone(),
        );
    }

    if app.hazelcast.external {
        let endpoint = app.hazelcast.endpoint.as_deref().unwrap_or_default();
        data.insert(
            HAZELCAST_CLIENT_KEY.to_string(),
            hazelcast_client_xml(&name, endpoint),
        );
        for arg in EXTERNAL_HAZELCAST_ARGS {
            java_args.push(' ');
            java_args.push_str(arg);
        }
    }

    data.insert("EXTRA_JAVA_ARGS".to_string(), java_args);
    Ok(data)
}

/// Hazelcast client configuration pointing at a single external member
fn hazelcast_client_xml(gateway: &str, endpoint: &str) -> String {
    format!(
        concat!(
            r#"<hazelcast-client xsi:schemaLocation="http://www.hazelcast.com/schema/client-config "#,
            r#"http://www.hazelcast.com/schema/client-config/hazelcast-client-config-3.10.xsd" "#,
            r#"xmlns="http://www.hazelcast.com/schema/client-config" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<instance-name>{gateway}-hazelcast-client</instance-name>",
            "<network><cluster-members><address>{endpoint}</address></cluster-members>",
            "<connection-attempt-limit>10</connection-attempt-limit>",
            "<redo-operation>true</redo-operation></network>",
            r#"<connection-strategy async-start="false" reconnect-mode="ON" />"#,
            "</hazelcast-client>"
        ),
        gateway = xml_escape(gateway),
        endpoint = xml_escape(endpoint),
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// =============================================================================
// Heap sizing
// =============================================================================

/// JVM heap for the gateway container.
///
/// With `calculate` set and a non-zero memory limit the heap is the given
/// percentage of the limit, in mebibytes, rounded down. With `calculate`
/// set and no limit the configured default is used. Anything else gets
/// [`DEFAULT_JVM_HEAP`].
pub fn jvm_heap(app: &App) -> Result<String, String> {
    let heap = &app.java.jvm_heap;
    if heap.calculate {
        let limit = match app.resources.limits.get("memory") {
            Some(q) => quantity_bytes(q)?,
            None => 0.0,
        };
        if limit > 0.0 {
            let mb = limit * BYTES_TO_MB;
            let sized = (mb * (f64::from(heap.percentage) / 100.0)).floor();
            return Ok(format!("{}m", sized as u64));
        }
        if let Some(default) = heap.default.as_deref().filter(|d| !d.is_empty()) {
            return Ok(default.to_string());
        }
    }
    Ok(DEFAULT_JVM_HEAP.to_string())
}

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Value of a Kubernetes quantity in base units.
///
/// Accepts binary (`Ki`..`Ei`) and decimal (`m`, `k`..`E`) suffixes and
/// exponent notation (`1e9`).
pub fn quantity_bytes(quantity: &Quantity) -> Result<f64, String> {
    let raw = quantity.0.trim();
    let invalid = || format!("invalid quantity '{raw}'");

    let (number, multiplier) = BINARY_SUFFIXES
        .iter()
        .chain(DECIMAL_SUFFIXES)
        .find_map(|(suffix, m)| raw.strip_suffix(suffix).map(|n| (n, *m)))
        .unwrap_or((raw, 1.0));

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value * multiplier)
}
