//! Bundle builders

use std::collections::BTreeMap;

use crate::document::{
    Bundle, ClusterProperty, Item, ListenPort, Mapping, Mappings, Properties, Property,
    References, Resource, StringValues, TlsSettings,
};
use crate::{BundleError, IdGenerator, MANAGEMENT_NAMESPACE};

const CLUSTER_PROPERTY_TYPE: &str = "CLUSTER_PROPERTY";
const CONNECTOR_TYPE: &str = "SSG_CONNECTOR";
const NEW_OR_UPDATE: &str = "NewOrUpdate";

const FEATURE_MESSAGE_INPUT: &str = "Published service message input";
const FEATURE_ADMIN_ACCESS: &str = "Administrative access";
const FEATURE_BROWSER_ADMIN: &str = "Browser-based administration";
const FEATURE_BUILTIN_SERVICES: &str = "Built-in services";
const FEATURE_INTER_NODE: &str = "Inter-Node Communication";

/// TLS versions of the node-to-node port, independent of caller input
pub const NODE_TLS_VERSIONS: &[&str] = &["TLSv1.2", "TLSv1.3"];

/// Cipher suites of the node-to-node port, independent of caller input
pub const NODE_CIPHER_SUITES: &[&str] = &[
    "TLS_DHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_DHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
];

/// Build a bundle that upserts each entry of `properties` as a cluster-wide
/// property. Items are emitted in key order.
pub fn build_property_bundle(
    properties: &BTreeMap<String, String>,
    ids: &dyn IdGenerator,
) -> Result<String, BundleError> {
    let mut items = Vec::with_capacity(properties.len());
    let mut mappings = Vec::with_capacity(properties.len());

    for (name, value) in properties {
        let id = ids.next_id();
        items.push(Item {
            name: name.clone(),
            id: id.clone(),
            type_: CLUSTER_PROPERTY_TYPE,
            resource: Resource {
                cluster_property: Some(ClusterProperty {
                    id: id.clone(),
                    name: name.clone(),
                    value: value.clone(),
                }),
                listen_port: None,
            },
        });
        mappings.push(map_by_name(id, CLUSTER_PROPERTY_TYPE, name));
    }

    render(items, mappings)
}

/// Build the hardened listen port bundle.
///
/// Always emits four connectors: plaintext 8080 (disabled), administrative
/// HTTPS 9443, traffic HTTPS 8443, and node-to-node HTTPS 2124 (disabled).
/// `cipher_suites` and `tls_versions` apply to 9443 and 8443 only.
pub fn build_port_policy_bundle(
    cipher_suites: &[String],
    tls_versions: &[String],
    ids: &dyn IdGenerator,
) -> Result<String, BundleError> {
    let caller_tls = || TlsSettings::pinned(tls_versions, cipher_suites);

    let ports = [
        PortSpec {
            name: "Default HTTP (8080)",
            enabled: false,
            protocol: "HTTP",
            port: 8080,
            features: &[FEATURE_MESSAGE_INPUT],
            tls: None,
        },
        PortSpec {
            name: "Default HTTPS (9443)",
            enabled: true,
            protocol: "HTTPS",
            port: 9443,
            features: &[
                FEATURE_MESSAGE_INPUT,
                FEATURE_ADMIN_ACCESS,
                FEATURE_BROWSER_ADMIN,
                FEATURE_BUILTIN_SERVICES,
            ],
            tls: Some(caller_tls()),
        },
        PortSpec {
            name: "Default HTTPS (8443)",
            enabled: true,
            protocol: "HTTPS",
            port: 8443,
            features: &[FEATURE_MESSAGE_INPUT],
            tls: Some(caller_tls()),
        },
        PortSpec {
            name: "Node HTTPS (2124)",
            enabled: false,
            protocol: "HTTPS",
            port: 2124,
            features: &[FEATURE_INTER_NODE],
            tls: Some(TlsSettings::pinned(NODE_TLS_VERSIONS, NODE_CIPHER_SUITES)),
        },
    ];

    let mut items = Vec::with_capacity(ports.len());
    let mut mappings = Vec::with_capacity(ports.len());
    for port in ports {
        let id = ids.next_id();
        mappings.push(map_by_name(id.clone(), CONNECTOR_TYPE, port.name));
        items.push(port.into_item(id));
    }

    render(items, mappings)
}

struct PortSpec {
    name: &'static str,
    enabled: bool,
    protocol: &'static str,
    port: u16,
    features: &'static [&'static str],
    tls: Option<TlsSettings>,
}

impl PortSpec {
    fn into_item(self, id: String) -> Item {
        Item {
            name: self.name.to_string(),
            id: id.clone(),
            type_: CONNECTOR_TYPE,
            resource: Resource {
                cluster_property: None,
                listen_port: Some(ListenPort {
                    id,
                    name: self.name,
                    enabled: self.enabled,
                    protocol: self.protocol,
                    port: self.port,
                    enabled_features: StringValues::of(self.features),
                    tls_settings: self.tls,
                }),
            },
        }
    }
}

impl TlsSettings {
    fn pinned<V: AsRef<str>, C: AsRef<str>>(versions: &[V], ciphers: &[C]) -> Self {
        Self {
            client_authentication: "Optional",
            enabled_versions: StringValues::of(versions),
            enabled_cipher_suites: StringValues::of(ciphers),
            use_cipher_suites_order: true,
            properties: Properties {
                properties: vec![Property::boolean("usesTLS", true)],
            },
        }
    }
}

fn map_by_name(src_id: String, type_: &'static str, name: &str) -> Mapping {
    Mapping {
        action: NEW_OR_UPDATE,
        src_id,
        type_,
        properties: Properties {
            properties: vec![
                Property::string("MapBy", "name"),
                Property::string("MapTo", name),
            ],
        },
    }
}

fn render(items: Vec<Item>, mappings: Vec<Mapping>) -> Result<String, BundleError> {
    let bundle = Bundle {
        xmlns: MANAGEMENT_NAMESPACE,
        references: References { items },
        mappings: Mappings { mappings },
    };
    quick_xml::se::to_string(&bundle).map_err(|e| BundleError::Serialize(e.to_string()))
}
