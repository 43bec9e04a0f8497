//! Serde model of the bundle document.
//!
//! Field names carry the `l7:` prefix verbatim; `@` marks attributes.

use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename = "l7:Bundle")]
pub(crate) struct Bundle {
    #[serde(rename = "@xmlns:l7")]
    pub xmlns: &'static str,
    #[serde(rename = "l7:References")]
    pub references: References,
    #[serde(rename = "l7:Mappings")]
    pub mappings: Mappings,
}

#[derive(Debug, Serialize)]
pub(crate) struct References {
    #[serde(rename = "l7:Item")]
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Item {
    #[serde(rename = "l7:Name")]
    pub name: String,
    #[serde(rename = "l7:Id")]
    pub id: String,
    #[serde(rename = "l7:Type")]
    pub type_: &'static str,
    #[serde(rename = "l7:Resource")]
    pub resource: Resource,
}

#[derive(Debug, Serialize)]
pub(crate) struct Resource {
    #[serde(rename = "l7:ClusterProperty", skip_serializing_if = "Option::is_none")]
    pub cluster_property: Option<ClusterProperty>,
    #[serde(rename = "l7:ListenPort", skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<ListenPort>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClusterProperty {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "l7:Name")]
    pub name: String,
    #[serde(rename = "l7:Value")]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListenPort {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "l7:Name")]
    pub name: &'static str,
    #[serde(rename = "l7:Enabled")]
    pub enabled: bool,
    #[serde(rename = "l7:Protocol")]
    pub protocol: &'static str,
    #[serde(rename = "l7:Port")]
    pub port: u16,
    #[serde(rename = "l7:EnabledFeatures")]
    pub enabled_features: StringValues,
    #[serde(rename = "l7:TlsSettings", skip_serializing_if = "Option::is_none")]
    pub tls_settings: Option<TlsSettings>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TlsSettings {
    #[serde(rename = "l7:ClientAuthentication")]
    pub client_authentication: &'static str,
    #[serde(rename = "l7:EnabledVersions")]
    pub enabled_versions: StringValues,
    #[serde(rename = "l7:EnabledCipherSuites")]
    pub enabled_cipher_suites: StringValues,
    #[serde(rename = "l7:UseCipherSuitesOrder")]
    pub use_cipher_suites_order: bool,
    #[serde(rename = "l7:Properties")]
    pub properties: Properties,
}

#[derive(Debug, Serialize)]
pub(crate) struct StringValues {
    #[serde(rename = "l7:StringValue")]
    pub values: Vec<String>,
}

impl StringValues {
    pub fn of<S: AsRef<str>>(values: &[S]) -> Self {
        Self {
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Mappings {
    #[serde(rename = "l7:Mapping")]
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Mapping {
    #[serde(rename = "@action")]
    pub action: &'static str,
    #[serde(rename = "@srcId")]
    pub src_id: String,
    #[serde(rename = "@type")]
    pub type_: &'static str,
    #[serde(rename = "l7:Properties")]
    pub properties: Properties,
}

#[derive(Debug, Serialize)]
pub(crate) struct Properties {
    #[serde(rename = "l7:Property")]
    pub properties: Vec<Property>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Property {
    #[serde(rename = "@key")]
    pub key: &'static str,
    #[serde(rename = "l7:StringValue", skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(rename = "l7:BooleanValue", skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<bool>,
}

impl Property {
    pub fn string(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            string_value: Some(value.into()),
            boolean_value: None,
        }
    }

    pub fn boolean(key: &'static str, value: bool) -> Self {
        Self {
            key,
            string_value: None,
            boolean_value: Some(value),
        }
    }
}
