//! Gateway CRD: desired state of one API gateway deployment
//!
//! A Gateway is the single specification the operator converges a family of
//! sub-objects toward: config maps, an optional generated secret, services,
//! an ingress, an autoscaler and the workload itself.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::RollingUpdateDeployment;
use k8s_openapi::api::autoscaling::v2::{HorizontalPodAutoscalerBehavior, MetricSpec};
use k8s_openapi::api::core::v1::{Container, LocalObjectReference};
use k8s_openapi::api::networking::v1::IngressTLS;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Gateway defines a gateway workload and everything it needs to run.
///
/// Example:
/// ```yaml
/// apiVersion: portico.dev/v1
/// kind: Gateway
/// metadata:
///   name: edge
/// spec:
///   version: "11.0.00"
///   license:
///     accept: "true"
///     secretName: gateway-license
///   app:
///     image: docker.io/caapim/gateway:11.0.00
///     replicas: 2
///     service:
///       enabled: true
///       type: LoadBalancer
///       ports:
///         - name: https
///           port: 8443
///           targetPort: 8443
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "portico.dev",
    version = "v1",
    kind = "Gateway",
    namespaced,
    status = "GatewayStatus",
    shortname = "gw",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.app.image"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// License acceptance and the secret holding `license.xml`
    pub license: License,

    /// Gateway product version, reported back in status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Workload configuration
    pub app: App,
}

/// License configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Value passed through as `ACCEPT_LICENSE` (e.g. "true")
    #[serde(default)]
    pub accept: String,

    /// Secret with a `license.xml` key; must exist before anything is created
    pub secret_name: String,
}

/// Everything about the gateway workload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct App {
    /// Container image for the gateway container
    pub image: String,

    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Pull secrets for the gateway image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Desired replica count; ignored while autoscaling is enabled
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Service account for gateway pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Annotations added to the pod template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Gateway container resources
    #[serde(default)]
    pub resources: PodResources,

    /// Cluster-wide properties delivered as a bootstrap bundle
    #[serde(default)]
    pub cwp: ClusterProperties,

    /// Listen port hardening
    #[serde(default)]
    pub listen_ports: ListenPorts,

    /// External Hazelcast shared state
    #[serde(default)]
    pub hazelcast: Hazelcast,

    /// JVM options
    #[serde(default)]
    pub java: Java,

    /// Raw `system.properties` content
    #[serde(default)]
    pub system: SystemConfig,

    /// Management credentials, database and management service
    #[serde(default)]
    pub management: Management,

    /// Traffic service
    #[serde(default)]
    pub service: GatewayService,

    /// Ingress in front of the traffic service
    #[serde(default)]
    pub ingress: GatewayIngress,

    /// Horizontal pod autoscaling
    #[serde(default)]
    pub autoscaling: Autoscaling,

    /// Deployment update strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<UpdateStrategy>,

    /// Git repository providing bootstrap bundles
    #[serde(default)]
    pub repository: Repository,

    /// Existing config maps or secrets mounted as bootstrap bundles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundle: Vec<BundleVolume>,

    /// Extra init containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,

    /// Extra containers running next to the gateway
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<Container>,
}

fn default_replicas() -> i32 {
    1
}

/// Resource requests and limits for the gateway container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodResources {
    /// Requests (cpu, memory, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,

    /// Limits (cpu, memory, ...). The memory limit drives heap calculation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

/// Cluster-wide properties
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterProperties {
    /// Emit the cluster property bundle
    #[serde(default)]
    pub enabled: bool,

    /// Properties, upserted by name on the gateway
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ClusterProperty>,
}

/// A single cluster-wide property
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterProperty {
    /// Property name
    pub name: String,
    /// Property value
    #[serde(default)]
    pub value: String,
}

/// Listen port hardening. When enabled the operator ships a bundle that
/// disables plaintext HTTP and pins TLS versions and cipher suites on the
/// traffic and administrative HTTPS ports.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListenPorts {
    /// Emit the listen port bundle
    #[serde(default)]
    pub harden: bool,

    /// Allowed cipher suites for the 8443 and 9443 ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,

    /// Allowed TLS versions for the 8443 and 9443 ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls_versions: Vec<String>,
}

/// External Hazelcast
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Hazelcast {
    /// Use an external Hazelcast cluster for shared state
    #[serde(default)]
    pub external: bool,

    /// `host:port` of the external cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// JVM configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Java {
    /// Heap sizing policy
    #[serde(default)]
    pub jvm_heap: JvmHeap,

    /// Extra JVM arguments, joined with spaces into `EXTRA_JAVA_ARGS`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

/// Heap sizing policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct JvmHeap {
    /// Derive the heap from the memory limit
    #[serde(default)]
    pub calculate: bool,

    /// Share of the memory limit given to the heap
    #[serde(default)]
    pub percentage: u32,

    /// Heap used when `calculate` is set but no memory limit exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// System properties
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SystemConfig {
    /// Raw `system.properties` file content
    #[serde(default)]
    pub properties: String,
}

/// Management configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Management {
    /// Existing secret with management credentials. When unset the operator
    /// generates a secret named after the gateway from the fields below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// Admin username
    #[serde(default)]
    pub username: String,

    /// Admin password
    #[serde(default)]
    pub password: String,

    /// Cluster host and passphrase
    #[serde(default)]
    pub cluster: ManagementCluster,

    /// MySQL-backed configuration
    #[serde(default)]
    pub database: Database,

    /// Restman management API
    #[serde(default)]
    pub restman: Restman,

    /// Graphman management API
    #[serde(default)]
    pub graphman: Graphman,

    /// Service targeting the leader replica
    #[serde(default)]
    pub service: GatewayService,
}

/// Cluster identity
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ManagementCluster {
    /// Cluster passphrase
    #[serde(default)]
    pub password: String,

    /// Cluster hostname, reported as `status.host`
    #[serde(default)]
    pub hostname: String,
}

/// Database connection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Use a database
    #[serde(default)]
    pub enabled: bool,

    /// JDBC URL
    #[serde(default)]
    pub jdbc_url: String,

    /// Database user
    #[serde(default)]
    pub username: String,

    /// Database password
    #[serde(default)]
    pub password: String,
}

/// Restman toggle
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Restman {
    /// Enable restman
    #[serde(default)]
    pub enabled: bool,
}

/// Graphman toggle
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Graphman {
    /// Enable graphman
    #[serde(default)]
    pub enabled: bool,
}

/// A Kubernetes Service fronting the gateway
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GatewayService {
    /// Create the service
    #[serde(default)]
    pub enabled: bool,

    /// Service type (ClusterIP, NodePort, LoadBalancer)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Service annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Exposed ports; also declared as container ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<GatewayPort>,
}

/// Service port
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPort {
    /// Port name
    pub name: String,

    /// Service port
    pub port: i32,

    /// Container port; defaults to `port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,

    /// TCP or UDP; defaults to TCP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Ingress configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayIngress {
    /// Create the ingress
    #[serde(default)]
    pub enabled: bool,

    /// Ingress class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    /// Ingress annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// TLS blocks, passed through
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTLS>,

    /// One rule per host; each routes `/` to the service port exposing 8443
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<IngressRuleSpec>,
}

/// Ingress rule
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct IngressRuleSpec {
    /// Host name matched by the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Autoscaling configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Autoscaling {
    /// Create a HorizontalPodAutoscaler and stop managing replicas
    #[serde(default)]
    pub enabled: bool,

    /// Autoscaler settings
    #[serde(default)]
    pub hpa: HpaSpec,
}

/// HorizontalPodAutoscaler settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HpaSpec {
    /// Lower replica bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Upper replica bound
    #[serde(default)]
    pub max_replicas: i32,

    /// Scaling behavior, passed through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,

    /// Metrics, passed through
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricSpec>,
}

/// Deployment update strategy
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStrategy {
    /// Strategy type
    #[serde(rename = "type")]
    pub type_: UpdateStrategyType,

    /// Rolling update parameters, used with `rollingUpdate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdateDeployment>,
}

/// Update strategy type
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStrategyType {
    /// Replace pods gradually
    RollingUpdate,
    /// Kill all pods before creating new ones
    Recreate,
}

/// Git repository with bootstrap bundles
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Poll the repository and record its HEAD commit
    #[serde(default)]
    pub enabled: bool,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Clone URL
    #[serde(default)]
    pub url: String,

    /// Delivery method; `init` adds the init container below
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Init container that fetches the repository into a shared volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Container>,

    /// Secret with repository credentials, consumed by the init container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// Directory inside the repository holding bundles
    #[serde(default)]
    pub bundle_directory: String,
}

impl Repository {
    /// Whether the repository is delivered by an init container
    pub fn uses_init_container(&self) -> bool {
        self.enabled && self.method.as_deref() == Some("init")
    }
}

/// User-supplied bundle volume
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleVolume {
    /// Where the bundle lives
    #[serde(rename = "type")]
    pub type_: BundleSource,

    /// Name of the config map or secret; also the volume name
    pub name: String,

    /// Config map volume options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<BundleVolumeConfigMap>,

    /// Mount a secret through a CSI driver instead of a secret volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi: Option<BundleCsi>,
}

/// Bundle volume source kind
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BundleSource {
    /// A ConfigMap
    ConfigMap,
    /// A Secret, optionally through CSI
    Secret,
}

/// Config map volume options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleVolumeConfigMap {
    /// File mode for projected keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<i32>,

    /// Tolerate a missing config map
    #[serde(default)]
    pub optional: bool,
}

/// CSI secret volume
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleCsi {
    /// CSI driver name
    pub driver: String,

    /// Mount read-only
    #[serde(default)]
    pub read_only: bool,

    /// Driver attributes
    #[serde(default)]
    pub volume_attributes: CsiVolumeAttributes,
}

/// CSI volume attributes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CsiVolumeAttributes {
    /// SecretProviderClass used by the secrets store CSI driver
    #[serde(default)]
    pub secret_provider_class: String,
}

// =============================================================================
// Status
// =============================================================================

/// Gateway status, written only when it differs from the stored value.
///
/// Every field is serialized, unset ones as `null` and empty lists as `[]`,
/// so a merge patch clears what is no longer observed.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Cluster hostname from the spec
    #[serde(default)]
    pub host: Option<String>,

    /// Image from the spec
    #[serde(default)]
    pub image: Option<String>,

    /// Version from the spec
    #[serde(default)]
    pub version: Option<String>,

    /// Replicas observed on the workload
    #[serde(default)]
    pub replicas: i32,

    /// Ready replicas observed on the workload
    #[serde(default)]
    pub ready: i32,

    /// Aggregate lifecycle state
    #[serde(default)]
    pub state: GatewayPhase,

    /// One entry per observed replica
    #[serde(default)]
    pub gateway: Vec<ReplicaState>,

    /// Workload conditions
    #[serde(default)]
    pub conditions: Vec<GatewayCondition>,

    /// Last seen HEAD of the content repository
    #[serde(default)]
    pub commit_id: Option<String>,

    /// Pod currently labelled as management leader
    #[serde(default)]
    pub management_pod: Option<String>,

    /// Generation of the spec the status was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Aggregate lifecycle state
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPhase {
    /// Not every replica is ready, or there are none
    #[default]
    Initializing,
    /// Every observed replica is ready
    Ready,
}

impl std::fmt::Display for GatewayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayPhase::Initializing => write!(f, "initializing"),
            GatewayPhase::Ready => write!(f, "ready"),
        }
    }
}

/// State of one replica
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaState {
    /// Pod name
    pub name: String,

    /// Pod phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Gateway container ready
    #[serde(default)]
    pub ready: bool,

    /// Pod start time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

/// Condition copied from the workload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCondition {
    /// Condition type (Available, Progressing, ...)
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    pub status: String,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last transition time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

impl GatewaySpec {
    /// Validate the spec before anything is synthesized
    ///
    /// Catches configurations that would otherwise produce sub-objects the
    /// API server rejects on every pass.
    pub fn validate(&self, gateway: &str) -> Result<(), Error> {
        if self.app.image.trim().is_empty() {
            return Err(Error::validation_for_field(
                gateway,
                "spec.app.image",
                "image must not be empty",
            ));
        }
        if self.license.secret_name.trim().is_empty() {
            return Err(Error::validation_for_field(
                gateway,
                "spec.license.secretName",
                "license secret name must not be empty",
            ));
        }
        if self.app.replicas < 0 {
            return Err(Error::validation_for_field(
                gateway,
                "spec.app.replicas",
                "replicas must not be negative",
            ));
        }
        if self.app.java.jvm_heap.percentage > 100 {
            return Err(Error::validation_for_field(
                gateway,
                "spec.app.java.jvmHeap.percentage",
                "percentage must be between 0 and 100",
            ));
        }
        if self.app.hazelcast.external
            && self
                .app
                .hazelcast
                .endpoint
                .as_deref()
                .map_or(true, |e| e.trim().is_empty())
        {
            return Err(Error::validation_for_field(
                gateway,
                "spec.app.hazelcast.endpoint",
                "external hazelcast requires an endpoint",
            ));
        }
        if self.app.repository.enabled && self.app.repository.url.trim().is_empty() {
            return Err(Error::validation_for_field(
                gateway,
                "spec.app.repository.url",
                "repository url must not be empty when the repository is enabled",
            ));
        }
        if self.app.autoscaling.enabled {
            let hpa = &self.app.autoscaling.hpa;
            if hpa.max_replicas < 1 {
                return Err(Error::validation_for_field(
                    gateway,
                    "spec.app.autoscaling.hpa.maxReplicas",
                    "maxReplicas must be at least 1",
                ));
            }
            if hpa.min_replicas.is_some_and(|min| min > hpa.max_replicas) {
                return Err(Error::validation_for_field(
                    gateway,
                    "spec.app.autoscaling.hpa.minReplicas",
                    "minReplicas must not exceed maxReplicas",
                ));
            }
        }
        for bundle in &self.app.bundle {
            if bundle.csi.is_some() && bundle.type_ != BundleSource::Secret {
                return Err(Error::validation_for_field(
                    gateway,
                    "spec.app.bundle.csi",
                    format!("bundle '{}': csi is only valid for secret bundles", bundle.name),
                ));
            }
        }
        Ok(())
    }
}

impl Gateway {
    /// Name of the secret the gateway container reads credentials from
    pub fn management_secret_name(&self) -> String {
        self.spec
            .app
            .management
            .secret_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    /// Whether the operator generates the management secret itself
    pub fn generates_management_secret(&self) -> bool {
        self.spec
            .app
            .management
            .secret_name
            .as_deref()
            .map_or(true, str::is_empty)
    }

    /// Current status, or the default for a gateway never reconciled
    pub fn status_or_default(&self) -> GatewayStatus {
        self.status.clone().unwrap_or_default()
    }
}
