//! Gateway workload (Deployment)
//!
//! The pod template is built with the API server's defaults filled in
//! explicitly, so a freshly read workload compares equal to a freshly
//! synthesized one and steady-state passes issue no writes.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    CSIVolumeSource, ConfigMapEnvSource, ConfigMapVolumeSource, Container, ContainerPort,
    EmptyDirVolumeSource, EnvFromSource, EnvVar, ExecAction, KeyToPath, PodSpec, PodTemplateSpec,
    Probe, ResourceRequirements, SecretEnvSource, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use portico_common::crd::{BundleSource, BundleVolume, Gateway, UpdateStrategyType};
use portico_common::kube_utils::{default_labels, owned_meta};
use portico_common::Error;

use super::config::{HAZELCAST_CLIENT_KEY, SYSTEM_PROPERTIES_KEY};
use super::names;
use super::service::protocol;

/// Pod template annotation recording the content commit the pods started from
pub const COMMIT_ANNOTATION: &str = "commitId";

const GATEWAY_CONTAINER: &str = "gateway";
const LICENSE_VOLUME: &str = "gateway-license";
const LICENSE_KEY: &str = "license.xml";
const SYSTEM_PROPERTIES_VOLUME: &str = "system-properties";
const HAZELCAST_VOLUME: &str = "hazelcast-client";

const NODE_ETC: &str = "/opt/SecureSpan/Gateway/node/default/etc";
const HEALTH_CHECK: &[&str] = &["/bin/bash", "/opt/docker/rc.d/diagnostic/health_check.sh"];

const DEFAULT_MODE: i32 = 420;
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;
const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
const TERMINATION_MESSAGE_POLICY: &str = "File";

fn bundle_mount_path(name: &str) -> String {
    format!("{NODE_ETC}/bootstrap/bundle/{name}")
}

/// Build the gateway workload.
pub fn compile_workload(gateway: &Gateway) -> Result<Deployment, Error> {
    let name = gateway.name_any();
    let app = &gateway.spec.app;
    let labels = default_labels(&name);

    let mut pod = PodVolumes::default();
    pod.add_core_volumes(gateway);
    for bundle in &app.bundle {
        pod.add_bundle(bundle);
    }

    let mut init_containers = app.init_containers.clone();
    for container in app.init_containers.iter().chain(&app.sidecars) {
        pod.share_mounts(container);
    }
    if app.repository.uses_init_container() {
        let mut init = app.repository.init.clone().unwrap_or_default();
        let env = init.env.get_or_insert_with(Vec::new);
        env.push(env_var("GIT_REPO_URL", &app.repository.url));
        env.push(env_var("BUNDLE_DIR", &app.repository.bundle_directory));
        pod.share_mounts(&init);
        init_containers.push(init);
    }

    let mut containers = vec![gateway_container(gateway, pod.mounts)];
    containers.extend(app.sidecars.iter().cloned());
    containers.iter_mut().for_each(apply_container_defaults);
    init_containers.iter_mut().for_each(apply_container_defaults);

    let mut annotations = app.annotations.clone();
    if app.repository.enabled {
        let commit = gateway
            .status
            .as_ref()
            .and_then(|s| s.commit_id.clone())
            .unwrap_or_default();
        annotations.insert(COMMIT_ANNOTATION.to_string(), commit);
    }

    Ok(Deployment {
        metadata: owned_meta(gateway, name)?,
        spec: Some(DeploymentSpec {
            replicas: if app.autoscaling.enabled {
                None
            } else {
                Some(app.replicas)
            },
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                match_expressions: None,
            },
            strategy: app.update_strategy.as_ref().map(|s| match s.type_ {
                UpdateStrategyType::RollingUpdate => DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: s.rolling_update.clone(),
                },
                UpdateStrategyType::Recreate => DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    rolling_update: None,
                },
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: if annotations.is_empty() {
                        None
                    } else {
                        Some(annotations)
                    },
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    init_containers: if init_containers.is_empty() {
                        None
                    } else {
                        Some(init_containers)
                    },
                    volumes: Some(pod.volumes),
                    service_account_name: app.service_account_name.clone(),
                    image_pull_secrets: if app.image_pull_secrets.is_empty() {
                        None
                    } else {
                        Some(app.image_pull_secrets.clone())
                    },
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    dns_policy: Some("ClusterFirst".to_string()),
                    restart_policy: Some("Always".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn gateway_container(gateway: &Gateway, volume_mounts: Vec<VolumeMount>) -> Container {
    let app = &gateway.spec.app;

    let mut ports: Vec<ContainerPort> = app
        .service
        .ports
        .iter()
        .map(|p| container_port(&p.name, p.target_port.unwrap_or(p.port), protocol(p)))
        .collect();
    if app.management.service.enabled {
        ports.extend(
            app.management
                .service
                .ports
                .iter()
                .map(|p| container_port(&p.name, p.target_port.unwrap_or(p.port), protocol(p))),
        );
    }

    Container {
        name: GATEWAY_CONTAINER.to_string(),
        image: Some(app.image.clone()),
        image_pull_policy: app.image_pull_policy.clone(),
        env_from: Some(vec![
            EnvFromSource {
                config_map_ref: Some(ConfigMapEnvSource {
                    name: names::environment(&gateway.name_any()),
                    optional: None,
                }),
                ..Default::default()
            },
            EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: gateway.management_secret_name(),
                    optional: None,
                }),
                ..Default::default()
            },
        ]),
        ports: if ports.is_empty() { None } else { Some(ports) },
        volume_mounts: Some(volume_mounts),
        liveness_probe: Some(health_probe()),
        readiness_probe: Some(health_probe()),
        resources: Some(ResourceRequirements {
            requests: non_empty(app.resources.requests.clone()),
            limits: non_empty(app.resources.limits.clone()),
            claims: None,
        }),
        ..Default::default()
    }
}

fn non_empty<K, V>(map: BTreeMap<K, V>) -> Option<BTreeMap<K, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn container_port(name: &str, port: i32, protocol: String) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some(protocol),
        ..Default::default()
    }
}

fn health_probe() -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(HEALTH_CHECK.iter().map(|s| s.to_string()).collect()),
        }),
        initial_delay_seconds: Some(30),
        timeout_seconds: Some(1),
        period_seconds: Some(10),
        failure_threshold: Some(10),
        success_threshold: Some(1),
        ..Default::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Fill in the fields the API server defaults on every container.
fn apply_container_defaults(container: &mut Container) {
    if container.image_pull_policy.is_none() {
        container.image_pull_policy = Some(default_pull_policy(container.image.as_deref()));
    }
    container
        .termination_message_path
        .get_or_insert_with(|| TERMINATION_MESSAGE_PATH.to_string());
    container
        .termination_message_policy
        .get_or_insert_with(|| TERMINATION_MESSAGE_POLICY.to_string());
    for port in container.ports.iter_mut().flatten() {
        port.protocol.get_or_insert_with(|| "TCP".to_string());
    }
    for probe in [
        &mut container.liveness_probe,
        &mut container.readiness_probe,
        &mut container.startup_probe,
    ]
    .into_iter()
    .flatten()
    {
        probe.timeout_seconds.get_or_insert(1);
        probe.period_seconds.get_or_insert(10);
        probe.success_threshold.get_or_insert(1);
        probe.failure_threshold.get_or_insert(3);
    }
}

/// `Always` for untagged or `:latest` images, `IfNotPresent` otherwise.
fn default_pull_policy(image: Option<&str>) -> String {
    let image = image.unwrap_or_default();
    let reference = image.split('@').next().unwrap_or_default();
    let tag = reference
        .rsplit_once(':')
        .filter(|(_, tag)| !tag.contains('/'))
        .map(|(_, tag)| tag);
    let pinned = image.contains('@');
    match tag {
        _ if pinned => "IfNotPresent",
        Some(tag) if tag != "latest" => "IfNotPresent",
        _ => "Always",
    }
    .to_string()
}

// =============================================================================
// Volumes
// =============================================================================

/// Pod volumes and the gateway container's mounts, built together so every
/// mount has a backing volume.
#[derive(Default)]
struct PodVolumes {
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
    names: BTreeSet<String>,
}

impl PodVolumes {
    fn add(&mut self, volume: Volume, mount: VolumeMount) {
        // mount paths must be unique within a container
        if !self.mounts.iter().any(|m| m.mount_path == mount.mount_path) {
            self.mounts.push(mount);
        }
        if self.names.insert(volume.name.clone()) {
            self.volumes.push(volume);
        }
    }

    fn add_core_volumes(&mut self, gateway: &Gateway) {
        let name = gateway.name_any();
        let app = &gateway.spec.app;

        self.add(
            Volume {
                name: LICENSE_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(gateway.spec.license.secret_name.clone()),
                    items: Some(vec![key_to_path(LICENSE_KEY)]),
                    default_mode: Some(DEFAULT_MODE),
                    optional: Some(false),
                }),
                ..Default::default()
            },
            sub_path_mount(
                LICENSE_VOLUME,
                format!("{NODE_ETC}/bootstrap/license/{LICENSE_KEY}"),
                LICENSE_KEY,
            ),
        );

        self.add(
            config_map_volume(
                SYSTEM_PROPERTIES_VOLUME,
                names::system_properties(&name),
                Some(SYSTEM_PROPERTIES_KEY),
            ),
            sub_path_mount(
                SYSTEM_PROPERTIES_VOLUME,
                format!("{NODE_ETC}/conf/{SYSTEM_PROPERTIES_KEY}"),
                SYSTEM_PROPERTIES_KEY,
            ),
        );

        // bundle config maps mount whole, as a directory named after the map
        if app.cwp.enabled {
            let cm = names::cwp_bundle(&name);
            self.add(
                config_map_volume(&cm, cm.clone(), None),
                mount(&cm, bundle_mount_path(&cm)),
            );
        }
        if app.listen_ports.harden {
            let cm = names::listen_port_bundle(&name);
            self.add(
                config_map_volume(&cm, cm.clone(), None),
                mount(&cm, bundle_mount_path(&cm)),
            );
        }

        for (enabled, service) in [
            (app.management.restman.enabled, "restman"),
            (app.management.graphman.enabled, "graphman"),
        ] {
            if enabled {
                self.add(
                    empty_dir(service),
                    mount(service, format!("{NODE_ETC}/bootstrap/services/{service}")),
                );
            }
        }

        if app.hazelcast.external {
            self.add(
                config_map_volume(
                    HAZELCAST_VOLUME,
                    names::environment(&name),
                    Some(HAZELCAST_CLIENT_KEY),
                ),
                sub_path_mount(
                    HAZELCAST_VOLUME,
                    format!(
                        "{NODE_ETC}/bootstrap/assertions/\
                         ExternalHazelcastSharedStateProviderAssertion/{HAZELCAST_CLIENT_KEY}"
                    ),
                    HAZELCAST_CLIENT_KEY,
                ),
            );
        }
    }

    fn add_bundle(&mut self, bundle: &BundleVolume) {
        let volume = match (bundle.type_, &bundle.csi) {
            (BundleSource::ConfigMap, _) => {
                let options = bundle.config_map.clone().unwrap_or_default();
                Volume {
                    name: bundle.name.clone(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: bundle.name.clone(),
                        default_mode: Some(options.default_mode.unwrap_or(DEFAULT_MODE)),
                        optional: Some(options.optional),
                        items: None,
                    }),
                    ..Default::default()
                }
            }
            (BundleSource::Secret, Some(csi)) => Volume {
                name: bundle.name.clone(),
                csi: Some(CSIVolumeSource {
                    driver: csi.driver.clone(),
                    read_only: Some(csi.read_only),
                    volume_attributes: Some(BTreeMap::from([(
                        "secretProviderClass".to_string(),
                        csi.volume_attributes.secret_provider_class.clone(),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            },
            (BundleSource::Secret, None) => Volume {
                name: bundle.name.clone(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(bundle.name.clone()),
                    default_mode: Some(DEFAULT_MODE),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        self.add(volume, mount(&bundle.name, bundle_mount_path(&bundle.name)));
    }

    /// Mount a helper container's volumes into the gateway container too,
    /// backed by empty dirs.
    fn share_mounts(&mut self, container: &Container) {
        for m in container.volume_mounts.iter().flatten() {
            self.add(empty_dir(&m.name), m.clone());
        }
    }
}

fn key_to_path(key: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        mode: None,
    }
}

fn config_map_volume(volume: &str, config_map: String, key: Option<&str>) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map,
            items: key.map(|k| vec![key_to_path(k)]),
            default_mode: Some(DEFAULT_MODE),
            optional: Some(false),
        }),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn mount(name: &str, path: String) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path,
        ..Default::default()
    }
}

fn sub_path_mount(name: &str, path: String, sub_path: &str) -> VolumeMount {
    VolumeMount {
        sub_path: Some(sub_path.to_string()),
        ..mount(name, path)
    }
}
