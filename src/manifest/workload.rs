//! Workload Assembler
//!
//! Folds the environment and volume layout into a complete driver Pod: the
//! Ember driver container plus the CSI sidecars configured for the cluster.

use crate::config::ClusterContext;
use crate::crd::EmberCSI;
use crate::domain::types::DeploymentMode;
use crate::error::Result;
use crate::manifest::env::generate_env_vars;
use crate::manifest::features::is_snapshot_enabled;
use crate::manifest::identity::plugin_domain_name;
use crate::manifest::normalize::normalize_opt;
use crate::manifest::volumes::{
    generate_volume_layout, KUBELET_PLUGINS_DIR, REGISTRATION_DIR_VOLUME, SOCKET_DIR,
    SOCKET_DIR_VOLUME,
};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, PodSpec, PodTemplateSpec,
    SecurityContext, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Service account the driver Pods run as
pub const SERVICE_ACCOUNT: &str = "ember-csi-operator";

/// Name of the driver container
pub const DRIVER_CONTAINER: &str = "ember-csi-driver";

/// Where the node registrar sees the kubelet registration directory
const REGISTRATION_MOUNT: &str = "/registration";

/// Labels selecting the resources of one EmberCSI instance
pub fn labels_for_instance(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "embercsi".to_string()),
        ("embercsi_cr".to_string(), name.to_string()),
    ])
}

/// Names of the given Pods
pub fn pod_names(pods: &[Pod]) -> Vec<String> {
    pods.iter().filter_map(|p| p.metadata.name.clone()).collect()
}

// =============================================================================
// Containers
// =============================================================================

/// Ember driver container for one deployment mode
pub fn driver_container(ecsi: &EmberCSI, mode: DeploymentMode, ctx: &ClusterContext) -> Container {
    let image = ecsi
        .spec
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .unwrap_or(ctx.driver_image.as_str());

    Container {
        name: DRIVER_CONTAINER.to_string(),
        image: Some(image.to_string()),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            allow_privilege_escalation: Some(true),
            ..Default::default()
        }),
        env: Some(generate_env_vars(ecsi, mode, ctx)),
        volume_mounts: Some(generate_volume_layout(ecsi, mode, ctx).mounts),
        ..Default::default()
    }
}

fn csi_address() -> String {
    format!("--csi-address={}/csi.sock", SOCKET_DIR)
}

fn socket_mount() -> VolumeMount {
    VolumeMount {
        name: SOCKET_DIR_VOLUME.to_string(),
        mount_path: SOCKET_DIR.to_string(),
        ..Default::default()
    }
}

fn sidecar(name: &str, image: &str, args: Vec<String>) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        args: Some(args),
        volume_mounts: Some(vec![socket_mount()]),
        ..Default::default()
    }
}

/// Whether the snapshotter should run for this instance
fn snapshots_enabled(ecsi: &EmberCSI) -> Result<bool> {
    let ember_config = normalize_opt(ecsi.spec.config.env_vars.ember_config.as_ref());
    if ember_config.is_empty() {
        return Ok(true);
    }
    is_snapshot_enabled(&ember_config)
}

/// CSI sidecars for one deployment mode.
///
/// Fails when the ember config cannot be read for feature flags.
pub fn sidecar_containers(
    ecsi: &EmberCSI,
    mode: DeploymentMode,
    ctx: &ClusterContext,
) -> Result<Vec<Container>> {
    let sidecars = &ctx.sidecars;
    let mut containers = Vec::new();

    match mode {
        DeploymentMode::Controller => {
            if let Some(image) = sidecars.attacher() {
                containers.push(sidecar("csi-attacher", image, vec![csi_address(), "--v=5".into()]));
            }

            if let Some(image) = sidecars.provisioner() {
                let mut args = vec![csi_address(), "--v=5".to_string()];
                if ecsi.has_topologies() {
                    args.push("--feature-gates=Topology=true".to_string());
                }
                containers.push(sidecar("csi-provisioner", image, args));
            }

            if let Some(image) = sidecars.snapshotter() {
                if snapshots_enabled(ecsi)? {
                    containers.push(sidecar("csi-snapshotter", image, vec![csi_address(), "--v=5".into()]));
                } else {
                    info!("Snapshots disabled for {}, skipping snapshotter", ecsi.instance_name());
                }
            }

            if let Some(image) = sidecars.resizer() {
                containers.push(sidecar("csi-resizer", image, vec![csi_address(), "--v=5".into()]));
            }
        }
        DeploymentMode::Node => {
            if let Some(image) = sidecars.node_registrar() {
                let plugin = plugin_domain_name(&ecsi.instance_name(), ctx.csi_spec);
                let mut registrar = sidecar(
                    "csi-node-driver-registrar",
                    image,
                    vec![
                        csi_address(),
                        format!(
                            "--kubelet-registration-path={}/{}/csi.sock",
                            KUBELET_PLUGINS_DIR, plugin
                        ),
                        "--v=5".to_string(),
                    ],
                );
                registrar.env = Some(vec![EnvVar {
                    name: "KUBE_NODE_NAME".to_string(),
                    value_from: Some(EnvVarSource {
                        field_ref: Some(ObjectFieldSelector {
                            field_path: "spec.nodeName".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]);
                registrar.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                    name: REGISTRATION_DIR_VOLUME.to_string(),
                    mount_path: REGISTRATION_MOUNT.to_string(),
                    ..Default::default()
                });
                containers.push(registrar);
            }
        }
    }

    if let Some(image) = sidecars.liveness_probe() {
        containers.push(sidecar("liveness-probe", image, vec![csi_address()]));
    }

    debug!(
        "{} sidecars for {} ({})",
        containers.len(),
        ecsi.instance_name(),
        mode
    );
    Ok(containers)
}

// =============================================================================
// Pod
// =============================================================================

/// Full Pod spec for one deployment mode
pub fn pod_spec(ecsi: &EmberCSI, mode: DeploymentMode, ctx: &ClusterContext) -> Result<PodSpec> {
    let layout = generate_volume_layout(ecsi, mode, ctx);

    let mut containers = vec![driver_container(ecsi, mode, ctx)];
    containers.extend(sidecar_containers(ecsi, mode, ctx)?);

    let mut spec = PodSpec {
        containers,
        volumes: Some(layout.volumes),
        service_account_name: Some(SERVICE_ACCOUNT.to_string()),
        ..Default::default()
    };

    if mode == DeploymentMode::Node {
        spec.host_network = Some(true);
        spec.host_ipc = Some(true);
        if !ecsi.spec.node_selector.is_empty() {
            spec.node_selector = Some(ecsi.spec.node_selector.clone());
        }
    }

    Ok(spec)
}

/// Labeled Pod template for one deployment mode
pub fn pod_template(
    ecsi: &EmberCSI,
    mode: DeploymentMode,
    ctx: &ClusterContext,
) -> Result<PodTemplateSpec> {
    Ok(PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels_for_instance(&ecsi.instance_name())),
            ..Default::default()
        }),
        spec: Some(pod_spec(ecsi, mode, ctx)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SidecarSet;
    use crate::crd::{EmberCSISpec, TopologySpec};
    use crate::domain::types::ConfigValue;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::collections::BTreeSet;

    fn full_sidecars() -> SidecarSet {
        SidecarSet {
            csi_spec_version: "1.0".into(),
            attacher: Some("quay.io/k8scsi/csi-attacher:v1.0.1".into()),
            provisioner: Some("quay.io/k8scsi/csi-provisioner:v1.0.1".into()),
            snapshotter: Some("quay.io/k8scsi/csi-snapshotter:v1.0.1".into()),
            resizer: None,
            node_registrar: Some("quay.io/k8scsi/csi-node-driver-registrar:v1.0.1".into()),
            liveness_probe: Some("quay.io/k8scsi/livenessprobe:v1.0.2".into()),
        }
    }

    fn instance() -> EmberCSI {
        let mut ecsi = EmberCSI::new("inst", EmberCSISpec {
            image: None,
            config: Default::default(),
            topologies: vec![],
            node_selector: BTreeMap::from([("storage".to_string(), "ember".to_string())]),
        });
        ecsi.metadata.namespace = Some("storage".into());
        ecsi
    }

    fn container_names(spec: &PodSpec) -> Vec<&str> {
        spec.containers.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_labels() {
        let labels = labels_for_instance("inst");
        assert_eq!(labels.get("app").map(String::as_str), Some("embercsi"));
        assert_eq!(labels.get("embercsi_cr").map(String::as_str), Some("inst"));
    }

    #[test]
    fn test_pod_names() {
        let pods = vec![
            Pod {
                metadata: ObjectMeta {
                    name: Some("inst-node-abc".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
            Pod::default(),
        ];
        assert_eq!(pod_names(&pods), vec!["inst-node-abc".to_string()]);
    }

    #[test]
    fn test_every_volume_is_mounted() {
        for cluster in ["k8s-1.13", "ocp-3.11"] {
            let ctx = ClusterContext::new(cluster, full_sidecars());
            for mode in DeploymentMode::ALL {
                let spec = pod_spec(&instance(), mode, &ctx).unwrap();
                let mounted: BTreeSet<&str> = spec
                    .containers
                    .iter()
                    .flat_map(|c| c.volume_mounts.iter().flatten())
                    .map(|m| m.name.as_str())
                    .collect();
                for volume in spec.volumes.as_ref().unwrap() {
                    assert!(mounted.contains(volume.name.as_str()), "{} unmounted", volume.name);
                }
            }
        }
    }

    #[test]
    fn test_controller_sidecars() {
        let ctx = ClusterContext::new("k8s-1.13", full_sidecars());
        let mut ecsi = instance();
        ecsi.spec.topologies = vec![TopologySpec {
            topology: BTreeMap::from([("zone".to_string(), "a".to_string())]),
        }];

        let spec = pod_spec(&ecsi, DeploymentMode::Controller, &ctx).unwrap();
        assert_eq!(
            container_names(&spec),
            vec![DRIVER_CONTAINER, "csi-attacher", "csi-provisioner", "csi-snapshotter", "liveness-probe"]
        );
        assert!(spec.host_network.is_none());
        assert!(spec.node_selector.is_none());

        let provisioner = &spec.containers[2];
        assert!(provisioner
            .args
            .as_ref()
            .unwrap()
            .contains(&"--feature-gates=Topology=true".to_string()));
    }

    #[test]
    fn test_snapshotter_disabled() {
        let ctx = ClusterContext::new("k8s-1.13", full_sidecars());
        let mut ecsi = instance();
        ecsi.spec.config.env_vars.ember_config =
            Some(ConfigValue::from(r#"{"Disabled": ["snapshot"]}"#));

        let spec = pod_spec(&ecsi, DeploymentMode::Controller, &ctx).unwrap();
        assert!(!container_names(&spec).contains(&"csi-snapshotter"));
    }

    #[test]
    fn test_malformed_ember_config_is_fatal() {
        let ctx = ClusterContext::new("k8s-1.13", full_sidecars());
        let mut ecsi = instance();
        ecsi.spec.config.env_vars.ember_config = Some(ConfigValue::from("Disabled=snapshot"));

        assert_matches!(
            pod_spec(&ecsi, DeploymentMode::Controller, &ctx),
            Err(Error::FeatureConfig { .. })
        );
    }

    #[test]
    fn test_node_pod() {
        let ctx = ClusterContext::new("k8s-1.13", full_sidecars());
        let spec = pod_spec(&instance(), DeploymentMode::Node, &ctx).unwrap();

        assert_eq!(
            container_names(&spec),
            vec![DRIVER_CONTAINER, "csi-node-driver-registrar", "liveness-probe"]
        );
        assert_eq!(spec.host_network, Some(true));
        assert_eq!(spec.host_ipc, Some(true));
        assert_eq!(spec.service_account_name.as_deref(), Some(SERVICE_ACCOUNT));
        assert_eq!(
            spec.node_selector.as_ref().and_then(|s| s.get("storage")).map(String::as_str),
            Some("ember")
        );

        let registrar = &spec.containers[1];
        assert!(registrar.args.as_ref().unwrap().contains(
            &"--kubelet-registration-path=/var/lib/kubelet/plugins/inst.ember-csi.io/csi.sock".to_string()
        ));
    }

    #[test]
    fn test_driver_image() {
        let mut ctx = ClusterContext::new("k8s-1.13", SidecarSet::default());
        ctx.driver_image = "embercsi/ember-csi:v0.9".into();

        let mut ecsi = instance();
        let driver = driver_container(&ecsi, DeploymentMode::Node, &ctx);
        assert_eq!(driver.image.as_deref(), Some("embercsi/ember-csi:v0.9"));
        assert_eq!(
            driver.security_context.as_ref().and_then(|s| s.privileged),
            Some(true)
        );

        ecsi.spec.image = Some("registry.local/ember:custom".into());
        let driver = driver_container(&ecsi, DeploymentMode::Node, &ctx);
        assert_eq!(driver.image.as_deref(), Some("registry.local/ember:custom"));
    }

    #[test]
    fn test_pod_template_labels() {
        let ctx = ClusterContext::new("k8s-1.13", SidecarSet::default());
        let template = pod_template(&instance(), DeploymentMode::Controller, &ctx).unwrap();
        let labels = template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels, labels_for_instance("inst"));
        assert_eq!(template.spec.unwrap().containers.len(), 1);
    }
}
