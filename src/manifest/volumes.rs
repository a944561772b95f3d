//! Volume/Mount Assembler
//!
//! Volumes and the driver's mounts are built together as one layout so a
//! mount can never reference a volume that was not emitted.

use crate::config::ClusterContext;
use crate::crd::EmberCSI;
use crate::domain::types::{ClusterFlavor, DeploymentMode};
use crate::manifest::identity::plugin_domain_name;
use crate::manifest::normalize::normalize_opt;
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, HostPathVolumeSource, KeyToPath, SecretVolumeSource, Volume, VolumeMount,
};

// =============================================================================
// Paths and Names
// =============================================================================

/// Where the system-files secret is mounted in the driver container
pub const SYSTEM_FILES_DIR: &str = "/tmp/ember-csi";

/// Directory holding the driver socket inside every container
pub const SOCKET_DIR: &str = "/csi-data";

/// Kubelet directory for per-plugin sockets
pub const KUBELET_PLUGINS_DIR: &str = "/var/lib/kubelet/plugins";

/// Kubelet plugin registration directory
pub const REGISTRATION_DIR: &str = "/var/lib/kubelet/plugins_registry";

pub const SOCKET_DIR_VOLUME: &str = "socket-dir";
pub const REGISTRATION_DIR_VOLUME: &str = "registration-dir";
pub const SYSTEM_FILES_VOLUME: &str = "system-files";

/// Marker for LVM backends in the backend config
const LVM_MARKER: &str = "lvmvolume";

const HOST_PATH_DIRECTORY_OR_CREATE: &str = "DirectoryOrCreate";

/// Mount propagation for host paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPropagation {
    /// Mounts made by the driver are visible on the host
    Bidirectional,
    /// Host mounts are visible to the driver, not the other way round
    HostToContainer,
}

impl MountPropagation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountPropagation::Bidirectional => "Bidirectional",
            MountPropagation::HostToContainer => "HostToContainer",
        }
    }
}

use MountPropagation::{Bidirectional, HostToContainer};

/// Host directories every driver container needs: (name, path, propagation)
const BASELINE_HOST_PATHS: [(&str, &str, MountPropagation); 8] = [
    ("iscsi-dir", "/etc/iscsi", Bidirectional),
    ("var-lib-iscsi", "/var/lib/iscsi", Bidirectional),
    ("multipath-dir", "/etc/multipath", Bidirectional),
    ("multipath-conf", "/etc/multipath.conf", HostToContainer),
    ("modules-dir", "/lib/modules", HostToContainer),
    ("run-dir", "/run/udev", HostToContainer),
    ("dev-dir", "/dev", Bidirectional),
    ("localtime", "/etc/localtime", HostToContainer),
];

// =============================================================================
// Volume Layout
// =============================================================================

/// Volumes of the driver Pod with the driver container's mounts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeLayout {
    pub volumes: Vec<Volume>,
    pub mounts: Vec<VolumeMount>,
}

impl VolumeLayout {
    /// Add a volume mounted into the driver container
    fn mounted(&mut self, volume: Volume, mount_path: &str, propagation: Option<MountPropagation>) {
        self.mounts.push(VolumeMount {
            name: volume.name.clone(),
            mount_path: mount_path.to_string(),
            mount_propagation: propagation.map(|p| p.as_str().to_string()),
            ..Default::default()
        });
        self.volumes.push(volume);
    }

    /// Add a host directory mounted at the same path
    fn host_dir(&mut self, name: &str, path: &str, propagation: MountPropagation) {
        self.mounted(host_path_volume(name, path, None), path, Some(propagation));
    }

    /// Add a volume that only sidecars mount
    fn sidecar_only(&mut self, volume: Volume) {
        self.volumes.push(volume);
    }

    /// Names of volumes that no driver mount uses
    pub fn unmounted_volume_names(&self) -> Vec<&str> {
        self.volumes
            .iter()
            .filter(|v| !self.mounts.iter().any(|m| m.name == v.name))
            .map(|v| v.name.as_str())
            .collect()
    }
}

fn host_path_volume(name: &str, path: &str, type_: Option<&str>) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: type_.map(str::to_string),
        }),
        ..Default::default()
    }
}

/// Whether the backend config selects an LVM driver
pub fn uses_lvm(ecsi: &EmberCSI) -> bool {
    let backend_config = normalize_opt(ecsi.spec.config.env_vars.backend_config.as_ref());
    !backend_config.is_empty() && backend_config.to_lowercase().contains(LVM_MARKER)
}

/// Build the volume layout for one deployment mode
pub fn generate_volume_layout(ecsi: &EmberCSI, mode: DeploymentMode, ctx: &ClusterContext) -> VolumeLayout {
    let mut layout = VolumeLayout::default();

    // Controllers keep the socket private; nodes expose it to the kubelet
    // under a directory unique to this plugin.
    let socket_dir = match mode {
        DeploymentMode::Controller => Volume {
            name: SOCKET_DIR_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        DeploymentMode::Node => {
            let plugin = plugin_domain_name(&ecsi.instance_name(), ctx.csi_spec);
            host_path_volume(
                SOCKET_DIR_VOLUME,
                &format!("{}/{}", KUBELET_PLUGINS_DIR, plugin),
                None,
            )
        }
    };
    layout.mounted(socket_dir, SOCKET_DIR, Some(Bidirectional));

    for (name, path, propagation) in BASELINE_HOST_PATHS {
        layout.host_dir(name, path, propagation);
    }

    if uses_lvm(ecsi) {
        layout.host_dir("etc-lvm", "/etc/lvm", Bidirectional);
        layout.host_dir("var-lock-lvm", "/var/lock/lvm", Bidirectional);
    }

    if let Some(sys_files) = ecsi.system_files() {
        let volume = Volume {
            name: SYSTEM_FILES_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(sys_files.name.clone()),
                items: Some(vec![KeyToPath {
                    key: sys_files.key.clone(),
                    path: sys_files.key.clone(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        layout.mounted(volume, SYSTEM_FILES_DIR, None);
    }

    if mode == DeploymentMode::Node {
        // Lock state shared between driver restarts
        layout.mounted(
            host_path_volume(
                "shared-lock-dir",
                "/var/lib/ember-csi",
                Some(HOST_PATH_DIRECTORY_OR_CREATE),
            ),
            "/var/lib/ember-csi",
            Some(Bidirectional),
        );

        if ctx.sidecars.node_registrar().is_some() {
            layout.sidecar_only(host_path_volume(REGISTRATION_DIR_VOLUME, REGISTRATION_DIR, None));
        }

        match ctx.flavor {
            ClusterFlavor::Legacy => {
                layout.host_dir(
                    "mountpoint-dir",
                    "/var/lib/origin/openshift.local.volumes",
                    Bidirectional,
                );
                layout.mounted(
                    host_path_volume(
                        "kubelet-socket-dir",
                        "/var/lib/kubelet/device-plugins",
                        Some(HOST_PATH_DIRECTORY_OR_CREATE),
                    ),
                    "/var/lib/kubelet/device-plugins",
                    Some(Bidirectional),
                );
            }
            ClusterFlavor::Default => {
                layout.host_dir("mountpoint-dir", "/var/lib/kubelet", Bidirectional);
            }
        }
    }

    layout
}

/// Volume mounts of the driver container
pub fn generate_volume_mounts(ecsi: &EmberCSI, mode: DeploymentMode, ctx: &ClusterContext) -> Vec<VolumeMount> {
    generate_volume_layout(ecsi, mode, ctx).mounts
}

/// Volumes of the driver Pod
pub fn generate_volumes(ecsi: &EmberCSI, mode: DeploymentMode, ctx: &ClusterContext) -> Vec<Volume> {
    generate_volume_layout(ecsi, mode, ctx).volumes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SidecarSet;
    use crate::crd::{EmberCSISpec, SysFilesSpec};
    use crate::domain::types::ConfigValue;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn context(cluster: &str, node_registrar: bool) -> ClusterContext {
        ClusterContext::new(
            cluster,
            SidecarSet {
                csi_spec_version: "1.0".into(),
                node_registrar: node_registrar
                    .then(|| "quay.io/k8scsi/csi-node-driver-registrar:v1.0.1".to_string()),
                ..Default::default()
            },
        )
    }

    fn instance() -> EmberCSI {
        let mut ecsi = EmberCSI::new("inst", EmberCSISpec {
            image: None,
            config: Default::default(),
            topologies: vec![],
            node_selector: Default::default(),
        });
        ecsi.metadata.namespace = Some("storage".into());
        ecsi
    }

    fn lvm_with_sys_files() -> EmberCSI {
        let mut ecsi = instance();
        ecsi.spec.config.env_vars.backend_config =
            Some(ConfigValue::from(json!({"driver": "LVMVolume", "volume_group": "ember"})));
        ecsi.spec.config.sys_files = Some(SysFilesSpec {
            name: "ceph-keys".into(),
            key: "ceph.tar.gz".into(),
        });
        ecsi
    }

    fn find<'a>(layout: &'a VolumeLayout, name: &str) -> Option<&'a Volume> {
        layout.volumes.iter().find(|v| v.name == name)
    }

    fn mount<'a>(layout: &'a VolumeLayout, name: &str) -> Option<&'a VolumeMount> {
        layout.mounts.iter().find(|m| m.name == name)
    }

    #[test]
    fn test_mounts_match_volumes_for_every_combination() {
        for cluster in ["ocp-3.11", "k8s-1.13", "ocp-4.2"] {
            for registrar in [false, true] {
                for ecsi in [instance(), lvm_with_sys_files()] {
                    for mode in DeploymentMode::ALL {
                        let ctx = context(cluster, registrar);
                        let layout = generate_volume_layout(&ecsi, mode, &ctx);

                        let volume_names: Vec<&str> =
                            layout.volumes.iter().map(|v| v.name.as_str()).collect();
                        let volume_set: BTreeSet<&str> = volume_names.iter().copied().collect();
                        assert_eq!(volume_set.len(), volume_names.len(), "duplicate volume");

                        let mount_set: BTreeSet<&str> =
                            layout.mounts.iter().map(|m| m.name.as_str()).collect();
                        assert_eq!(mount_set.len(), layout.mounts.len(), "duplicate mount");

                        let sidecar_only: BTreeSet<&str> =
                            layout.unmounted_volume_names().into_iter().collect();
                        let expected: BTreeSet<&str> = if mode == DeploymentMode::Node && registrar {
                            [REGISTRATION_DIR_VOLUME].into_iter().collect()
                        } else {
                            BTreeSet::new()
                        };
                        assert_eq!(sidecar_only, expected);

                        let driver_volumes: BTreeSet<&str> =
                            volume_set.difference(&expected).copied().collect();
                        assert_eq!(driver_volumes, mount_set, "{} {} {}", cluster, mode, registrar);
                    }
                }
            }
        }
    }

    #[test]
    fn test_baseline_propagation() {
        let layout = generate_volume_layout(&instance(), DeploymentMode::Controller, &context("k8s-1.13", true));
        assert_eq!(layout.mounts.len(), 9);
        assert_eq!(
            mount(&layout, "multipath-conf").unwrap().mount_propagation.as_deref(),
            Some("HostToContainer")
        );
        assert_eq!(
            mount(&layout, "dev-dir").unwrap().mount_propagation.as_deref(),
            Some("Bidirectional")
        );
        assert_eq!(mount(&layout, SOCKET_DIR_VOLUME).unwrap().mount_path, SOCKET_DIR);
    }

    #[test]
    fn test_controller_socket_is_empty_dir() {
        let layout = generate_volume_layout(&instance(), DeploymentMode::Controller, &context("k8s-1.13", true));
        let socket = find(&layout, SOCKET_DIR_VOLUME).unwrap();
        assert!(socket.empty_dir.is_some());
        assert!(socket.host_path.is_none());
        assert!(find(&layout, "shared-lock-dir").is_none());
        assert!(find(&layout, "mountpoint-dir").is_none());
        assert!(find(&layout, REGISTRATION_DIR_VOLUME).is_none());
    }

    #[test]
    fn test_node_socket_is_per_plugin() {
        let layout = generate_volume_layout(&instance(), DeploymentMode::Node, &context("k8s-1.13", true));
        let socket = find(&layout, SOCKET_DIR_VOLUME).unwrap();
        assert_eq!(
            socket.host_path.as_ref().unwrap().path,
            "/var/lib/kubelet/plugins/inst.ember-csi.io"
        );

        let mut legacy = context("ocp-3.11", false);
        legacy.csi_spec = 0.2;
        let layout = generate_volume_layout(&instance(), DeploymentMode::Node, &legacy);
        let socket = find(&layout, SOCKET_DIR_VOLUME).unwrap();
        assert_eq!(
            socket.host_path.as_ref().unwrap().path,
            "/var/lib/kubelet/plugins/io.ember-csi.inst"
        );
    }

    #[test]
    fn test_legacy_flavor_layout() {
        let layout = generate_volume_layout(&instance(), DeploymentMode::Node, &context("ocp-3.11", false));

        let device_plugins = find(&layout, "kubelet-socket-dir").unwrap();
        assert_eq!(
            device_plugins.host_path.as_ref().unwrap().type_.as_deref(),
            Some("DirectoryOrCreate")
        );
        assert_eq!(
            mount(&layout, "mountpoint-dir").unwrap().mount_path,
            "/var/lib/origin/openshift.local.volumes"
        );
        assert_eq!(layout.mounts.iter().filter(|m| m.name == "mountpoint-dir").count(), 1);
    }

    #[test]
    fn test_default_flavor_layout() {
        let layout = generate_volume_layout(&instance(), DeploymentMode::Node, &context("k8s-1.13", false));

        assert!(find(&layout, "kubelet-socket-dir").is_none());
        assert!(layout
            .mounts
            .iter()
            .all(|m| m.mount_path != "/var/lib/origin/openshift.local.volumes"));
        assert_eq!(mount(&layout, "mountpoint-dir").unwrap().mount_path, "/var/lib/kubelet");
        assert_eq!(layout.mounts.iter().filter(|m| m.name == "mountpoint-dir").count(), 1);
    }

    #[test]
    fn test_lvm_volumes() {
        let ctx = context("k8s-1.13", false);
        let layout = generate_volume_layout(&lvm_with_sys_files(), DeploymentMode::Controller, &ctx);
        assert!(find(&layout, "etc-lvm").is_some());
        assert_eq!(mount(&layout, "var-lock-lvm").unwrap().mount_path, "/var/lock/lvm");

        let mut ecsi = instance();
        ecsi.spec.config.env_vars.backend_config =
            Some(ConfigValue::from(r#"{"driver": "RBD", "rbd_pool": "volumes"}"#));
        let layout = generate_volume_layout(&ecsi, DeploymentMode::Controller, &ctx);
        assert!(find(&layout, "etc-lvm").is_none());
        assert!(find(&layout, "var-lock-lvm").is_none());
    }

    #[test]
    fn test_system_files_secret() {
        let layout = generate_volume_layout(&lvm_with_sys_files(), DeploymentMode::Node, &context("k8s-1.13", true));

        let secret = find(&layout, SYSTEM_FILES_VOLUME).unwrap().secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("ceph-keys"));
        let items = secret.items.as_ref().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "ceph.tar.gz");
        assert_eq!(items[0].path, "ceph.tar.gz");

        let m = mount(&layout, SYSTEM_FILES_VOLUME).unwrap();
        assert_eq!(m.mount_path, SYSTEM_FILES_DIR);
        assert!(m.mount_propagation.is_none());
    }

    #[test]
    fn test_projections_agree_with_layout() {
        let ecsi = lvm_with_sys_files();
        let ctx = context("ocp-3.11", true);
        let layout = generate_volume_layout(&ecsi, DeploymentMode::Node, &ctx);
        assert_eq!(generate_volumes(&ecsi, DeploymentMode::Node, &ctx), layout.volumes);
        assert_eq!(generate_volume_mounts(&ecsi, DeploymentMode::Node, &ctx), layout.mounts);
    }
}
