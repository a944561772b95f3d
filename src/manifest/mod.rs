//! Manifest Assembly
//!
//! Compiles an [`EmberCSI`](crate::crd::EmberCSI) resource into the Pod
//! fragments for its controller and node workloads:
//! - `normalize`: any-shape config values to canonical JSON text
//! - `topology`: topology constraint sets to the X_CSI_TOPOLOGIES array
//! - `identity`: CSI plugin registration name
//! - `env`: driver environment
//! - `volumes`: volumes and driver mounts
//! - `features`: feature flags in the ember config
//! - `workload`: driver and sidecar containers, full Pod spec

pub mod env;
pub mod features;
pub mod identity;
pub mod normalize;
pub mod topology;
pub mod volumes;
pub mod workload;

pub use env::{default_persistence_config, generate_env_vars};
pub use features::{is_feature_enabled, is_snapshot_enabled};
pub use identity::plugin_domain_name;
pub use normalize::normalize;
pub use topology::encode_topologies;
pub use volumes::{generate_volume_layout, generate_volume_mounts, generate_volumes, VolumeLayout};
pub use workload::{
    driver_container, labels_for_instance, pod_names, pod_spec, pod_template, sidecar_containers,
};
