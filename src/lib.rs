//! Ember CSI Operator - Manifest Assembly
//!
//! Turns an `EmberCSI` custom resource into the Pod specifications that run
//! the Ember CSI driver as a controller workload and as a per-node workload.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    EmberCSI resource + DeploymentMode                 │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │
//!   ┌─────────────────┐           │           ┌──────────────────────────┐
//!   │ OperatorConfig  │──resolve──┼──────────▶│ ClusterContext (startup) │
//!   └─────────────────┘           │           └──────────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  Environment Assembler        │        Volume/Mount Assembler         │
//! │  (normalize, topology)        │        (plugin identity, flavor)      │
//! ├───────────────────────────────┴──────────────────────────────────────┤
//! │              Workload Assembler (driver + CSI sidecars)               │
//! │                     (feature flags: snapshotter)                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`manifest`]: the assemblers
//! - [`config`]: sidecar table and cluster context
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: core value types
//! - [`error`]: error types and handling

pub mod config;
pub mod crd;
pub mod domain;
pub mod error;
pub mod manifest;

// Re-export commonly used types
pub use config::{ClusterContext, OperatorConfig, SidecarSet};

pub use crd::{EmberCSI, EmberCSIConfig, EmberCSISpec, EnvVarsSpec, SysFilesSpec, TopologySpec};

pub use domain::types::{ClusterFlavor, ConfigValue, DeploymentMode};

pub use error::{Error, ErrorAction, Result};

pub use manifest::{
    generate_env_vars, generate_volume_layout, generate_volume_mounts, generate_volumes,
    is_snapshot_enabled, plugin_domain_name, pod_spec, pod_template, VolumeLayout,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
