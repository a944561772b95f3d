//! Operator Configuration
//!
//! The sidecar table is loaded once at startup and resolved against the
//! cluster the operator runs in. The resulting [`ClusterContext`] is
//! immutable and handed by reference to every assembly call.

use crate::domain::types::ClusterFlavor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// CSI spec version assumed when the sidecar table does not state a usable one
pub const DEFAULT_CSI_SPEC: f64 = 0.2;

/// Driver image used when neither the config file nor the resource sets one
pub const DEFAULT_DRIVER_IMAGE: &str = "embercsi/ember-csi:master";

// =============================================================================
// Sidecar Table
// =============================================================================

/// Sidecar images and CSI spec version for one cluster flavor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarSet {
    /// CSI spec version negotiated with these sidecars (e.g. "1.0")
    #[serde(default)]
    pub csi_spec_version: String,
    #[serde(default)]
    pub attacher: Option<String>,
    #[serde(default)]
    pub provisioner: Option<String>,
    #[serde(default)]
    pub snapshotter: Option<String>,
    #[serde(default)]
    pub resizer: Option<String>,
    #[serde(default)]
    pub node_registrar: Option<String>,
    #[serde(default)]
    pub liveness_probe: Option<String>,
}

impl SidecarSet {
    pub fn attacher(&self) -> Option<&str> {
        configured(&self.attacher)
    }

    pub fn provisioner(&self) -> Option<&str> {
        configured(&self.provisioner)
    }

    pub fn snapshotter(&self) -> Option<&str> {
        configured(&self.snapshotter)
    }

    pub fn resizer(&self) -> Option<&str> {
        configured(&self.resizer)
    }

    pub fn node_registrar(&self) -> Option<&str> {
        configured(&self.node_registrar)
    }

    pub fn liveness_probe(&self) -> Option<&str> {
        configured(&self.liveness_probe)
    }
}

/// Empty image strings mean "not deployed"
fn configured(image: &Option<String>) -> Option<&str> {
    image.as_deref().filter(|s| !s.is_empty())
}

/// Operator configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Default driver image
    #[serde(default)]
    pub driver_image: Option<String>,

    /// Sidecar sets keyed by cluster identifier (e.g. "k8s-1.13", "ocp-3.11")
    #[serde(default)]
    pub sidecars: BTreeMap<String, SidecarSet>,
}

impl OperatorConfig {
    /// Parse a configuration document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load the configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading operator config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Resolve the context for the cluster the operator runs in
    pub fn resolve(&self, cluster: &str) -> Result<ClusterContext> {
        let sidecars = self
            .sidecars
            .get(cluster)
            .cloned()
            .ok_or_else(|| Error::UnknownCluster {
                cluster: cluster.to_string(),
            })?;

        let mut ctx = ClusterContext::new(cluster, sidecars);
        if let Some(image) = configured(&self.driver_image) {
            ctx.driver_image = image.to_string();
        }
        Ok(ctx)
    }
}

// =============================================================================
// Cluster Context
// =============================================================================

/// Everything the assemblers need to know about the running cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterContext {
    /// Raw cluster identifier
    pub cluster: String,
    /// Flavor derived from the identifier
    pub flavor: ClusterFlavor,
    /// Sidecar set for this cluster
    pub sidecars: SidecarSet,
    /// Negotiated CSI spec version as a number
    pub csi_spec: f64,
    /// Default driver image
    pub driver_image: String,
}

impl ClusterContext {
    /// Build a context for a cluster identifier and its sidecar set
    pub fn new(cluster: &str, sidecars: SidecarSet) -> Self {
        let flavor = ClusterFlavor::from_cluster_id(cluster);
        let csi_spec = parse_csi_spec(&sidecars.csi_spec_version);

        info!(
            "Cluster {} resolved: flavor={}, csi_spec={}",
            cluster, flavor, csi_spec
        );

        Self {
            cluster: cluster.to_string(),
            flavor,
            sidecars,
            csi_spec,
            driver_image: DEFAULT_DRIVER_IMAGE.to_string(),
        }
    }

    /// Spec version string handed to the driver as X_CSI_SPEC_VERSION
    pub fn csi_spec_version(&self) -> &str {
        &self.sidecars.csi_spec_version
    }
}

fn parse_csi_spec(version: &str) -> f64 {
    match version.trim().parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            warn!(
                "Unable to parse CSI spec version {:?}, assuming {}",
                version, DEFAULT_CSI_SPEC
            );
            DEFAULT_CSI_SPEC
        }
    }
}
