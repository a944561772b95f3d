//! Domain Types - Core value types shared by the manifest assemblers
//!
//! These types are resolved once at the boundary (CLI, CRD, startup config)
//! so the assemblers never branch on raw strings.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Deployment Mode
// =============================================================================

/// Which side of the CSI driver a workload runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Controller,
    Node,
}

impl DeploymentMode {
    /// Both modes, in the order the reconciler deploys them
    pub const ALL: [DeploymentMode; 2] = [DeploymentMode::Controller, DeploymentMode::Node];

    /// Value of the driver's CSI_MODE variable
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Controller => "controller",
            DeploymentMode::Node => "node",
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "controller" => Ok(DeploymentMode::Controller),
            "node" => Ok(DeploymentMode::Node),
            _ => Err(Error::InvalidDeploymentMode(s.to_string())),
        }
    }
}

// =============================================================================
// Cluster Flavor
// =============================================================================

/// Orchestrator flavor, which decides the kubelet directory layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterFlavor {
    /// OpenShift 3.x: volumes live under the origin local-volumes directory
    Legacy,
    /// Kubernetes and OpenShift >= 4: unified kubelet root
    #[default]
    Default,
}

impl ClusterFlavor {
    /// Resolve the flavor from a cluster identifier such as `ocp-3.11` or `k8s-1.13`
    pub fn from_cluster_id(cluster: &str) -> Self {
        if cluster.contains("ocp-3") {
            ClusterFlavor::Legacy
        } else {
            ClusterFlavor::Default
        }
    }
}

impl std::fmt::Display for ClusterFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterFlavor::Legacy => write!(f, "legacy"),
            ClusterFlavor::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Config Value
// =============================================================================

/// A configuration field that users may write as a mapping or as a string
/// (which itself may hold JSON).
///
/// Any other JSON shape still deserializes, into `Unsupported`, so that a
/// single odd field is dropped during normalization instead of failing the
/// whole resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Mapping(serde_json::Map<String, serde_json::Value>),
    Text(String),
    Unsupported(serde_json::Value),
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Text(s)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => ConfigValue::Mapping(map),
            serde_json::Value::String(s) => ConfigValue::Text(s),
            other => ConfigValue::Unsupported(other),
        }
    }
}
