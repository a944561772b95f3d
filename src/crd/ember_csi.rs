//! EmberCSI CRD
//!
//! Describes one Ember CSI driver deployment: which backend it talks to, how
//! the driver process is configured, and which topologies it serves.

use crate::domain::types::ConfigValue;
use kube::{CustomResource, ResourceExt};
use schemars::gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// EmberCSI CRD
// =============================================================================

/// EmberCSI deploys an Ember CSI driver as a controller workload and a
/// per-node workload.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ember-csi.io",
    version = "v1alpha1",
    kind = "EmberCSI",
    plural = "embercsis",
    shortname = "ecsi",
    printcolumn = r#"{"name": "Image", "type": "string", "jsonPath": ".spec.image"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EmberCSISpec {
    /// Driver image; the operator default is used when unset
    #[serde(default)]
    pub image: Option<String>,

    /// Driver configuration
    #[serde(default)]
    pub config: EmberCSIConfig,

    /// Accessible topologies, in the order the driver should report them
    #[serde(default)]
    pub topologies: Vec<TopologySpec>,

    /// Node selector for the node workload
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Driver configuration block
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmberCSIConfig {
    /// Environment overrides for the driver process
    #[serde(default)]
    pub env_vars: EnvVarsSpec,

    /// Secret holding extra system files (e.g. Ceph keyrings) for the driver
    #[serde(default)]
    pub sys_files: Option<SysFilesSpec>,
}

/// Driver environment overrides, keyed by the variable they set
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EnvVarsSpec {
    #[serde(rename = "X_CSI_EMBER_CONFIG", default)]
    #[schemars(schema_with = "any_shape_schema")]
    pub ember_config: Option<ConfigValue>,

    #[serde(rename = "X_CSI_BACKEND_CONFIG", default)]
    #[schemars(schema_with = "any_shape_schema")]
    pub backend_config: Option<ConfigValue>,

    #[serde(rename = "X_CSI_PERSISTENCE_CONFIG", default)]
    #[schemars(schema_with = "any_shape_schema")]
    pub persistence_config: Option<ConfigValue>,

    #[serde(rename = "X_CSI_DEBUG_MODE", default)]
    #[schemars(schema_with = "any_shape_schema")]
    pub debug_mode: Option<ConfigValue>,

    #[serde(rename = "X_CSI_ABORT_DUPLICATES", default)]
    pub abort_duplicates: Option<String>,

    #[serde(rename = "X_CSI_DEFAULT_MOUNT_FS", default)]
    pub default_mount_fs: Option<String>,

    #[serde(rename = "X_CSI_NODE_ID", default)]
    pub node_id: Option<String>,

    #[serde(rename = "X_CSI_STORAGE_NW_IP", default)]
    pub storage_nw_ip: Option<String>,

    #[serde(rename = "CSI_ENDPOINT", default)]
    pub csi_endpoint: Option<String>,

    #[serde(rename = "CSI_MODE", default)]
    pub csi_mode: Option<String>,
}

/// Reference to a single key of a secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SysFilesSpec {
    /// Secret name
    pub name: String,
    /// Key within the secret to project
    pub key: String,
}

/// One set of topology constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TopologySpec {
    /// Topology key to value
    #[serde(default)]
    pub topology: BTreeMap<String, String>,
}

/// Schema for fields that accept a string or an arbitrary mapping
fn any_shape_schema(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

// =============================================================================
// Implementations
// =============================================================================

impl EmberCSI {
    /// Name of this driver instance
    pub fn instance_name(&self) -> String {
        self.name_any()
    }

    /// Namespace of this driver instance
    pub fn instance_namespace(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// System files reference, if one with a secret name is set
    pub fn system_files(&self) -> Option<&SysFilesSpec> {
        self.spec
            .config
            .sys_files
            .as_ref()
            .filter(|sys| !sys.name.is_empty())
    }

    /// Whether any topology constraint set is declared
    pub fn has_topologies(&self) -> bool {
        !self.spec.topologies.is_empty()
    }
}
