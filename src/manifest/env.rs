//! Environment Assembler
//!
//! Builds the driver container's environment. Entries are only ever
//! appended: when the resource overrides a default (CSI_ENDPOINT, CSI_MODE,
//! X_CSI_NODE_ID) both entries are emitted and the later one wins inside the
//! container.

use crate::config::ClusterContext;
use crate::crd::EmberCSI;
use crate::domain::types::DeploymentMode;
use crate::manifest::normalize::normalize_opt;
use crate::manifest::topology::encode_topologies;
use crate::manifest::volumes::SYSTEM_FILES_DIR;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ObjectFieldSelector};

/// Socket the driver serves on unless overridden
pub const DEFAULT_CSI_ENDPOINT: &str = "unix:///csi-data/csi.sock";

fn literal(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn field_ref(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Default persistence: driver metadata stored as custom resources in the
/// instance namespace
pub fn default_persistence_config(namespace: &str) -> String {
    format!(r#"{{"storage":"crd","namespace":"{}"}}"#, namespace)
}

/// Construct the driver environment for one deployment mode
pub fn generate_env_vars(ecsi: &EmberCSI, mode: DeploymentMode, ctx: &ClusterContext) -> Vec<EnvVar> {
    let mut env_vars = vec![
        literal("PYTHONUNBUFFERED", "0"),
        literal("CSI_ENDPOINT", DEFAULT_CSI_ENDPOINT),
        literal("X_CSI_SPEC_VERSION", ctx.csi_spec_version()),
    ];

    match mode {
        DeploymentMode::Controller => {
            env_vars.push(field_ref("KUBE_NODE_NAME", "spec.nodeName"));
            env_vars.push(literal("CSI_MODE", mode.as_str()));
            if ecsi.has_topologies() {
                env_vars.push(literal(
                    "X_CSI_TOPOLOGIES",
                    encode_topologies(&ecsi.spec.topologies),
                ));
            }
        }
        DeploymentMode::Node => {
            env_vars.push(field_ref("X_CSI_NODE_ID", "spec.nodeName"));
            env_vars.push(literal("CSI_MODE", mode.as_str()));
        }
    }

    let overrides = &ecsi.spec.config.env_vars;

    let ember_config = normalize_opt(overrides.ember_config.as_ref());
    if !ember_config.is_empty() {
        env_vars.push(literal("X_CSI_EMBER_CONFIG", ember_config));
    }

    let backend_config = normalize_opt(overrides.backend_config.as_ref());
    if !backend_config.is_empty() {
        env_vars.push(literal("X_CSI_BACKEND_CONFIG", backend_config));
    }

    let mut persistence_config = normalize_opt(overrides.persistence_config.as_ref());
    if persistence_config.is_empty() {
        persistence_config = default_persistence_config(&ecsi.instance_namespace());
    }
    env_vars.push(literal("X_CSI_PERSISTENCE_CONFIG", persistence_config));

    let debug_mode = normalize_opt(overrides.debug_mode.as_ref());
    if !debug_mode.is_empty() {
        env_vars.push(literal("X_CSI_DEBUG_MODE", debug_mode));
    }

    let plain = [
        ("X_CSI_ABORT_DUPLICATES", &overrides.abort_duplicates),
        ("X_CSI_DEFAULT_MOUNT_FS", &overrides.default_mount_fs),
        ("X_CSI_NODE_ID", &overrides.node_id),
        ("X_CSI_STORAGE_NW_IP", &overrides.storage_nw_ip),
        ("CSI_ENDPOINT", &overrides.csi_endpoint),
        ("CSI_MODE", &overrides.csi_mode),
    ];
    for (name, value) in plain {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            env_vars.push(literal(name, value));
        }
    }

    if let Some(sys_files) = ecsi.system_files() {
        env_vars.push(literal(
            "X_CSI_SYSTEM_FILES",
            format!("{}/{}", SYSTEM_FILES_DIR, sys_files.key),
        ));
    }

    env_vars
}
