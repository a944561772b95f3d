//! Topology Encoder
//!
//! Renders the accessible topologies as the JSON array the driver reads
//! from X_CSI_TOPOLOGIES.

use crate::crd::TopologySpec;
use std::collections::BTreeMap;
use tracing::debug;

/// Encode topology constraint sets as `[{"key":"value",...},...]`.
///
/// Set order is preserved; keys inside a set come out sorted.
pub fn encode_topologies(topologies: &[TopologySpec]) -> String {
    debug!("Creating all known allowed_topologies array");

    let sets: Vec<&BTreeMap<String, String>> = topologies.iter().map(|t| &t.topology).collect();
    // Maps of strings always serialize
    serde_json::to_string(&sets).unwrap_or_else(|_| "[]".to_string())
}
