//! Feature-Flag Inspector
//!
//! Ember lists switched-off features under `Disabled` in X_CSI_EMBER_CONFIG.

use crate::error::{Error, Result};
use serde::Deserialize;
use tracing::debug;

/// Name of the snapshot feature in the Disabled list
pub const SNAPSHOT_FEATURE: &str = "snapshot";

#[derive(Debug, Default, Deserialize)]
struct EmberFeatures {
    #[serde(rename = "Disabled", default)]
    disabled: Vec<String>,
}

/// Whether `feature` is enabled by a normalized ember config.
///
/// A config that does not parse is an error: the caller must not guess.
pub fn is_feature_enabled(ember_config: &str, feature: &str) -> Result<bool> {
    let features: EmberFeatures =
        serde_json::from_str(ember_config).map_err(|source| Error::FeatureConfig {
            field: "X_CSI_EMBER_CONFIG".to_string(),
            source,
        })?;
    debug!("X_CSI_EMBER_CONFIG disabled features: {:?}", features.disabled);

    if features.disabled.iter().any(|d| d == feature) {
        debug!("Feature {} disabled via X_CSI_EMBER_CONFIG", feature);
        return Ok(false);
    }
    Ok(true)
}

/// Whether snapshots are enabled by a normalized ember config
pub fn is_snapshot_enabled(ember_config: &str) -> Result<bool> {
    is_feature_enabled(ember_config, SNAPSHOT_FEATURE)
}
