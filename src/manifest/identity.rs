//! Plugin Identity Resolver
//!
//! CSI drivers registered with reverse domain names before spec 1.0 and with
//! forward domain names since.

use tracing::info;

/// Prefix for pre-1.0 plugin names
pub const REVERSE_DOMAIN: &str = "io.ember-csi";

/// Suffix for 1.0+ plugin names
pub const FORWARD_DOMAIN: &str = "ember-csi.io";

/// Registration name of the driver for an instance
pub fn plugin_domain_name(instance_name: &str, csi_spec: f64) -> String {
    if csi_spec < 1.0 {
        info!("CSI Spec is < 1.0 using reverse domain plugin name");
        format!("{}.{}", REVERSE_DOMAIN, instance_name)
    } else {
        info!("CSI Spec is >= 1.0 using forward domain plugin name");
        format!("{}.{}", instance_name, FORWARD_DOMAIN)
    }
}
