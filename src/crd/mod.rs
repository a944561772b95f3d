//! Custom Resource Definitions for the Ember CSI Operator
//!
//! - EmberCSI: one driver deployment (controller + node workloads)

pub mod ember_csi;

pub use ember_csi::*;
