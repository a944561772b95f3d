//! Error types for the Ember CSI Operator
//!
//! Manifest assembly is a pure function, so nearly every failure is a
//! configuration problem. The variants here are what the reconciler sees when
//! an assembly call or startup step gives up.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No sidecar configuration for cluster: {cluster}")]
    UnknownCluster { cluster: String },

    #[error("Invalid deployment mode: {0} (expected controller or node)")]
    InvalidDeploymentMode(String),

    // =========================================================================
    // Assembly Errors
    // =========================================================================
    #[error("Unable to parse {field} for feature flags: {source}")]
    FeatureConfig {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Io(_) => ErrorAction::RequeueWithBackoff,

            // Operator config may be remounted; check again later
            Error::UnknownCluster { .. } => ErrorAction::RequeueAfter(Duration::from_secs(300)),

            // The resource itself is wrong - wait for the user to change it
            Error::Configuration(_)
            | Error::InvalidDeploymentMode(_)
            | Error::FeatureConfig { .. }
            | Error::YamlParse(_) => ErrorAction::NoRequeue,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
