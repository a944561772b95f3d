//! Domain Module
//!
//! Core value types shared across the operator.

pub mod types;

pub use types::*;
