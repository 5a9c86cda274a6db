//! Unified error types for the crate.
//!
//! Container-level failures ([`crate::ole::OleError`]) and property resolution
//! failures ([`PropertyError`]) are presented through one [`Error`] type.

// Submodule declarations
pub mod conversions;
pub mod types;

// Re-exports
pub use types::{Error, PropertyError, Result};
