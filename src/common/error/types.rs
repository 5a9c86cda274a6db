//! Unified error types for the crate.
//!
//! [`PropertyError`] is what property resolution reports and what the
//! resolution cache remembers, so it is `Clone`. [`Error`] additionally covers
//! opening a container, where I/O failures can occur.
use crate::msg::{PropertyKey, PropertyTag, PropertyType};
use thiserror::Error;

/// Outcome of a failed property resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The compound file, the mapping streams or the properties stream are
    /// malformed. Fatal for the affected entity.
    #[error("Corrupted container: {0}")]
    ContainerCorrupt(String),

    /// The entity stores no value for the property. Expected for optional
    /// properties.
    #[error("Property not found: {0}")]
    PropertyNotFound(PropertyKey),

    /// Bytes are present but inconsistent with the requested type
    #[error("Cannot decode {tag} as {as_type}: {reason}")]
    DecodeError {
        tag: PropertyTag,
        as_type: PropertyType,
        reason: String,
    },
}

impl PropertyError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, PropertyError::PropertyNotFound(_))
    }

    pub(crate) fn decode(tag: PropertyTag, as_type: PropertyType, reason: impl Into<String>) -> Self {
        PropertyError::DecodeError {
            tag,
            as_type,
            reason: reason.into(),
        }
    }
}

/// Main error type for crate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a compound file
    #[error("Not a valid OLE file")]
    NotOleFile,

    /// Invalid file format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Corrupted or malformed file
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// Stream or storage not found
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    /// Property resolution failure
    #[error(transparent)]
    Property(#[from] PropertyError),
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;
