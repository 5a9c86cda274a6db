//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from internal
//! error types to the unified Error type.

use super::types::{Error, PropertyError};
use crate::ole::OleError;

impl From<OleError> for Error {
    fn from(err: OleError) -> Self {
        match err {
            OleError::Io(e) => Error::Io(e),
            OleError::NotOleFile => Error::NotOleFile,
            OleError::InvalidFormat(s) => Error::InvalidFormat(s),
            OleError::CorruptedFile(s) => Error::CorruptedFile(s),
            OleError::StreamNotFound(s) | OleError::NotAStream(s) | OleError::NotAStorage(s) => {
                Error::ComponentNotFound(s)
            },
        }
    }
}

/// Container failures met while resolving a property.
///
/// Callers that can tell "absent" from "broken" (a missing value stream)
/// handle [`OleError::StreamNotFound`] before converting; anything reaching
/// this conversion means the container does not look the way it must.
impl From<OleError> for PropertyError {
    fn from(err: OleError) -> Self {
        PropertyError::ContainerCorrupt(err.to_string())
    }
}
