use super::file::{DirectoryEntry, OleError};
use bytes::Bytes;
use std::sync::Arc;

/// Read access to a tree of storages and streams.
///
/// Paths are slices of entry names starting below the root (the empty path
/// is the root storage). Streams are returned whole.
pub trait ByteStore {
    /// Return the exact contents of the stream at `path`.
    ///
    /// Fails with [`OleError::StreamNotFound`] when nothing exists at `path`
    /// and with [`OleError::NotAStream`] when `path` names a storage.
    fn open_stream(&self, path: &[&str]) -> Result<Bytes, OleError>;

    /// Enumerate the direct children of the storage at `path`.
    ///
    /// The order is stable for the lifetime of the store.
    fn list_entries(&self, path: &[&str]) -> Result<Vec<DirectoryEntry>, OleError>;
}

impl<S: ByteStore + ?Sized> ByteStore for Arc<S> {
    fn open_stream(&self, path: &[&str]) -> Result<Bytes, OleError> {
        (**self).open_stream(path)
    }

    fn list_entries(&self, path: &[&str]) -> Result<Vec<DirectoryEntry>, OleError> {
        (**self).list_entries(path)
    }
}

impl<S: ByteStore + ?Sized> ByteStore for &S {
    fn open_stream(&self, path: &[&str]) -> Result<Bytes, OleError> {
        (**self).open_stream(path)
    }

    fn list_entries(&self, path: &[&str]) -> Result<Vec<DirectoryEntry>, OleError> {
        (**self).list_entries(path)
    }
}
