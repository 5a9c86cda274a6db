/// Little-endian readers
pub mod binary;

/// Strict narrow/wide string decoding
pub mod codepage;

/// Constants for OLE file format
pub mod consts;

/// Main OLE file parsing implementation
mod file;

/// Stream/storage access trait shared by the property layers
mod store;

/// Compound file builder used to produce test fixtures
#[cfg(test)]
pub(crate) mod builder;

// Re-export public types for convenient access
pub use file::{is_ole_file, CompoundFile, DirectoryEntry, EntryKind, OleError};
pub(crate) use file::join_path;
pub use store::ByteStore;
