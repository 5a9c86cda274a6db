//! Oxmsg - typed property access for Outlook MSG files
//!
//! MSG files are OLE2 compound files. Every message, attachment and recipient
//! is a storage whose properties live in a fixed-value table and in one stream
//! per variable-width value. Named properties are addressed by a property set
//! GUID plus a name or number, and translated to per-file tags through a
//! mapping stored at the root.
//!
//! # Features
//!
//! - **Compound file reader**: In-memory OLE2 parsing with corruption checks
//! - **Named property resolution**: The name mapping is parsed once per file
//! - **Typed decoding**: Integers, booleans, floats, timestamps, strings, codes
//! - **Resolution cache**: Each property is read and decoded at most once per
//!   entity, failures included
//!
//! # Example
//!
//! ```no_run
//! use oxmsg::msg::{Entity, PropertyTag, Task};
//! use oxmsg::ole::CompoundFile;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = Arc::new(CompoundFile::open_path("task.msg")?);
//! let message = Entity::message(file);
//! println!("Subject: {}", message.text(PropertyTag::SUBJECT)?);
//!
//! let task = Task::new(message);
//! if let Some(status) = task.status()? {
//!     println!("Status: {}", status);
//! }
//! if let Some(done) = task.percent_complete()? {
//!     println!("Done: {:.0}%", done * 100.0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Low-level OLE access
//!
//! ```no_run
//! use oxmsg::ole::{ByteStore, CompoundFile};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = CompoundFile::open_path("message.msg")?;
//! for stream in file.list_streams() {
//!     println!("Stream: {}", stream.join("/"));
//! }
//! let data = file.open_stream(&["__properties_version1.0"])?;
//! println!("Property table: {} bytes", data.len());
//! # Ok(())
//! # }
//! ```

/// Shared error types
pub mod common;

/// MSG property layers: addressing, name mapping, decoding and caching
pub mod msg;

/// OLE2 compound file reader
///
/// Parses the structured storage container that MSG files are built on and
/// exposes it through the [`ole::ByteStore`] trait.
pub mod ole;

pub use common::{Error, PropertyError, Result};
pub use msg::{Entity, EntityOptions, PropertyKey, PropertyTag};
