//! Property access for MSG containers.
//!
//! The layers, leaves first:
//!
//! - [`tag`] and [`guid`]: how properties are addressed
//! - [`named`]: translating named keys to tags through the container's
//!   name mapping
//! - [`properties`]: where an entity stores each of its values
//! - [`decode`]: turning stored bytes into typed values
//! - [`cache`] and [`entity`]: resolve once, remember the outcome
//! - [`task`]: task items on top of the above

pub mod cache;
pub mod decode;
pub mod entity;
pub mod guid;
pub mod named;
mod options;
pub mod properties;
pub mod tag;
#[cfg(feature = "task")]
pub mod task;

pub use cache::{PropertyCache, PropertyRequest, SlotState};
pub use decode::{CodeDecoder, CodeValue, Coded, DecodedValue, PropertyCode, RawCode, RawPropertyValue, Timestamp};
pub use entity::{Entity, OptionalProperty};
pub use guid::{
    PS_INTERNET_HEADERS, PS_MAPI, PS_PUBLIC_STRINGS, PSETID_ADDRESS, PSETID_APPOINTMENT, PSETID_COMMON, PSETID_LOG,
    PSETID_MEETING, PSETID_NOTE, PSETID_TASK, PropertySetId,
};
pub use named::NamedPropertyMap;
pub use options::EntityOptions;
pub use properties::{EntityKind, PropertiesHeader, PropertyIndex};
pub use tag::{Discriminator, NamedPropertyKey, PropertyKey, PropertyTag, PropertyType};
#[cfg(feature = "task")]
pub use task::{Task, TaskAcceptance, TaskHistory, TaskMode, TaskOwnership, TaskStatus};
