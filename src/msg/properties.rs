//! Per-entity property index.
//!
//! Every entity storage holds a `__properties_version1.0` stream: a header
//! whose size depends on the kind of entity, then one 16-byte record per
//! property. Fixed-width values sit in the record's 8-byte slot. Everything
//! else lives in a `__substg1.0_XXXXYYYY` stream next to it.

use super::tag::{PropertyTag, PropertyType};
use crate::common::error::PropertyError;
use crate::ole::binary::read_u32_le;
use crate::ole::{ByteStore, DirectoryEntry, OleError, join_path};
use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the fixed-value table stream
pub const PROPERTIES_STREAM: &str = "__properties_version1.0";

const RECORD_SIZE: usize = 16;
const SLOT_OFFSET: usize = 8;
const SLOT_SIZE: usize = 8;

bitflags! {
    /// Access flags of a property record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u32 {
        const MANDATORY = 0x0000_0001;
        const READABLE = 0x0000_0002;
        const WRITABLE = 0x0000_0004;
    }
}

/// The kind of storage an entity occupies, which fixes its header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// The top-level message at the container root
    Message,
    /// A message stored inside an attachment
    EmbeddedMessage,
    Attachment,
    Recipient,
}

impl EntityKind {
    /// Size of the properties stream header for this kind.
    pub const fn header_size(self) -> usize {
        match self {
            EntityKind::Message => 32,
            EntityKind::EmbeddedMessage => 24,
            EntityKind::Attachment | EntityKind::Recipient => 8,
        }
    }

    #[inline]
    pub const fn is_message(self) -> bool {
        matches!(self, EntityKind::Message | EntityKind::EmbeddedMessage)
    }
}

/// Bookkeeping carried by message headers. Stays zeroed for attachments and
/// recipients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesHeader {
    pub next_recipient_id: u32,
    pub next_attachment_id: u32,
    pub recipient_count: u32,
    pub attachment_count: u32,
}

impl PropertiesHeader {
    fn parse(kind: EntityKind, data: &[u8]) -> Result<Self, PropertyError> {
        if !kind.is_message() {
            return Ok(Self::default());
        }
        let read = |offset| read_u32_le(data, offset).map_err(PropertyError::from);
        Ok(Self {
            next_recipient_id: read(8)?,
            next_attachment_id: read(12)?,
            recipient_count: read(16)?,
            attachment_count: read(20)?,
        })
    }
}

/// A record of the properties stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedProperty {
    pub tag: PropertyTag,
    pub flags: PropertyFlags,
    /// The whole 8-byte value slot
    pub slot: Bytes,
}

/// Where the value of a stored property can be read.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyLocation {
    /// Held in the properties stream slot
    Inline(FixedProperty),
    /// Held in its own value stream
    Stream(PropertyTag),
}

impl PropertyLocation {
    pub fn tag(&self) -> PropertyTag {
        match self {
            PropertyLocation::Inline(fixed) => fixed.tag,
            PropertyLocation::Stream(tag) => *tag,
        }
    }
}

/// The properties stored on one entity.
#[derive(Debug, Clone, Default)]
pub struct PropertyIndex {
    header: PropertiesHeader,
    fixed: Vec<FixedProperty>,
    streams: Vec<PropertyTag>,
}

impl PropertyIndex {
    /// Read the properties stream and list the value streams of the entity
    /// storage at `path`.
    pub fn build<S: ByteStore + ?Sized>(store: &S, path: &[&str], kind: EntityKind) -> Result<Self, PropertyError> {
        let listing = store.list_entries(path)?;

        let mut stream_path = path.to_vec();
        stream_path.push(PROPERTIES_STREAM);
        let table = match store.open_stream(&stream_path) {
            Ok(data) => Some(data),
            Err(OleError::StreamNotFound(_)) => {
                debug!(path = %join_path(path), "entity has no properties stream");
                None
            },
            Err(err) => return Err(err.into()),
        };

        let index = Self::parse(kind, table.as_ref(), &listing)?;
        debug!(
            path = %join_path(path),
            fixed = index.fixed.len(),
            streams = index.streams.len(),
            "indexed entity properties"
        );
        Ok(index)
    }

    /// Build from the raw properties stream (if any) and the entity's
    /// directory listing.
    pub fn parse(kind: EntityKind, table: Option<&Bytes>, listing: &[DirectoryEntry]) -> Result<Self, PropertyError> {
        let mut index = Self::default();

        if let Some(table) = table {
            let header_size = kind.header_size();
            if table.len() < header_size {
                return Err(PropertyError::ContainerCorrupt(format!(
                    "properties stream of {} bytes is shorter than its {}-byte header",
                    table.len(),
                    header_size
                )));
            }
            let body = table.len() - header_size;
            if body % RECORD_SIZE != 0 {
                return Err(PropertyError::ContainerCorrupt(format!(
                    "properties stream ends inside a record ({} trailing bytes)",
                    body % RECORD_SIZE
                )));
            }

            index.header = PropertiesHeader::parse(kind, &table[..header_size])?;
            for start in (header_size..table.len()).step_by(RECORD_SIZE) {
                let tag = PropertyTag(read_u32_le(table, start)?);
                let flags = PropertyFlags::from_bits_retain(read_u32_le(table, start + 4)?);
                // Records of variable-width types only carry a size
                if tag.prop_type().fixed_width().is_none() {
                    continue;
                }
                let slot_start = start + SLOT_OFFSET;
                index.fixed.push(FixedProperty {
                    tag,
                    flags,
                    slot: table.slice(slot_start..slot_start + SLOT_SIZE),
                });
            }
        }

        index.streams = listing
            .iter()
            .filter(|entry| entry.is_stream())
            .filter_map(|entry| PropertyTag::from_stream_name(&entry.name))
            .collect();

        Ok(index)
    }

    pub fn header(&self) -> &PropertiesHeader {
        &self.header
    }

    /// Find the stored property answering `request`.
    ///
    /// A request of unspecified type matches any stored type for its id.
    /// Inline values win over streams. Among streams a wide string is
    /// preferred over a narrow one.
    pub fn locate(&self, request: PropertyTag) -> Option<PropertyLocation> {
        if let Some(fixed) = self.fixed.iter().find(|fixed| request.matches(fixed.tag)) {
            return Some(PropertyLocation::Inline(fixed.clone()));
        }

        self.streams
            .iter()
            .copied()
            .filter(|&tag| request.matches(tag))
            .min_by_key(|tag| stream_preference(tag.prop_type()))
            .map(PropertyLocation::Stream)
    }

    /// Every stored tag, inline values first.
    pub fn tags(&self) -> impl Iterator<Item = PropertyTag> + '_ {
        self.fixed.iter().map(|fixed| fixed.tag).chain(self.streams.iter().copied())
    }

    pub fn fixed(&self) -> &[FixedProperty] {
        &self.fixed
    }
}

fn stream_preference(prop_type: PropertyType) -> u8 {
    match prop_type {
        PropertyType::UNICODE => 0,
        PropertyType::STRING8 => 1,
        _ => 2,
    }
}
