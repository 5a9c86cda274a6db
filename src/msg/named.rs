//! Named property mapping.
//!
//! The `__nameid_version1.0` storage at the container root records, for every
//! named property used anywhere in the container, the property set and the
//! name or numeric id it was authored with, and the index it was assigned.
//! Property id `0x8000 + index` is what the entity streams are keyed with.
//!
//! The mapping is parsed once into a [`NamedPropertyMap`] and consulted from
//! memory afterwards.

use super::guid::{PS_MAPI, PS_PUBLIC_STRINGS, PropertySetId};
use super::tag::{Discriminator, NamedPropertyKey, PropertyTag, PropertyType};
use crate::common::error::PropertyError;
use crate::ole::codepage::decode_utf16le;
use crate::ole::{ByteStore, OleError};
use std::collections::HashMap;
use tracing::debug;
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Storage holding the mapping streams
pub const NAMEID_STORAGE: &str = "__nameid_version1.0";
/// Packed 16-byte GUIDs referenced by index 3 and up
pub const GUID_STREAM: &str = "__substg1.0_00020102";
/// 8-byte mapping records
pub const ENTRY_STREAM: &str = "__substg1.0_00030102";
/// Length-prefixed UTF-16LE property names
pub const STRING_STREAM: &str = "__substg1.0_00040102";

const ENTRY_SIZE: usize = 8;
const GUID_SIZE: usize = 16;
/// GUID indexes below this refer to fixed sets rather than the GUID stream
const FIRST_STREAM_GUID_INDEX: usize = 3;

/// One record of the entry stream.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawNameEntry {
    /// Numeric name, or offset into the string stream
    name_or_offset: U32<LE>,
    /// Bit 0: string name flag. Bits 1..15: GUID index.
    kind_and_guid: U16<LE>,
    prop_index: U16<LE>,
}

impl RawNameEntry {
    fn is_string(&self) -> bool {
        self.kind_and_guid.get() & 1 == 1
    }

    fn guid_index(&self) -> usize {
        (self.kind_and_guid.get() >> 1) as usize
    }

    fn tag(&self) -> PropertyTag {
        let id = PropertyTag::FIRST_NAMED_ID.wrapping_add(self.prop_index.get());
        PropertyTag::new(id, PropertyType::UNSPECIFIED)
    }
}

/// Resolution of [`NamedPropertyKey`]s to property tags for one container.
#[derive(Debug, Clone, Default)]
pub struct NamedPropertyMap {
    by_key: HashMap<NamedPropertyKey, PropertyTag>,
    /// Mapping records in stream order
    entries: Vec<(NamedPropertyKey, PropertyTag)>,
}

impl NamedPropertyMap {
    /// A map with no records, as for a container without a mapping storage.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the mapping storage from the root of `store`.
    pub fn load<S: ByteStore + ?Sized>(store: &S) -> Result<Self, PropertyError> {
        if !store_has_mapping(store)? {
            debug!("container has no named property mapping");
            return Ok(Self::empty());
        }
        let guids = optional_stream(store, GUID_STREAM)?;
        let entries = optional_stream(store, ENTRY_STREAM)?;
        let strings = optional_stream(store, STRING_STREAM)?;

        let map = Self::parse(&guids, &entries, &strings)?;
        debug!(
            mappings = map.len(),
            guids = guids.len() / GUID_SIZE,
            "parsed named property mapping"
        );
        Ok(map)
    }

    /// Build a map from the three mapping streams.
    pub fn parse(guids: &[u8], entries: &[u8], strings: &[u8]) -> Result<Self, PropertyError> {
        if guids.len() % GUID_SIZE != 0 {
            return Err(corrupt(format!("GUID stream length {} is not a multiple of 16", guids.len())));
        }
        if entries.len() % ENTRY_SIZE != 0 {
            return Err(corrupt(format!("entry stream length {} is not a multiple of 8", entries.len())));
        }

        let guid_table: Vec<PropertySetId> = guids
            .chunks_exact(GUID_SIZE)
            .map(|chunk| {
                let mut bytes = [0u8; GUID_SIZE];
                bytes.copy_from_slice(chunk);
                PropertySetId::from_bytes(bytes)
            })
            .collect();

        let mut map = Self::default();
        for (position, record) in entries.chunks_exact(ENTRY_SIZE).enumerate() {
            let raw = RawNameEntry::read_from_bytes(record)
                .map_err(|_| corrupt(format!("unreadable mapping record {}", position)))?;

            let set = match raw.guid_index() {
                1 => PS_MAPI,
                2 => PS_PUBLIC_STRINGS,
                index if index >= FIRST_STREAM_GUID_INDEX => *guid_table
                    .get(index - FIRST_STREAM_GUID_INDEX)
                    .ok_or_else(|| {
                        corrupt(format!(
                            "mapping record {} references GUID {} of {}",
                            position,
                            index,
                            guid_table.len()
                        ))
                    })?,
                _ => return Err(corrupt(format!("mapping record {} has GUID index 0", position))),
            };

            let discriminator = if raw.is_string() {
                Discriminator::Name(read_name(strings, raw.name_or_offset.get() as usize)?)
            } else {
                Discriminator::Id(raw.name_or_offset.get())
            };

            map.insert(NamedPropertyKey { set, discriminator }, raw.tag());
        }
        Ok(map)
    }

    fn insert(&mut self, key: NamedPropertyKey, tag: PropertyTag) {
        // Duplicate keys keep their first assignment
        if self.by_key.contains_key(&key) {
            debug!(key = %key, tag = %tag, "ignoring duplicate named property record");
            return;
        }
        self.by_key.insert(key.clone(), tag);
        self.entries.push((key, tag));
    }

    /// Resolve a key to its tag. The returned tag has an unspecified type.
    ///
    /// Keys in [`PS_MAPI`] address standard properties and never consult the
    /// mapping records; see [`standard_tag`].
    pub fn resolve(&self, key: &NamedPropertyKey) -> Option<PropertyTag> {
        if key.set == PS_MAPI {
            return standard_tag(key);
        }
        self.by_key.get(key).copied()
    }

    /// The key a named property id was assigned to.
    pub fn key_for(&self, tag: PropertyTag) -> Option<&NamedPropertyKey> {
        self.entries
            .iter()
            .find(|(_, mapped)| mapped.id() == tag.id())
            .map(|(key, _)| key)
    }

    /// All mapping records in stream order.
    pub fn iter(&self) -> impl Iterator<Item = (&NamedPropertyKey, PropertyTag)> + '_ {
        self.entries.iter().map(|(key, tag)| (key, *tag))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The tag a [`PS_MAPI`] key names directly.
///
/// A numeric discriminator up to `0xFFFF` is a property id and matches any
/// stored type; a larger one is a complete tag. String names have no
/// standard meaning.
pub fn standard_tag(key: &NamedPropertyKey) -> Option<PropertyTag> {
    if key.set != PS_MAPI {
        return None;
    }
    match key.discriminator {
        Discriminator::Id(id) => Some(match u16::try_from(id) {
            Ok(id) => PropertyTag::new(id, PropertyType::UNSPECIFIED),
            Err(_) => PropertyTag(id),
        }),
        Discriminator::Name(_) => None,
    }
}

fn store_has_mapping<S: ByteStore + ?Sized>(store: &S) -> Result<bool, PropertyError> {
    match store.list_entries(&[NAMEID_STORAGE]) {
        Ok(_) => Ok(true),
        Err(OleError::StreamNotFound(_)) => Ok(false),
        Err(OleError::NotAStorage(_)) => Err(corrupt(format!("{} is not a storage", NAMEID_STORAGE))),
        Err(err) => Err(err.into()),
    }
}

fn optional_stream<S: ByteStore + ?Sized>(store: &S, name: &str) -> Result<bytes::Bytes, PropertyError> {
    match store.open_stream(&[NAMEID_STORAGE, name]) {
        Ok(data) => Ok(data),
        Err(OleError::StreamNotFound(_)) => Ok(bytes::Bytes::new()),
        Err(err) => Err(err.into()),
    }
}

fn read_name(strings: &[u8], offset: usize) -> Result<String, PropertyError> {
    let length = strings
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
        .ok_or_else(|| corrupt(format!("string offset {} is past the end of the string stream", offset)))?;
    let start = offset + 4;
    let bytes = start
        .checked_add(length)
        .and_then(|end| strings.get(start..end))
        .ok_or_else(|| corrupt(format!("name at offset {} overruns the string stream", offset)))?;
    decode_utf16le(bytes).map_err(|err| corrupt(format!("name at offset {}: {}", offset, err)))
}

fn corrupt(reason: String) -> PropertyError {
    PropertyError::ContainerCorrupt(format!("named property mapping: {}", reason))
}
