//! Entities: one message, attachment or recipient storage with lazily
//! resolved, cached properties.
//!
//! # Example
//!
//! ```no_run
//! use oxmsg::msg::{Entity, PropertyKey, PropertyTag, PSETID_TASK};
//! use oxmsg::ole::CompoundFile;
//! use std::sync::Arc;
//!
//! let file = Arc::new(CompoundFile::open_path("task.msg")?);
//! let message = Entity::message(file);
//! println!("{}", message.text(PropertyTag::SUBJECT)?);
//! let percent = message.percentage(PropertyKey::named(PSETID_TASK, 0x8102u32))?;
//! # let _ = percent;
//! # Ok::<(), oxmsg::common::Error>(())
//! ```

use super::cache::{PropertyCache, PropertyRequest, SlotState};
use super::decode::{
    CodeDecoder, Coded, DecodeContext, DecodedValue, PropertyCode, RawPropertyValue, Timestamp, decode,
};
use super::named::{NamedPropertyMap, standard_tag};
use super::options::EntityOptions;
use super::properties::{EntityKind, PropertiesHeader, PropertyIndex, PropertyLocation};
use super::tag::{PropertyKey, PropertyTag, PropertyType};
use crate::common::error::{Error, PropertyError, Result};
use crate::ole::binary::read_u32_le;
use crate::ole::{ByteStore, OleError, join_path};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage of an embedded message inside an attachment
pub const EMBEDDED_MESSAGE_STORAGE: &str = "__substg1.0_3701000D";

/// Name mapping shared by every entity of one container
type SharedNamedMap = Arc<OnceCell<std::result::Result<Arc<NamedPropertyMap>, PropertyError>>>;

/// One storage of a message container, interpreted as a property bag.
///
/// Everything is computed on first use and kept for the life of the entity:
/// the container's name mapping, the entity's property index, its code page
/// and every property outcome. The container is never read twice for the
/// same request.
#[derive(Debug)]
pub struct Entity<S: ByteStore> {
    scope: Arc<Scope<S>>,
    named: SharedNamedMap,
    cache: PropertyCache,
}

/// Where an entity lives and what it declares about itself. Children hold
/// their parent's scope, so a parent's code page is resolved once for all of
/// them.
#[derive(Debug)]
struct Scope<S: ByteStore> {
    store: Arc<S>,
    path: Vec<String>,
    kind: EntityKind,
    options: EntityOptions,
    index: OnceCell<std::result::Result<PropertyIndex, PropertyError>>,
    codepage: OnceCell<u32>,
    parent: Option<Arc<Scope<S>>>,
}

impl<S: ByteStore> Scope<S> {
    fn path_refs(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }

    fn display_path(&self) -> String {
        if self.path.is_empty() { "/".to_string() } else { self.path.join("/") }
    }

    fn index(&self) -> std::result::Result<&PropertyIndex, PropertyError> {
        self.index
            .get_or_init(|| PropertyIndex::build(self.store.as_ref(), &self.path_refs(), self.kind))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn codepage(&self) -> std::result::Result<u32, PropertyError> {
        let index = self.index()?;
        Ok(*self.codepage.get_or_init(|| {
            let declared = [PropertyTag::MESSAGE_CODEPAGE, PropertyTag::INTERNET_CPID]
                .into_iter()
                .find_map(|tag| match index.locate(tag) {
                    Some(PropertyLocation::Inline(fixed)) => read_u32_le(&fixed.slot, 0).ok().filter(|&cp| cp != 0),
                    _ => None,
                });
            let (codepage, source) = match declared {
                Some(codepage) => (codepage, "declared"),
                None => match self.parent.as_ref().and_then(|parent| parent.codepage().ok()) {
                    Some(codepage) => (codepage, "parent"),
                    None => (self.options.default_codepage, "default"),
                },
            };
            debug!(path = %self.display_path(), codepage, source, "entity code page");
            codepage
        }))
    }
}

impl<S: ByteStore> Entity<S> {
    /// The top-level message at the container root.
    pub fn message(store: Arc<S>) -> Self {
        Self::message_with_options(store, EntityOptions::default())
    }

    pub fn message_with_options(store: Arc<S>, options: EntityOptions) -> Self {
        let scope = Scope {
            store,
            path: Vec::new(),
            kind: EntityKind::Message,
            options,
            index: OnceCell::new(),
            codepage: OnceCell::new(),
            parent: None,
        };
        Self::new(scope, Arc::default())
    }

    fn new(scope: Scope<S>, named: SharedNamedMap) -> Self {
        Self {
            scope: Arc::new(scope),
            named,
            cache: PropertyCache::new(),
        }
    }

    /// The attachment stored as `__attach_version1.0_#NNNNNNNN` under this
    /// message.
    pub fn attachment(&self, number: u32) -> Result<Self> {
        self.child(format!("__attach_version1.0_#{:08X}", number), EntityKind::Attachment)
    }

    /// The recipient stored as `__recip_version1.0_#NNNNNNNN` under this
    /// message.
    pub fn recipient(&self, number: u32) -> Result<Self> {
        self.child(format!("__recip_version1.0_#{:08X}", number), EntityKind::Recipient)
    }

    /// The message embedded in this attachment.
    pub fn embedded_message(&self) -> Result<Self> {
        if self.scope.kind != EntityKind::Attachment {
            return Err(Error::InvalidFormat(format!(
                "{:?} entity at {} cannot hold an embedded message",
                self.scope.kind,
                self.scope.display_path()
            )));
        }
        self.child(EMBEDDED_MESSAGE_STORAGE.to_string(), EntityKind::EmbeddedMessage)
    }

    /// A child entity. It shares this entity's name mapping and falls back to
    /// this entity's code page when it declares none of its own.
    fn child(&self, name: String, kind: EntityKind) -> Result<Self> {
        if !self.scope.kind.is_message() && kind != EntityKind::EmbeddedMessage {
            return Err(Error::InvalidFormat(format!(
                "{:?} entity at {} has no {:?} children",
                self.scope.kind,
                self.scope.display_path(),
                kind
            )));
        }

        let mut path = self.scope.path.clone();
        path.push(name);
        let refs: Vec<&str> = path.iter().map(String::as_str).collect();
        match self.scope.store.list_entries(&refs) {
            Ok(_) => {},
            Err(OleError::StreamNotFound(_)) => return Err(Error::ComponentNotFound(join_path(&refs))),
            Err(err) => return Err(err.into()),
        }

        let scope = Scope {
            store: Arc::clone(&self.scope.store),
            path,
            kind,
            options: self.scope.options.clone(),
            index: OnceCell::new(),
            codepage: OnceCell::new(),
            parent: Some(Arc::clone(&self.scope)),
        };
        Ok(Self::new(scope, Arc::clone(&self.named)))
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.scope.kind
    }

    /// Storage names from the container root to this entity.
    pub fn path(&self) -> &[String] {
        &self.scope.path
    }

    pub fn options(&self) -> &EntityOptions {
        &self.scope.options
    }

    pub fn store(&self) -> &Arc<S> {
        &self.scope.store
    }

    /// The container's name mapping, parsed on first use.
    pub fn named_map(&self) -> std::result::Result<Arc<NamedPropertyMap>, PropertyError> {
        self.named
            .get_or_init(|| NamedPropertyMap::load(self.scope.store.as_ref()).map(Arc::new))
            .clone()
    }

    /// This entity's property index, built on first use.
    pub fn index(&self) -> std::result::Result<&PropertyIndex, PropertyError> {
        self.scope.index()
    }

    /// Message header bookkeeping. Zeroed for attachments and recipients.
    pub fn header(&self) -> std::result::Result<PropertiesHeader, PropertyError> {
        self.index().map(|index| *index.header())
    }

    /// Code page for narrow strings: `PR_MESSAGE_CODEPAGE`, then
    /// `PR_INTERNET_CPID`, then the code page of the owning message, then the
    /// configured default.
    pub fn codepage(&self) -> std::result::Result<u32, PropertyError> {
        self.scope.codepage()
    }

    /// Translate a key to the tag it is stored under on this container.
    ///
    /// Standard tags and [`PS_MAPI`](super::guid::PS_MAPI) keys are answered
    /// without reading the name mapping.
    pub fn resolve_tag(&self, key: &PropertyKey) -> std::result::Result<PropertyTag, PropertyError> {
        match key {
            PropertyKey::Standard(tag) => Ok(*tag),
            PropertyKey::Named(named) => {
                if let Some(tag) = standard_tag(named) {
                    return Ok(tag);
                }
                self.named_map()?
                    .resolve(named)
                    .ok_or_else(|| PropertyError::PropertyNotFound(key.clone()))
            },
        }
    }

    /// Resolve, decode and remember one property.
    ///
    /// The first call for a given combination of key, type override and code
    /// decoder does the work; later calls hand back the same value or the
    /// same failure.
    pub fn ensure_resolved(
        &self,
        key: impl Into<PropertyKey>,
        type_override: Option<PropertyType>,
        codes: Option<&CodeDecoder>,
    ) -> std::result::Result<DecodedValue, PropertyError> {
        let request = PropertyRequest {
            key: key.into(),
            type_override,
            codes: codes.map(Into::into),
        };
        self.cache
            .get_or_resolve(&request, || self.resolve_uncached(&request.key, type_override, codes))
    }

    /// Cached outcome of an earlier request; `None` if it was never made.
    pub fn cached(&self, request: &PropertyRequest) -> Option<SlotState> {
        self.cache.state(request)
    }

    fn resolve_uncached(
        &self,
        key: &PropertyKey,
        type_override: Option<PropertyType>,
        codes: Option<&CodeDecoder>,
    ) -> std::result::Result<DecodedValue, PropertyError> {
        let raw = self.read_raw(key)?;
        let ctx = DecodeContext {
            codepage: self.codepage()?,
        };
        decode(&raw, type_override, codes, &ctx)
    }

    /// The undecoded bytes stored for `key`.
    pub fn read_raw(&self, key: &PropertyKey) -> std::result::Result<RawPropertyValue, PropertyError> {
        let request = self.resolve_tag(key)?;
        let location = self
            .index()?
            .locate(request)
            .ok_or_else(|| PropertyError::PropertyNotFound(key.clone()))?;

        Ok(match location {
            PropertyLocation::Inline(fixed) => RawPropertyValue {
                tag: fixed.tag,
                data: fixed.slot,
            },
            PropertyLocation::Stream(tag) => {
                let name = tag.stream_name();
                let mut path = self.scope.path_refs();
                path.push(&name);
                RawPropertyValue {
                    tag,
                    data: self.scope.store.open_stream(&path)?,
                }
            },
        })
    }

    fn mismatch(&self, key: &PropertyKey, expected: &str, found: &DecodedValue) -> PropertyError {
        let tag = self
            .resolve_tag(key)
            .ok()
            .and_then(|tag| self.index().ok()?.locate(tag).map(|location| location.tag()))
            .unwrap_or(PropertyTag(0));
        PropertyError::decode(
            tag,
            tag.prop_type(),
            format!("expected {} value, found {}", expected, found.kind()),
        )
    }

    pub fn integer(&self, key: impl Into<PropertyKey>) -> std::result::Result<i64, PropertyError> {
        let key = key.into();
        let value = self.ensure_resolved(key.clone(), None, None)?;
        value.as_i64().ok_or_else(|| self.mismatch(&key, "integer", &value))
    }

    pub fn boolean(&self, key: impl Into<PropertyKey>) -> std::result::Result<bool, PropertyError> {
        let key = key.into();
        let value = self.ensure_resolved(key.clone(), None, None)?;
        value.as_bool().ok_or_else(|| self.mismatch(&key, "boolean", &value))
    }

    pub fn float(&self, key: impl Into<PropertyKey>) -> std::result::Result<f64, PropertyError> {
        let key = key.into();
        let value = self.ensure_resolved(key.clone(), None, None)?;
        value.as_f64().ok_or_else(|| self.mismatch(&key, "float", &value))
    }

    /// A fraction where 1.0 means 100 percent. Values outside `0.0..=1.0`
    /// are returned as stored.
    pub fn percentage(&self, key: impl Into<PropertyKey>) -> std::result::Result<f64, PropertyError> {
        let key = key.into();
        let value = self.float(key.clone())?;
        if self.scope.options.warn_out_of_range_percent && !(0.0..=1.0).contains(&value) {
            warn!(key = %key, value, "percentage outside 0.0..=1.0");
        }
        Ok(value)
    }

    pub fn timestamp(&self, key: impl Into<PropertyKey>) -> std::result::Result<Timestamp, PropertyError> {
        let key = key.into();
        let value = self.ensure_resolved(key.clone(), None, None)?;
        value.as_timestamp().ok_or_else(|| self.mismatch(&key, "timestamp", &value))
    }

    pub fn text(&self, key: impl Into<PropertyKey>) -> std::result::Result<String, PropertyError> {
        let key = key.into();
        let value = self.ensure_resolved(key.clone(), None, None)?;
        match value {
            DecodedValue::Text(text) => Ok(text),
            other => Err(self.mismatch(&key, "text", &other)),
        }
    }

    pub fn binary(&self, key: impl Into<PropertyKey>) -> std::result::Result<Bytes, PropertyError> {
        let key = key.into();
        let value = self.ensure_resolved(key.clone(), None, None)?;
        match value {
            DecodedValue::Binary(bytes) => Ok(bytes),
            other => Err(self.mismatch(&key, "binary", &other)),
        }
    }

    /// An enumerated property. Unknown codes come back as
    /// [`Coded::Unrecognized`].
    pub fn coded<T: PropertyCode>(&self, key: impl Into<PropertyKey>) -> std::result::Result<Coded<T>, PropertyError> {
        let key = key.into();
        let decoder = CodeDecoder::of::<T>();
        let value = self.ensure_resolved(key.clone(), None, Some(&decoder))?;
        value
            .as_code()
            .map(Coded::from_value)
            .ok_or_else(|| self.mismatch(&key, T::CODE_SET, &value))
    }
}

/// Turns an absent property into `None`, keeping other failures.
pub trait OptionalProperty<T> {
    fn optional(self) -> std::result::Result<Option<T>, PropertyError>;
}

impl<T> OptionalProperty<T> for std::result::Result<T, PropertyError> {
    fn optional(self) -> std::result::Result<Option<T>, PropertyError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(PropertyError::PropertyNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::msg::guid::{PS_MAPI, PSETID_TASK};
    use crate::msg::named::NAMEID_STORAGE;
    use crate::msg::named::tests::MappingBuilder;
    use crate::msg::properties::PROPERTIES_STREAM;
    use crate::msg::properties::tests::PropertiesBuilder;
    use crate::ole::builder::CompoundFileBuilder;
    use crate::ole::{CompoundFile, DirectoryEntry};
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;

    /// Records every path read from the wrapped store.
    #[derive(Debug)]
    pub(crate) struct CountingStore {
        inner: CompoundFile,
        reads: Mutex<Vec<String>>,
    }

    impl CountingStore {
        pub(crate) fn new(image: Vec<u8>) -> Self {
            Self {
                inner: CompoundFile::from_bytes(image).unwrap(),
                reads: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn read_count(&self) -> usize {
            self.reads.lock().len()
        }

        pub(crate) fn reads_under(&self, storage: &str) -> usize {
            self.reads.lock().iter().filter(|path| path.starts_with(storage)).count()
        }
    }

    impl ByteStore for CountingStore {
        fn open_stream(&self, path: &[&str]) -> std::result::Result<Bytes, OleError> {
            self.reads.lock().push(join_path(path));
            self.inner.open_stream(path)
        }

        fn list_entries(&self, path: &[&str]) -> std::result::Result<Vec<DirectoryEntry>, OleError> {
            self.reads.lock().push(join_path(path));
            self.inner.list_entries(path)
        }
    }

    // Named property indexes used by the fixture
    const PERCENT: u16 = 0;
    const DUE_DATE: u16 = 1;
    const STATUS: u16 = 2;
    const COMPLETE: u16 = 3;
    const BROKEN: u16 = 4;

    fn named(index: u16, prop_type: u16) -> u32 {
        ((0x8000 + index as u32) << 16) | prop_type as u32
    }

    pub(crate) fn fixture() -> Vec<u8> {
        let mut mapping = MappingBuilder::default();
        mapping
            .numeric(PSETID_TASK, 0x8102, PERCENT)
            .numeric(PSETID_TASK, 0x8105, DUE_DATE)
            .numeric(PSETID_TASK, 0x8101, STATUS)
            .numeric(PSETID_TASK, 0x811C, COMPLETE)
            .string(PSETID_TASK, "Broken", BROKEN);

        let due = crate::msg::Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap())
            .unwrap()
            .ticks();
        let table = PropertiesBuilder::new(EntityKind::Message)
            .header(PropertiesHeader {
                next_recipient_id: 1,
                next_attachment_id: 1,
                recipient_count: 1,
                attachment_count: 1,
            })
            .record(0x3FFD0003, &1251u32.to_le_bytes())
            .record(named(PERCENT, 0x0005), &1.5f64.to_le_bytes())
            .record(named(DUE_DATE, 0x0040), &due.to_le_bytes())
            .record(named(STATUS, 0x0003), &9u32.to_le_bytes())
            .record(named(COMPLETE, 0x000B), &[1, 0])
            .record(0x0E080003, &2048u32.to_le_bytes())
            .build();

        let attachment = PropertiesBuilder::new(EntityKind::Attachment)
            .record(0x37050003, &5u32.to_le_bytes())
            .build();
        let embedded = PropertiesBuilder::new(EntityKind::EmbeddedMessage).build();
        let recipient = PropertiesBuilder::new(EntityKind::Recipient).build();

        let broken = format!("__substg1.0_{:08X}", named(BROKEN, 0x0102));
        let mut builder = CompoundFileBuilder::new();
        mapping.write_to(&mut builder);
        builder
            .add_stream(&[PROPERTIES_STREAM], &table)
            .add_stream(&["__substg1.0_0037001F"], b"W\x00e\x00e\x00k\x00l\x00y\x00")
            .add_stream(&["__substg1.0_0E1D001E"], b"\xcf\xf0\xe8\xe2\xe5\xf2\x00")
            .add_stream(&[broken.as_str()], &[1, 2, 3])
            .add_stream(&["__attach_version1.0_#00000000", PROPERTIES_STREAM], &attachment)
            .add_stream(&["__attach_version1.0_#00000000", "__substg1.0_3707001F"], b"a\x00.\x00t\x00x\x00t\x00")
            .add_stream(
                &["__attach_version1.0_#00000000", EMBEDDED_MESSAGE_STORAGE, PROPERTIES_STREAM],
                &embedded,
            )
            .add_stream(
                &["__attach_version1.0_#00000000", EMBEDDED_MESSAGE_STORAGE, "__substg1.0_0037001F"],
                b"I\x00n\x00n\x00e\x00r\x00",
            )
            .add_stream(&["__recip_version1.0_#00000000", PROPERTIES_STREAM], &recipient)
            .add_stream(&["__recip_version1.0_#00000000", "__substg1.0_3001001F"], b"B\x00o\x00b\x00")
            .add_stream(&["__recip_version1.0_#00000000", "__substg1.0_3003001E"], b"\xcf\xf0\xe8\x00");
        builder.build()
    }

    fn message() -> (Arc<CountingStore>, Entity<CountingStore>) {
        let store = Arc::new(CountingStore::new(fixture()));
        let entity = Entity::message(Arc::clone(&store));
        (store, entity)
    }

    #[test]
    fn test_repeated_access_reads_container_once() {
        let (store, message) = message();
        assert_eq!(message.text(PropertyTag::SUBJECT).unwrap(), "Weekly");
        let reads = store.read_count();
        assert!(reads > 0);

        assert_eq!(message.text(PropertyTag::SUBJECT).unwrap(), "Weekly");
        assert_eq!(
            message.ensure_resolved(PropertyTag::SUBJECT, None, None).unwrap(),
            DecodedValue::Text("Weekly".to_string())
        );
        assert_eq!(store.read_count(), reads);
    }

    #[test]
    fn test_unmapped_named_property_is_not_found_and_replayed() {
        let (store, message) = message();
        let key = PropertyKey::named(PSETID_TASK, "8101");

        let first = message.ensure_resolved(key.clone(), None, None);
        assert_eq!(first, Err(PropertyError::PropertyNotFound(key.clone())));
        let mapping_reads = store.reads_under(NAMEID_STORAGE);
        let reads = store.read_count();
        assert!(mapping_reads > 0);

        let second = message.ensure_resolved(key.clone(), None, None);
        assert_eq!(first, second);
        assert_eq!(store.reads_under(NAMEID_STORAGE), mapping_reads);
        assert_eq!(store.read_count(), reads);
        assert_eq!(
            message.cached(&PropertyRequest::new(key)),
            Some(SlotState::Absent)
        );
    }

    #[test]
    fn test_standard_set_never_reads_mapping() {
        let (store, message) = message();
        let value = message.text(PropertyKey::named(PS_MAPI, 0x0037u32)).unwrap();
        assert_eq!(value, "Weekly");
        assert_eq!(message.integer(PropertyTag(0x0E080003)).unwrap(), 2048);
        assert_eq!(store.reads_under(NAMEID_STORAGE), 0);
    }

    #[test]
    fn test_short_payload_as_integer64_fails_and_is_cached() {
        let (store, message) = message();
        let key = PropertyKey::named(PSETID_TASK, "Broken");

        let first = message.ensure_resolved(key.clone(), Some(PropertyType::INTEGER64), None);
        match &first {
            Err(PropertyError::DecodeError { tag, as_type, .. }) => {
                assert_eq!(*tag, PropertyTag(named(BROKEN, 0x0102)));
                assert_eq!(*as_type, PropertyType::INTEGER64);
            },
            other => panic!("expected decode error, got {:?}", other),
        }
        let reads = store.read_count();
        let second = message.ensure_resolved(key.clone(), Some(PropertyType::INTEGER64), None);
        assert_eq!(first, second);
        assert_eq!(store.read_count(), reads);

        // The same bytes without an override are a valid blob
        assert_eq!(message.binary(key).unwrap(), Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn test_named_values_decode_to_their_types() {
        let (_, message) = message();
        assert!(message.boolean(PropertyKey::named(PSETID_TASK, 0x811Cu32)).unwrap());
        assert_eq!(
            message.timestamp(PropertyKey::named(PSETID_TASK, 0x8105u32)).unwrap().to_datetime(),
            Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_out_of_range_percentage_passes_through() {
        let (_, message) = message();
        assert_eq!(message.percentage(PropertyKey::named(PSETID_TASK, 0x8102u32)).unwrap(), 1.5);

        let store = Arc::new(CountingStore::new(fixture()));
        let quiet = Entity::message_with_options(store, EntityOptions::default().with_percent_warnings(false));
        assert_eq!(quiet.percentage(PropertyKey::named(PSETID_TASK, 0x8102u32)).unwrap(), 1.5);
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let (_, message) = message();
        let decoder = CodeDecoder::new("Status", |n| (n == 0).then_some("NotStarted"));
        let value = message
            .ensure_resolved(PropertyKey::named(PSETID_TASK, 0x8101u32), None, Some(&decoder))
            .unwrap();
        let code = value.as_code().unwrap();
        assert_eq!(code.name, None);
        assert_eq!(code.to_string(), "unrecognized code 9");
    }

    #[test]
    fn test_narrow_strings_use_declared_codepage() {
        let (_, message) = message();
        assert_eq!(message.codepage().unwrap(), 1251);
        assert_eq!(message.text(PropertyTag(0x0E1D001E)).unwrap(), "Привет");
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let (_, message) = message();
        let err = message.text(PropertyTag(0x0E080003)).unwrap_err();
        assert!(matches!(err, PropertyError::DecodeError { tag, .. } if tag == PropertyTag(0x0E080003)));
    }

    #[test]
    fn test_missing_property_is_optional() {
        let (_, message) = message();
        assert_eq!(message.text(PropertyTag::MESSAGE_CLASS).optional().unwrap(), None);
        assert_eq!(
            message.text(PropertyTag::SUBJECT).optional().unwrap(),
            Some("Weekly".to_string())
        );
    }

    #[test]
    fn test_children_share_mapping_and_read_their_own_properties() {
        let (store, message) = message();
        assert_eq!(message.header().unwrap().attachment_count, 1);

        let attachment = message.attachment(0).unwrap();
        assert_eq!(attachment.kind(), EntityKind::Attachment);
        assert_eq!(attachment.integer(PropertyTag(0x37050003)).unwrap(), 5);
        assert_eq!(attachment.text(PropertyTag(0x3707001F)).unwrap(), "a.txt");
        assert!(attachment.text(PropertyTag::SUBJECT).unwrap_err().is_not_found());

        let embedded = attachment.embedded_message().unwrap();
        assert_eq!(embedded.kind(), EntityKind::EmbeddedMessage);
        assert_eq!(embedded.text(PropertyTag::SUBJECT).unwrap(), "Inner");

        let recipient = message.recipient(0).unwrap();
        assert_eq!(recipient.text(PropertyTag(0x3001001F)).unwrap(), "Bob");

        message.named_map().unwrap();
        let mapping_reads = store.reads_under(NAMEID_STORAGE);
        embedded.named_map().unwrap();
        recipient.ensure_resolved(PropertyKey::named(PSETID_TASK, 0x8102u32), None, None).unwrap_err();
        assert_eq!(store.reads_under(NAMEID_STORAGE), mapping_reads);
    }

    #[test]
    fn test_children_inherit_message_codepage() {
        let (_, message) = message();
        let recipient = message.recipient(0).unwrap();
        assert_eq!(recipient.codepage().unwrap(), 1251);
        assert_eq!(recipient.text(PropertyTag(0x3003001E)).unwrap(), "При");

        let embedded = message.attachment(0).unwrap().embedded_message().unwrap();
        assert_eq!(embedded.codepage().unwrap(), 1251);
    }

    #[test]
    fn test_child_declared_codepage_wins() {
        let table = PropertiesBuilder::new(EntityKind::Message)
            .record(0x3FFD0003, &1251u32.to_le_bytes())
            .build();
        let attachment = PropertiesBuilder::new(EntityKind::Attachment)
            .record(0x3FDE0003, &1252u32.to_le_bytes())
            .build();
        let mut builder = CompoundFileBuilder::new();
        builder
            .add_stream(&[PROPERTIES_STREAM], &table)
            .add_stream(&["__attach_version1.0_#00000000", PROPERTIES_STREAM], &attachment)
            .add_stream(&["__attach_version1.0_#00000000", "__substg1.0_3704001E"], b"\xcf\xf0\xe8");
        let message = Entity::message(Arc::new(CountingStore::new(builder.build())));

        let attachment = message.attachment(0).unwrap();
        assert_eq!(attachment.codepage().unwrap(), 1252);
        assert_eq!(attachment.text(PropertyTag(0x3704001E)).unwrap(), "Ïðè");
    }

    #[test]
    fn test_child_storage_without_properties() {
        let table = PropertiesBuilder::new(EntityKind::Message)
            .record(0x3FFD0003, &1251u32.to_le_bytes())
            .build();
        let mut builder = CompoundFileBuilder::new();
        builder
            .add_stream(&[PROPERTIES_STREAM], &table)
            .add_storage(&["__attach_version1.0_#00000000"]);
        let message = Entity::message(Arc::new(CountingStore::new(builder.build())));

        let attachment = message.attachment(0).unwrap();
        assert!(attachment.integer(PropertyTag(0x37050003)).unwrap_err().is_not_found());
        assert_eq!(attachment.header().unwrap(), PropertiesHeader::default());
        assert_eq!(attachment.codepage().unwrap(), 1251);
    }

    #[test]
    fn test_missing_children() {
        let (_, message) = message();
        assert!(matches!(message.attachment(3), Err(Error::ComponentNotFound(_))));
        assert!(matches!(message.embedded_message(), Err(Error::InvalidFormat(_))));
        let recipient = message.recipient(0).unwrap();
        assert!(matches!(recipient.attachment(0), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_corrupt_properties_stream_is_remembered() {
        let mut builder = CompoundFileBuilder::new();
        builder.add_stream(&[PROPERTIES_STREAM], &[0u8; 20]);
        let store = Arc::new(CountingStore::new(builder.build()));
        let message = Entity::message(Arc::clone(&store));

        let first = message.integer(PropertyTag(0x0E080003));
        assert!(matches!(first, Err(PropertyError::ContainerCorrupt(_))));
        let reads = store.read_count();
        assert_eq!(message.integer(PropertyTag(0x0E080003)), first);
        assert!(matches!(message.header(), Err(PropertyError::ContainerCorrupt(_))));
        assert_eq!(store.read_count(), reads);
    }

    #[test]
    fn test_entity_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Entity<CompoundFile>>();
    }
}
