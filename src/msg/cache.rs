//! Per-entity resolution cache.
//!
//! Each distinct request gets one slot. A slot is resolved at most once; the
//! outcome, success or failure, is kept for the life of the cache and handed
//! back on every later request without touching the container.

use super::decode::{CodeDecoder, DecodedValue};
use super::tag::{PropertyKey, PropertyType};
use crate::common::error::PropertyError;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// What a caller asked for: the property, how to type it and how to map it
/// to codes. Requests that differ in any part use separate slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyRequest {
    pub key: PropertyKey,
    pub type_override: Option<PropertyType>,
    pub codes: Option<CodeDecoderKey>,
}

/// Identity of a [`CodeDecoder`] inside a slot key: its code set name.
///
/// Two decoders with one name share slots, whatever their mapping functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeDecoderKey(&'static str);

impl From<&CodeDecoder> for CodeDecoderKey {
    fn from(decoder: &CodeDecoder) -> Self {
        Self(decoder.name())
    }
}

impl PropertyRequest {
    pub fn new(key: impl Into<PropertyKey>) -> Self {
        Self {
            key: key.into(),
            type_override: None,
            codes: None,
        }
    }

    pub fn with_type(mut self, prop_type: PropertyType) -> Self {
        self.type_override = Some(prop_type);
        self
    }

    pub fn with_codes(mut self, codes: &CodeDecoder) -> Self {
        self.codes = Some(codes.into());
        self
    }
}

/// Terminal state of a resolved slot. A slot that was never resolved has no
/// state at all.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Value(DecodedValue),
    /// The entity stores nothing for this property
    Absent,
    Failed(PropertyError),
}

impl SlotState {
    fn from_outcome(outcome: Result<DecodedValue, PropertyError>) -> Self {
        match outcome {
            Ok(value) => SlotState::Value(value),
            Err(PropertyError::PropertyNotFound(_)) => SlotState::Absent,
            Err(err) => SlotState::Failed(err),
        }
    }

    fn outcome(&self, request: &PropertyRequest) -> Result<DecodedValue, PropertyError> {
        match self {
            SlotState::Value(value) => Ok(value.clone()),
            SlotState::Absent => Err(PropertyError::PropertyNotFound(request.key.clone())),
            SlotState::Failed(err) => Err(err.clone()),
        }
    }
}

/// Map from request to its once-initialized slot.
///
/// The map lock is only held to find or create a slot. Resolution runs on
/// the slot itself, so concurrent first requests for one slot do the work
/// once while other slots proceed independently.
#[derive(Debug, Default)]
pub struct PropertyCache {
    slots: Mutex<HashMap<PropertyRequest, Arc<OnceCell<SlotState>>>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the remembered outcome for `request`, running `resolve` the
    /// first time only.
    pub fn get_or_resolve<F>(&self, request: &PropertyRequest, resolve: F) -> Result<DecodedValue, PropertyError>
    where
        F: FnOnce() -> Result<DecodedValue, PropertyError>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(request.clone()).or_default())
        };

        if let Some(state) = slot.get() {
            trace!(key = %request.key, "property cache hit");
            return state.outcome(request);
        }

        let state = slot.get_or_init(|| {
            trace!(key = %request.key, "property cache miss");
            SlotState::from_outcome(resolve())
        });
        state.outcome(request)
    }

    /// Current state of a slot; `None` while unresolved.
    pub fn state(&self, request: &PropertyRequest) -> Option<SlotState> {
        self.slots.lock().get(request).and_then(|slot| slot.get().cloned())
    }

    /// Number of resolved slots.
    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::guid::PSETID_TASK;
    use crate::msg::tag::PropertyTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_value_is_resolved_once() {
        let cache = PropertyCache::new();
        let request = PropertyRequest::new(PropertyTag(0x0E080003));
        let calls = AtomicUsize::new(0);
        let resolve = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(DecodedValue::Integer(7))
        };

        assert_eq!(cache.state(&request), None);
        assert_eq!(cache.get_or_resolve(&request, resolve), Ok(DecodedValue::Integer(7)));
        assert_eq!(cache.get_or_resolve(&request, resolve), Ok(DecodedValue::Integer(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(&request), Some(SlotState::Value(DecodedValue::Integer(7))));
    }

    #[test]
    fn test_absence_and_failure_are_replayed() {
        let cache = PropertyCache::new();
        let key = PropertyKey::named(PSETID_TASK, "8101");
        let absent = PropertyRequest::new(key.clone());
        let failing = PropertyRequest::new(PropertyTag(0x80010014));

        let first = cache.get_or_resolve(&absent, || Err(PropertyError::PropertyNotFound(key.clone())));
        let second = cache.get_or_resolve(&absent, || panic!("slot resolved twice"));
        assert_eq!(first, second);
        assert_eq!(cache.state(&absent), Some(SlotState::Absent));

        let error = PropertyError::decode(PropertyTag(0x80010014), PropertyType::INTEGER64, "expected 8 bytes, found 3");
        let first = cache.get_or_resolve(&failing, || Err(error.clone()));
        let second = cache.get_or_resolve(&failing, || Ok(DecodedValue::Integer(0)));
        assert_eq!(first, Err(error.clone()));
        assert_eq!(second, Err(error));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_requests_differing_in_type_use_separate_slots() {
        let cache = PropertyCache::new();
        let plain = PropertyRequest::new(PropertyTag(0x81010003));
        let typed = plain.clone().with_type(PropertyType::INTEGER16);
        let coded = plain.clone().with_codes(&CodeDecoder::new("Status", |_| None));
        assert_ne!(plain, typed);
        assert_ne!(plain, coded);

        cache.get_or_resolve(&plain, || Ok(DecodedValue::Integer(1))).unwrap();
        cache.get_or_resolve(&typed, || Ok(DecodedValue::Integer(2))).unwrap();
        assert_eq!(cache.get_or_resolve(&plain, || unreachable!()), Ok(DecodedValue::Integer(1)));
        assert_eq!(cache.get_or_resolve(&typed, || unreachable!()), Ok(DecodedValue::Integer(2)));
        assert_eq!(cache.state(&coded), None);
    }

    #[test]
    fn test_code_set_name_identifies_decoder() {
        let cache = PropertyCache::new();
        let plain = PropertyRequest::new(PropertyTag(0x81010003));
        let status = plain.clone().with_codes(&CodeDecoder::new("Status", |n| (n == 0).then_some("NotStarted")));
        let same_name = plain.clone().with_codes(&CodeDecoder::new("Status", |_| None));
        let other = plain.with_codes(&CodeDecoder::new("Ownership", |n| (n == 0).then_some("NotStarted")));
        assert_eq!(status, same_name);
        assert_ne!(status, other);

        cache.get_or_resolve(&status, || Ok(DecodedValue::Integer(1))).unwrap();
        assert_eq!(cache.get_or_resolve(&same_name, || unreachable!()), Ok(DecodedValue::Integer(1)));
        assert_eq!(cache.state(&other), None);
    }

    #[test]
    fn test_concurrent_first_access_resolves_once() {
        let cache = Arc::new(PropertyCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let request = PropertyRequest::new(PropertyTag(0x0037001F));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let request = request.clone();
                thread::spawn(move || {
                    cache.get_or_resolve(&request, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(10));
                        Ok(DecodedValue::Text("Hi".to_string()))
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(DecodedValue::Text("Hi".to_string())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
