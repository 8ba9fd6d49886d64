//! Application-level key/value pairs propagated alongside trace context.
//!
//! Baggage entries follow the W3C baggage restrictions: keys are non-empty
//! printable ASCII without delimiters, values are printable ASCII, and each
//! entry may carry opaque metadata. Entries that fail validation are dropped
//! with a warning rather than surfacing an error to instrumentation code.

use crate::{Context, Key, KeyValue, StringValue};
use std::collections::hash_map::{self, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

static DEFAULT_BAGGAGE: OnceLock<Baggage> = OnceLock::new();

const MAX_KEY_VALUE_PAIRS: usize = 64;
const MAX_LEN_OF_ALL_PAIRS: usize = 8192;

/// An immutable mapping from baggage keys to values with optional metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Baggage {
    inner: HashMap<Key, (StringValue, BaggageMetadata)>,
    kv_content_len: usize, // the length of key-value-metadata string in `inner`
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage {
            inner: HashMap::default(),
            kv_content_len: 0,
        }
    }

    /// Returns a reference to the value associated with a given name.
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&StringValue> {
        self.inner.get(key.as_ref()).map(|(value, _)| value)
    }

    /// Returns a reference to the value and metadata associated with a given name.
    pub fn get_with_metadata<K: AsRef<str>>(
        &self,
        key: K,
    ) -> Option<&(StringValue, BaggageMetadata)> {
        self.inner.get(key.as_ref())
    }

    /// Inserts a name/value pair, returning the previous value if the entry
    /// was accepted.
    ///
    /// Entries that fail W3C validation or would exceed the total size
    /// limits are discarded with a warning.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<StringValue>
    where
        K: Into<Key>,
        V: Into<StringValue>,
    {
        self.insert_with_metadata(key, value, BaggageMetadata::default())
            .map(|pair| pair.0)
    }

    /// Inserts a name/value(/metadata) triple, returning the previous entry
    /// if the new one was accepted.
    pub fn insert_with_metadata<K, V, S>(
        &mut self,
        key: K,
        value: V,
        metadata: S,
    ) -> Option<(StringValue, BaggageMetadata)>
    where
        K: Into<Key>,
        V: Into<StringValue>,
        S: Into<BaggageMetadata>,
    {
        let (key, value, metadata) = (key.into(), value.into(), metadata.into());
        if !valid_key(key.as_str()) || !valid_value(value.as_str()) {
            otel_warn!(
                name: "Baggage.InvalidEntry",
                key = key.as_str(),
                message = "key or value failed W3C baggage validation, entry dropped"
            );
            return None;
        }
        if self.insertable(&key, &value, &metadata) {
            self.inner.insert(key, (value, metadata))
        } else {
            None
        }
    }

    /// Removes a name from the baggage, returning the removed entry.
    pub fn remove<K: Into<Key>>(&mut self, key: K) -> Option<(StringValue, BaggageMetadata)> {
        let key = key.into();
        let removed = self.inner.remove(&key);
        if let Some((value, metadata)) = &removed {
            self.kv_content_len -= entry_content_len(&key, value, metadata);
        }
        removed
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Gets an iterator over the baggage items, in no particular order.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }

    /// Determine whether an entry fits within the total size limits.
    fn insertable(&mut self, key: &Key, value: &StringValue, metadata: &BaggageMetadata) -> bool {
        let entry_len = entry_content_len(key, value, metadata);
        let new_len = match self.inner.get(key) {
            Some((old_value, old_metadata)) => {
                self.kv_content_len + entry_len - entry_content_len(key, old_value, old_metadata)
            }
            None => {
                if self.inner.len() >= MAX_KEY_VALUE_PAIRS {
                    otel_warn!(
                        name: "Baggage.TooManyEntries",
                        max = MAX_KEY_VALUE_PAIRS,
                        message = "baggage entry limit reached, entry dropped"
                    );
                    return false;
                }
                self.kv_content_len + entry_len
            }
        };
        if new_len > MAX_LEN_OF_ALL_PAIRS {
            otel_warn!(
                name: "Baggage.ContentTooLarge",
                max_bytes = MAX_LEN_OF_ALL_PAIRS,
                message = "baggage byte limit reached, entry dropped"
            );
            return false;
        }
        self.kv_content_len = new_len;
        true
    }
}

/// `key=value;metadata` length, the form counted against the byte limit.
fn entry_content_len(key: &Key, value: &StringValue, metadata: &BaggageMetadata) -> usize {
    let metadata_len = if metadata.as_str().is_empty() {
        0
    } else {
        metadata.as_str().len() + 1
    };
    key.as_str().len() + 1 + value.as_str().len() + metadata_len
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_graphic() && !matches!(c, '=' | ',' | ';'))
}

fn valid_value(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control())
}

/// An iterator over the entries of a `Baggage`.
#[derive(Debug)]
pub struct Iter<'a>(hash_map::Iter<'a, Key, (StringValue, BaggageMetadata)>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a (StringValue, BaggageMetadata));

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Baggage {
    type Item = (&'a Key, &'a (StringValue, BaggageMetadata));
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.inner.iter())
    }
}

impl FromIterator<KeyValueMetadata> for Baggage {
    fn from_iter<I: IntoIterator<Item = KeyValueMetadata>>(iter: I) -> Self {
        let mut baggage = Baggage::default();
        for kvm in iter {
            baggage.insert_with_metadata(kvm.key, kvm.value, kvm.metadata);
        }
        baggage
    }
}

impl FromIterator<KeyValue> for Baggage {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        iter.into_iter().map(KeyValueMetadata::from).collect()
    }
}

/// Opaque, vendor-defined properties attached to a baggage entry.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BaggageMetadata(String);

impl BaggageMetadata {
    /// Returns the raw metadata string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BaggageMetadata {
    fn from(value: String) -> Self {
        BaggageMetadata(value.trim().to_string())
    }
}

impl From<&str> for BaggageMetadata {
    fn from(value: &str) -> Self {
        BaggageMetadata(value.trim().to_string())
    }
}

impl fmt::Display for BaggageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A baggage entry: name, value, and optional metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValueMetadata {
    /// Entry name
    pub key: Key,
    /// Entry value
    pub value: StringValue,
    /// Entry metadata
    pub metadata: BaggageMetadata,
}

impl KeyValueMetadata {
    /// Create a new entry with metadata.
    pub fn new<K, V, S>(key: K, value: V, metadata: S) -> Self
    where
        K: Into<Key>,
        V: Into<StringValue>,
        S: Into<BaggageMetadata>,
    {
        KeyValueMetadata {
            key: key.into(),
            value: value.into(),
            metadata: metadata.into(),
        }
    }
}

impl From<KeyValue> for KeyValueMetadata {
    fn from(kv: KeyValue) -> Self {
        KeyValueMetadata {
            key: kv.key,
            value: kv.value.as_str().into_owned().into(),
            metadata: BaggageMetadata::default(),
        }
    }
}

/// Methods for storing and retrieving baggage in a [`Context`].
pub trait BaggageExt {
    /// Returns a derived context with the given entries merged into its
    /// baggage.
    fn with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        &self,
        baggage: T,
    ) -> Self;

    /// Returns a clone of the current context with the given entries merged
    /// into its baggage.
    fn current_with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        baggage: T,
    ) -> Self;

    /// Returns a derived context with an empty baggage.
    fn with_cleared_baggage(&self) -> Self;

    /// Returns a reference to this context's baggage.
    fn baggage(&self) -> &Baggage;
}

impl BaggageExt for Context {
    fn with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(
        &self,
        baggage: T,
    ) -> Self {
        let mut merged: Baggage = self.baggage().clone();
        for kvm in baggage.into_iter().map(|kv| kv.into()) {
            merged.insert_with_metadata(kvm.key, kvm.value, kvm.metadata);
        }

        let mut new_cx = self.clone();
        new_cx.baggage = Some(Arc::new(merged));
        new_cx
    }

    fn current_with_baggage<T: IntoIterator<Item = I>, I: Into<KeyValueMetadata>>(kvs: T) -> Self {
        Context::current().with_baggage(kvs)
    }

    fn with_cleared_baggage(&self) -> Self {
        let mut new_cx = self.clone();
        new_cx.baggage = Some(Arc::new(Baggage::new()));
        new_cx
    }

    fn baggage(&self) -> &Baggage {
        self.baggage
            .as_deref()
            .unwrap_or_else(|| DEFAULT_BAGGAGE.get_or_init(Baggage::default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut baggage = Baggage::new();
        assert_eq!(baggage.insert("user.id", "1"), None);
        assert_eq!(baggage.get("user.id"), Some(&StringValue::from("1")));
        // replacing returns the previous value
        assert_eq!(baggage.insert("user.id", "2"), Some(StringValue::from("1")));
        assert_eq!(baggage.len(), 1);
    }

    #[test]
    fn rejects_invalid_keys() {
        let mut baggage = Baggage::new();
        assert_eq!(baggage.insert("", "value"), None);
        assert_eq!(baggage.insert("has space", "value"), None);
        assert_eq!(baggage.insert("has=eq", "value"), None);
        assert_eq!(baggage.insert("ctl\u{7}", "value"), None);
        assert!(baggage.is_empty());
    }

    #[test]
    fn rejects_control_characters_in_values() {
        let mut baggage = Baggage::new();
        baggage.insert("key", "bad\u{0}value");
        assert_eq!(baggage.get("key"), None);
        // spaces are fine in values
        baggage.insert("key", "a value");
        assert_eq!(baggage.get("key"), Some(&StringValue::from("a value")));
    }

    #[test]
    fn entry_limit_enforced() {
        let mut baggage = Baggage::new();
        for i in 0..(MAX_KEY_VALUE_PAIRS + 10) {
            baggage.insert(format!("key{i}"), "v");
        }
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);
    }

    #[test]
    fn context_baggage_round_trip() {
        let cx = Context::new().with_baggage(vec![KeyValue::new("tenant", "acme")]);
        assert_eq!(cx.baggage().get("tenant"), Some(&StringValue::from("acme")));

        let cleared = cx.with_cleared_baggage();
        assert!(cleared.baggage().is_empty());
        // original untouched
        assert_eq!(cx.baggage().len(), 1);
    }

    #[test]
    fn metadata_survives_merge() {
        let cx = Context::new().with_baggage(vec![KeyValueMetadata::new(
            "tenant",
            "acme",
            "source=mobile",
        )]);
        let (value, metadata) = cx.baggage().get_with_metadata("tenant").unwrap();
        assert_eq!(value, &StringValue::from("acme"));
        assert_eq!(metadata.as_str(), "source=mobile");
    }
}
