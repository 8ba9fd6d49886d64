use std::collections::VecDeque;
use std::fmt;
use std::num::ParseIntError;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;
use thiserror::Error;

/// Flags that can be set on a [`SpanContext`].
///
/// Bit 0 is the `sampled` flag as defined by the W3C TraceContext
/// specification; the remaining bits are reserved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the `sampled` flag set to `1`.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct new trace flags.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns a copy of the current flags with the `sampled` flag set as given.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            *self & !TraceFlags::SAMPLED
        }
    }

    /// Returns the flags as a `u8`.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Not for TraceFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Create a trace id from a `u128`.
    pub const fn from_u128(value: u128) -> Self {
        TraceId(value)
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// The low 8 bytes of this trace id, reinterpreted as an unsigned
    /// integer. This is the value samplers compare against their threshold.
    pub const fn low_u64(self) -> u64 {
        self.0 as u64
    }

    /// Converts a string in base 16 to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }

    /// Returns `false` if all bytes are zero.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<[u8; 16]> for TraceId {
    fn from(bytes: [u8; 16]) -> Self {
        TraceId::from_bytes(bytes)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Create a span id from a `u64`.
    pub const fn from_u64(value: u64) -> Self {
        SpanId(value)
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }

    /// Returns `false` if all bytes are zero.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<[u8; 8]> for SpanId {
    fn from(bytes: [u8; 8]) -> Self {
        SpanId::from_bytes(bytes)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

const TRACE_STATE_MAX_MEMBERS: usize = 32;

/// Vendor-specific trace identification data, passed through opaquely.
///
/// An ordered mapping of up to 32 vendor/value entries, serialized as the
/// `tracestate` header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// Validates that the given `TraceState` list-member key is valid per the
    /// [W3C Spec](https://www.w3.org/TR/trace-context/#key).
    fn valid_key(key: &str) -> bool {
        if key.len() > 256 || key.is_empty() {
            return false;
        }

        let allowed_special = |b: u8| b == b'_' || b == b'-' || b == b'*' || b == b'/';
        let mut vendor_start = None;
        for (i, &b) in key.as_bytes().iter().enumerate() {
            if !(b.is_ascii_lowercase() || b.is_ascii_digit() || allowed_special(b) || b == b'@') {
                return false;
            }

            if i == 0 && (!b.is_ascii_lowercase() && !b.is_ascii_digit()) {
                return false;
            } else if b == b'@' {
                if vendor_start.is_some() || i + 14 < key.len() {
                    return false;
                }
                vendor_start = Some(i);
            } else if let Some(start) = vendor_start {
                if i == start + 1 && !(b.is_ascii_lowercase() || b.is_ascii_digit()) {
                    return false;
                }
            }
        }

        true
    }

    /// Validates that the given `TraceState` list-member value is valid per
    /// the [W3C Spec](https://www.w3.org/TR/trace-context/#value).
    fn valid_value(value: &str) -> bool {
        if value.len() > 256 {
            return false;
        }

        !(value.contains(',') || value.contains('='))
    }

    /// Creates a new `TraceState` from the given key-value collection.
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let ordered_data = trace_state
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(key.as_str()) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(value.as_str()) {
                    return Err(TraceStateError::Value(value));
                }

                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, TraceStateError>>()?;

        if ordered_data.is_empty() {
            Ok(TraceState(None))
        } else if ordered_data.len() > TRACE_STATE_MAX_MEMBERS {
            Err(TraceStateError::TooManyMembers(ordered_data.len()))
        } else {
            Ok(TraceState(Some(ordered_data)))
        }
    }

    /// Retrieves a value for a given key from the `TraceState` if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter().find_map(|item| {
                if item.0.as_str() == key {
                    Some(item.1.as_str())
                } else {
                    None
                }
            })
        })
    }

    /// Returns a new `TraceState` with the given key-value added or moved to
    /// the front of the list.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(value.as_str()) {
            return Err(TraceStateError::Value(value));
        }

        let mut trace_state = self.delete_from_deque(&key);
        let kvs = trace_state.0.get_or_insert(VecDeque::with_capacity(1));
        if kvs.len() >= TRACE_STATE_MAX_MEMBERS {
            return Err(TraceStateError::TooManyMembers(kvs.len() + 1));
        }

        kvs.push_front((key, value));

        Ok(trace_state)
    }

    /// Returns a new `TraceState` with the given key removed.
    pub fn delete<K: Into<String>>(&self, key: K) -> Result<TraceState, TraceStateError> {
        let key = key.into();
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }

        Ok(self.delete_from_deque(&key))
    }

    fn delete_from_deque(&self, key: &str) -> TraceState {
        let mut copy = self.clone();
        if let Some(kvs) = copy.0.as_mut() {
            if let Some(index) = kvs.iter().position(|x| x.0 == key) {
                kvs.remove(index);
            }
        }
        copy
    }

    /// Creates a new `TraceState` header string, delimiting each key and
    /// value with a `=` and each entry with a `,`.
    pub fn header(&self) -> String {
        self.header_delimited("=", ",")
    }

    /// Creates a new `TraceState` header string with the given delimiters.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{key}{entry_delimiter}{value}"))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list_members: Vec<&str> = s.split_terminator(',').collect();
        let mut key_value_pairs: VecDeque<(String, String)> =
            VecDeque::with_capacity(list_members.len());

        for list_member in list_members {
            match list_member.find('=') {
                None => return Err(TraceStateError::List(list_member.to_string())),
                Some(separator_index) => {
                    let (key, value) = list_member.split_at(separator_index);
                    key_value_pairs
                        .push_back((key.trim().to_string(), value.trim_start_matches('=').trim().to_string()));
                }
            }
        }

        TraceState::from_key_value(key_value_pairs)
    }
}

/// Error returned by `TraceState` operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is invalid.
    #[error("{0} is not a valid key in TraceState, see https://www.w3.org/TR/trace-context/#key for more details")]
    Key(String),

    /// The value is invalid.
    #[error("{0} is not a valid value in TraceState, see https://www.w3.org/TR/trace-context/#value for more details")]
    Value(String),

    /// The list is invalid.
    #[error("{0} is not a valid list member in TraceState, see https://www.w3.org/TR/trace-context/#list for more details")]
    List(String),

    /// The list has too many entries.
    #[error("TraceState is limited to 32 members, tried to store {0}")]
    TooManyMembers(usize),
}

/// The propagation-minimal identity of a span.
///
/// Valid iff both the trace id and span id are valid. `is_remote` is true
/// iff the context was extracted from an incoming carrier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context.
    pub fn empty_context() -> Self {
        SpanContext::new(
            TraceId::INVALID,
            SpanId::INVALID,
            TraceFlags::default(),
            false,
            TraceState::default(),
        )
    }

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The trace id of this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span id of this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The trace flags of this span context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if both the trace id and span id are valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// Returns `true` if this context was extracted from an incoming carrier.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor pass-through data of this span context.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_hex_round_trip() {
        let id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
        assert_eq!(id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(TraceId::from_bytes(id.to_bytes()), id);
        assert!(id.is_valid());
        assert!(!TraceId::INVALID.is_valid());
        assert!(TraceId::from_hex("not_hex").is_err());
    }

    #[test]
    fn span_id_hex_round_trip() {
        let id = SpanId::from_hex("00f067aa0ba902b7").unwrap();
        assert_eq!(id.to_string(), "00f067aa0ba902b7");
        assert_eq!(SpanId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn trace_id_low_u64() {
        let id = TraceId::from_u128(0x0102030405060708_1112131415161718u128);
        assert_eq!(id.low_u64(), 0x1112131415161718);
    }

    #[test]
    fn trace_flags_sampled_bit() {
        assert!(TraceFlags::new(0x01).is_sampled());
        assert!(!TraceFlags::new(0x00).is_sampled());
        assert!(TraceFlags::default().with_sampled(true).is_sampled());
        assert!(!TraceFlags::SAMPLED.with_sampled(false).is_sampled());
    }

    #[test]
    fn trace_state_parse_and_header() {
        let state = TraceState::from_str("foo=bar,apple=banana").unwrap();
        assert_eq!(state.get("foo"), Some("bar"));
        assert_eq!(state.header(), "foo=bar,apple=banana");

        let inserted = state.insert("congo", "t61rcWkgMzE").unwrap();
        assert_eq!(inserted.header(), "congo=t61rcWkgMzE,foo=bar,apple=banana");

        let deleted = inserted.delete("foo").unwrap();
        assert_eq!(deleted.get("foo"), None);
    }

    #[test]
    fn trace_state_rejects_invalid_members() {
        assert!(TraceState::from_str("foo").is_err());
        assert!(TraceState::from_key_value(vec![("UPPER", "v")]).is_err());
        assert!(TraceState::from_key_value(vec![("ok", "has,comma")]).is_err());

        let too_many = (0..40).map(|i| (format!("key{i}"), "v".to_string()));
        assert!(matches!(
            TraceState::from_key_value(too_many),
            Err(TraceStateError::TooManyMembers(_))
        ));
    }

    #[test]
    fn span_context_validity() {
        let valid = SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(1),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        assert!(valid.is_valid());
        assert!(valid.is_remote());
        assert!(valid.is_sampled());
        assert!(!SpanContext::empty_context().is_valid());
    }
}
