use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The key half of attribute [`KeyValue`] pairs.
///
/// Keys are non-empty strings; uniqueness within an attribute set is
/// enforced by the collections that hold them, not by the key itself.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Create a new `Key`.
    pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
        Key(value.into())
    }

    /// Create a new const `Key` from a static string.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }

    /// Returns a reference to the underlying key name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Key {
    fn from(key: &'static str) -> Self {
        Key(Cow::Borrowed(key))
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key(Cow::Owned(key))
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0.into_owned()
    }
}

impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A string value of an attribute, cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringValue(Cow<'static, str>);

impl StringValue {
    /// Returns a reference to the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for StringValue {
    fn from(value: &'static str) -> Self {
        StringValue(Cow::Borrowed(value))
    }
}

impl From<String> for StringValue {
    fn from(value: String) -> Self {
        StringValue(Cow::Owned(value))
    }
}

impl From<Cow<'static, str>> for StringValue {
    fn from(value: Cow<'static, str>) -> Self {
        StringValue(value)
    }
}

impl From<StringValue> for String {
    fn from(value: StringValue) -> Self {
        value.0.into_owned()
    }
}

/// The typed value half of attribute [`KeyValue`] pairs.
///
/// Values are exactly one of: string, bool, 64-bit integer, 64-bit float,
/// or a homogeneous list of one of those.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(StringValue),
    /// Homogeneous array of primitive values
    Array(Array),
}

/// A homogeneous list of primitive attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    /// Array of bools
    Bool(Vec<bool>),
    /// Array of i64
    I64(Vec<i64>),
    /// Array of f64
    F64(Vec<f64>),
    /// Array of strings
    String(Vec<StringValue>),
}

// Attribute sets are used as map keys by the metric aggregation storage, so
// values must be `Eq + Hash`. Floats are compared and hashed by their raw
// bits, which makes equality reflexive for NaN as well.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::I64(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Value::F64(f) => {
                state.write_u8(3);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::Array(a) => {
                state.write_u8(5);
                a.hash(state);
            }
        }
    }
}

impl Eq for Array {}

impl Hash for Array {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Array::Bool(values) => {
                state.write_u8(1);
                values.hash(state);
            }
            Array::I64(values) => {
                state.write_u8(2);
                values.hash(state);
            }
            Array::F64(values) => {
                state.write_u8(3);
                for value in values {
                    value.to_bits().hash(state);
                }
            }
            Array::String(values) => {
                state.write_u8(4);
                values.hash(state);
            }
        }
    }
}

impl Value {
    /// A printable rendering of this value, used wherever an untyped string
    /// form is required (e.g. wire fallbacks).
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::Bool(v) => Cow::Owned(v.to_string()),
            Value::I64(v) => Cow::Owned(v.to_string()),
            Value::F64(v) => Cow::Owned(v.to_string()),
            Value::String(v) => Cow::Borrowed(v.as_str()),
            Value::Array(v) => Cow::Owned(v.to_string()),
        }
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_list<T: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            values: &[T],
        ) -> fmt::Result {
            write!(f, "[")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{value}")?;
            }
            write!(f, "]")
        }
        match self {
            Array::Bool(values) => write_list(f, values),
            Array::I64(values) => write_list(f, values),
            Array::F64(values) => write_list(f, values),
            Array::String(values) => write_list(f, values),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v.as_str()),
            Value::Array(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! from_values {
    ($(($t:ty, $val:expr));+ $(;)?) => {
        $(
            impl From<$t> for Value {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    }
}

from_values!(
    (bool, Value::Bool);
    (i64, Value::I64);
    (f64, Value::F64);
    (StringValue, Value::String);
    (Array, Value::Array);
);

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(value.into())
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

macro_rules! from_arrays {
    ($(($t:ty, $variant:expr));+ $(;)?) => {
        $(
            impl From<Vec<$t>> for Array {
                fn from(values: Vec<$t>) -> Self {
                    $variant(values)
                }
            }

            impl From<Vec<$t>> for Value {
                fn from(values: Vec<$t>) -> Self {
                    Value::Array(values.into())
                }
            }
        )+
    }
}

from_arrays!(
    (bool, Array::Bool);
    (i64, Array::I64);
    (f64, Array::F64);
    (StringValue, Array::String);
);

/// A key-value pair describing an attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyValue {
    /// The attribute name
    pub key: Key,
    /// The attribute value
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &impl Hash) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn value_equality_and_hash_for_floats() {
        assert_eq!(Value::F64(1.5), Value::F64(1.5));
        assert_eq!(hash_of(&Value::F64(1.5)), hash_of(&Value::F64(1.5)));
        assert_ne!(hash_of(&Value::F64(1.5)), hash_of(&Value::F64(2.5)));
        // NaN is equal to itself under the bit interpretation
        assert_eq!(hash_of(&Value::F64(f64::NAN)), hash_of(&Value::F64(f64::NAN)));
    }

    #[test]
    fn array_rendering() {
        let array: Value = vec![1i64, 2, 3].into();
        assert_eq!(array.as_str(), "[1,2,3]");
        let strings: Value = vec![StringValue::from("a"), StringValue::from("b")].into();
        assert_eq!(strings.as_str(), "[a,b]");
    }

    #[test]
    fn key_value_construction() {
        let kv = KeyValue::new("service.name", "checkout");
        assert_eq!(kv.key.as_str(), "service.name");
        assert_eq!(kv.value, Value::String("checkout".into()));
    }
}
