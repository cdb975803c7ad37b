//! Cache keys.

use std::fmt;
use uuid::Uuid;

/// A single primary-key column value.
///
/// Only types with exact equality can take part in a key, which keeps
/// hashing and equality consistent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    /// Boolean column.
    Bool(bool),
    /// Integer column of any width.
    Int(i64),
    /// Character column.
    Text(String),
    /// Binary column.
    Bytes(Vec<u8>),
    /// UUID column.
    Uuid(Uuid),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Bytes(v) => {
                f.write_str("x'")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                f.write_str("'")
            }
            Self::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for KeyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for KeyValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

/// Identifies a row for cache lookup.
///
/// A cache key is the ordered list of a row's primary-key values. Two keys
/// are equal iff they hold equal values in the same order. Keys are
/// immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(Box<[KeyValue]>);

impl CacheKey {
    /// Creates a key from ordered primary-key values.
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<KeyValue>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// Creates a key for a single-column primary key.
    pub fn single(value: impl Into<KeyValue>) -> Self {
        Self(Box::new([value.into()]))
    }

    /// Returns the key values in column order.
    #[must_use]
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    /// Returns the number of key columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

impl From<KeyValue> for CacheKey {
    fn from(value: KeyValue) -> Self {
        Self(Box::new([value]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &CacheKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_is_ordered() {
        let a = CacheKey::new([KeyValue::Int(1), KeyValue::from("x")]);
        let b = CacheKey::new([KeyValue::Int(1), KeyValue::from("x")]);
        let c = CacheKey::new([KeyValue::from("x"), KeyValue::Int(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_types_are_different_keys() {
        assert_ne!(CacheKey::single(1), CacheKey::single("1"));
        assert_ne!(CacheKey::single(1), CacheKey::single(true));
    }

    #[test]
    fn display() {
        let key = CacheKey::new([
            KeyValue::Int(7),
            KeyValue::from("a"),
            KeyValue::Bytes(vec![0x0a, 0xff]),
        ]);
        assert_eq!(key.to_string(), "(7, 'a', x'0aff')");
        assert_eq!(key.arity(), 3);
    }

    proptest! {
        #[test]
        fn equal_keys_hash_equal(ints in prop::collection::vec(any::<i64>(), 1..4), text in "[a-z]{0,8}") {
            let build = || {
                let mut values: Vec<KeyValue> = ints.iter().copied().map(KeyValue::Int).collect();
                values.push(KeyValue::Text(text.clone()));
                CacheKey::new(values)
            };
            let a = build();
            let b = build();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }
}
