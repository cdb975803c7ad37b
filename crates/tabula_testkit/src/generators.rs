//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small range so generated sequences revisit the
//! same rows and exercise the pending-state transitions.

use crate::fixtures::Person;
use proptest::prelude::*;
use std::fmt;
use tabula_core::StoreOp;

/// Largest key produced by the default strategies.
pub const MAX_KEY: i64 = 4;

/// A single write issued against a `people` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Insert the row.
    Insert(Person),
    /// Update the row.
    Update(Person),
    /// Update or insert the row.
    Save(Person),
    /// Delete the row's key.
    Delete(Person),
}

impl Op {
    /// Returns the row the operation carries.
    #[must_use]
    pub fn row(&self) -> &Person {
        match self {
            Self::Insert(row) | Self::Update(row) | Self::Save(row) | Self::Delete(row) => row,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, row) = match self {
            Self::Insert(row) => ("insert", row),
            Self::Update(row) => ("update", row),
            Self::Save(row) => ("save", row),
            Self::Delete(row) => ("delete", row),
        };
        write!(f, "{name}({}, {:?})", row.id, row.name)
    }
}

/// Strategy for generating keys in `1..=MAX_KEY`.
pub fn key_strategy() -> impl Strategy<Value = i64> {
    1..=MAX_KEY
}

/// Strategy for generating short row payloads.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,3}").expect("Invalid regex")
}

/// Strategy for generating a person with a small key.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (key_strategy(), name_strategy()).prop_map(|(id, name)| Person::new(id, name))
}

/// Strategy for generating one write.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        person_strategy().prop_map(Op::Insert),
        person_strategy().prop_map(Op::Update),
        person_strategy().prop_map(Op::Save),
        person_strategy().prop_map(Op::Delete),
    ]
}

/// Strategy for generating a sequence of writes.
pub fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 0..=max_len)
}

/// Strategy for picking the kind of store call that should fail.
pub fn write_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        Just(StoreOp::Insert),
        Just(StoreOp::Update),
        Just(StoreOp::Delete),
    ]
}

/// Strategy for generating rows already present before a test starts.
pub fn seed_strategy() -> impl Strategy<Value = Vec<Person>> {
    prop::collection::btree_set(key_strategy(), 0..=MAX_KEY as usize).prop_map(|keys| {
        keys.into_iter()
            .map(|id| Person::new(id, "seed"))
            .collect()
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
