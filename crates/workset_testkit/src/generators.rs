//! Property-based test generators using proptest.
//!
//! Provides strategies for identities, property values, and randomized
//! session workloads that keep required invariants intact.

use proptest::prelude::*;
use serde_json::Value;
use workset_store::{EntityReference, Identity};

/// Strategy for generating valid identities.
pub fn identity_strategy() -> impl Strategy<Value = Identity> {
    prop::string::string_regex("[a-z][a-z0-9-]{3,15}")
        .expect("Invalid regex")
        .prop_map(Identity::from)
}

/// Strategy for generating entity references.
pub fn reference_strategy() -> impl Strategy<Value = EntityReference> {
    identity_strategy().prop_map(EntityReference::new)
}

/// Strategy for generating person names.
pub fn person_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{2,11}").expect("Invalid regex")
}

/// Strategy for generating ages within a plausible range.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0..120i64
}

/// Strategy for generating scalar property values.
pub fn property_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        2 => any::<bool>().prop_map(Value::from),
        4 => any::<i64>().prop_map(Value::from),
        4 => prop::string::string_regex("[a-zA-Z0-9 ]{0,24}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ]
}

/// A single action applied to an open session.
///
/// `slot` fields index into the set of entities the workload has created
/// so far, modulo its size, so every generated sequence is applicable.
#[derive(Debug, Clone)]
pub enum SessionOp {
    /// Create a new person.
    Create {
        /// Value for the `name` property.
        name: String,
        /// Value for the `age` property.
        age: i64,
    },
    /// Update the age of an already-created person.
    Update {
        /// Index into the created entities.
        slot: usize,
        /// New value for the `age` property.
        age: i64,
    },
    /// Remove an already-created person.
    Remove {
        /// Index into the created entities.
        slot: usize,
    },
    /// Fetch an already-created person.
    Fetch {
        /// Index into the created entities.
        slot: usize,
    },
}

/// Strategy for generating a single session action.
pub fn session_op_strategy() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        3 => (person_name_strategy(), age_strategy())
            .prop_map(|(name, age)| SessionOp::Create { name, age }),
        2 => (any::<usize>(), age_strategy())
            .prop_map(|(slot, age)| SessionOp::Update { slot, age }),
        1 => any::<usize>().prop_map(|slot| SessionOp::Remove { slot }),
        2 => any::<usize>().prop_map(|slot| SessionOp::Fetch { slot }),
    ]
}

/// Strategy for generating a session workload.
pub fn session_workload_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<SessionOp>> {
    prop::collection::vec(session_op_strategy(), min_ops..max_ops)
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
