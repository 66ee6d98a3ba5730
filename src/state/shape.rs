//! Shape classes and their merge policies.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a store treats its value on write. Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// JSON object; writes deep-merge.
    Mapping,
    /// JSON array; writes replace.
    Sequence,
    /// Anything else; writes replace.
    Scalar,
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Shape::Mapping,
            Value::Array(_) => Shape::Sequence,
            _ => Shape::Scalar,
        }
    }

    /// The value a write of `candidate` commits on top of `current`.
    pub(crate) fn merge(self, current: &Value, candidate: Value) -> Result<Value, StateError> {
        match self {
            Shape::Mapping => {
                if !candidate.is_object() {
                    return Err(StateError::ShapeMismatch {
                        expected: Shape::Mapping,
                        got: Shape::of(&candidate),
                    });
                }
                let mut next = current.clone();
                deep_merge(&mut next, candidate);
                Ok(next)
            }
            Shape::Sequence => Ok(match candidate {
                Value::Array(items) => Value::Array(items),
                other => Value::Array(vec![other]),
            }),
            Shape::Scalar => Ok(candidate),
        }
    }
}

/// Merge `patch` into `target`.
///
/// Objects merge key by key, recursively; any other patch value replaces
/// what it lands on.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(&key).is_some_and(Value::is_object);
                match target.get_mut(&key) {
                    Some(existing) if nested => deep_merge(existing, value),
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
