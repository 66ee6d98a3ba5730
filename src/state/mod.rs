//! Reactive store.
//!
//! Wraps one JSON value whose shape class is fixed at construction:
//! - Mapping: writes deep-merge onto the current value
//! - Sequence: writes replace the whole array
//! - Scalar: writes replace the value
//!
//! Listeners hear `(next, previous)` after each committed write.
//! UI components bind through [`crate::binding`].

mod shape;
mod store;

pub use shape::{deep_merge, Shape};
pub use store::{Filter, StateStore};
