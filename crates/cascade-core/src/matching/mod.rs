//! # Match Engine
//!
//! The three primitives every other subsystem leans on:
//!
//! - [`path`] — dotted JSON-path extraction against a context snapshot
//! - [`ops`] — the comparison operators used by `when` clauses, polling
//!   predicates, and delegation run conditions
//! - [`template`] — `${path}` placeholder interpolation over arbitrary
//!   JSON values
//! - [`condition`] — `when` condition trees composed from the above
//!
//! Path misses are values, not errors: extraction returns `None`, operators
//! fail closed, and interpolation substitutes empty/null unless strict
//! templating is enabled.

pub mod condition;
pub mod ops;
pub mod path;
pub mod template;

pub use condition::Condition;
pub use ops::{evaluate_operator, Operator};
pub use path::extract_json_path;
pub use template::interpolate;
