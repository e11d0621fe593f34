//! Leaf types for the argosy runtime.
//!
//! This crate contains the pieces of the framework that have no dependency on
//! the framework itself:
//!
//! - [`Value`] - a dynamically typed value (int, double, bool, string, list,
//!   nested map)
//! - [`AnyMap`] - a string-keyed map of [`Value`]s with a case-sensitive and a
//!   case-insensitive lookup policy
//! - [`Filter`] - the LDAP-style predicate language used to query property
//!   maps
//!
//! Higher layers (the service registry, listeners, trackers) build on these
//! without this crate knowing about them.

pub mod anymap;
pub mod filter;
pub mod value;

pub use anymap::{AnyMap, KeyPolicy};
pub use filter::{Filter, FilterError};
pub use value::Value;
