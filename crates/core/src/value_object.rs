//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: a `Currency` or a
/// ledger snapshot carries no identity of its own. To "modify" one, build a new
/// one with the new values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
