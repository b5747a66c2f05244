//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances with the same attribute
/// values are equal and interchangeable. They are immutable; "changing" one
/// means building a new value (e.g. `Quantity::checked_sub` returns a new
/// quantity rather than mutating in place).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
