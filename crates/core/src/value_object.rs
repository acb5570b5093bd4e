//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. A coordinate or
/// a route requirement is a value object: two with the same attributes are the
/// same thing, and "changing" one means building a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Radius { meters: f64 }
///
/// impl ValueObject for Radius {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
