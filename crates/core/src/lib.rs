//! `rollcall-core` — shared building blocks for the attendance portal.
//!
//! Pure primitives only: domain errors, identifiers, value objects and the
//! cancellation scope used by asynchronous consumers.

pub mod error;
pub mod id;
pub mod scope;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::PrincipalId;
pub use scope::Scope;
pub use value_object::ValueObject;
