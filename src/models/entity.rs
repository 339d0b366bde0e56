//! The bidirectional JSON contract every document entity implements.
//!
//! An entity type exposes three things:
//! - [`JsonEntity::is_json`]: a predicate deciding whether an untyped value has
//!   exactly the shape the entity needs. It never panics and never errors.
//! - [`JsonEntity::from_json`]: a factory from a value the caller has already
//!   checked with `is_json`. Entities that store filesystem locations take a
//!   [`PathResolver`](super::PathResolver) as their construction context.
//! - [`JsonEntity::to_json`]: the inverse, producing a value `is_json` accepts.
//!
//! Whether a factory needs the resolver is fixed per type through
//! [`JsonEntity::Context`] and asserted at compile time with
//! [`pure_value_entity!`](crate::pure_value_entity) or
//! [`path_resolving_entity!`](crate::path_resolving_entity).

use serde_json::Value;
use thiserror::Error;

/// Raised when a factory is handed a value its predicate would have rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Value does not have the shape of a {entity}: {message}")]
pub struct EntityShapeError {
    pub entity: &'static str,
    pub message: String,
}

impl EntityShapeError {
    pub fn new(entity: &'static str, message: impl Into<String>) -> Self {
        Self {
            entity,
            message: message.into(),
        }
    }
}

/// Uniform JSON mapping for document entities.
pub trait JsonEntity: Sized {
    /// Auxiliary construction argument: `()` for pure values,
    /// [`PathResolver`](super::PathResolver) for entities storing paths.
    type Context;

    /// Human-readable entity name used in error messages.
    const NAME: &'static str;

    /// Whether `value` has exactly the shape this entity serialises to.
    fn is_json(value: &Value) -> bool;

    /// Build the entity from a value already accepted by [`is_json`](Self::is_json).
    ///
    /// # Errors
    /// Returns [`EntityShapeError`] if the caller skipped validation and the
    /// value does not fit.
    fn from_json(context: Self::Context, value: &Value) -> Result<Self, EntityShapeError>;

    /// Serialise back to plain JSON.
    fn to_json(&self) -> Value;
}

/// Deserialise `value` into the serde shape `T`, reporting failures against
/// `entity`.
pub(crate) fn parse_shape<T: serde::de::DeserializeOwned>(
    entity: &'static str,
    value: &Value,
) -> Result<T, EntityShapeError> {
    T::deserialize(value).map_err(|e| EntityShapeError::new(entity, e.to_string()))
}

/// Assert at compile time that an entity's factory needs no resolver.
#[macro_export]
macro_rules! pure_value_entity {
    ($entity:ty) => {
        const _: fn() = || {
            fn assert_pure<T: $crate::models::JsonEntity<Context = ()>>() {}
            assert_pure::<$entity>();
        };
    };
}

/// Assert at compile time that an entity's factory takes a resolver.
#[macro_export]
macro_rules! path_resolving_entity {
    ($entity:ty) => {
        const _: fn() = || {
            fn assert_resolving<
                T: $crate::models::JsonEntity<Context = $crate::models::PathResolver>,
            >() {
            }
            assert_resolving::<$entity>();
        };
    };
}
