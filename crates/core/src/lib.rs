//! `piggybank-core`: domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::MovementId;
pub use money::{
    AMOUNT_SCALE, Currency, from_minor_units, parse_amount, to_minor_units, validate_amount,
};
pub use value_object::ValueObject;
