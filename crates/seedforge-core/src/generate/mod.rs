//! # Record Generation
//!
//! Field specs ([`field::Field`]), the generator providers that produce
//! them, dependent-field ordering, and the engine that turns a resolved
//! trait into persisted rows.

pub mod dependent;
pub(crate) mod engine;
pub mod field;
pub mod providers;
pub mod value;
