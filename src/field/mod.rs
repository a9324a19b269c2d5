//! The field class (schema) and field value model.
//!
//! A [`class::FieldClass`] describes the shape and wire representation of a
//! value; a [`value::Field`] is a live instance bound to exactly one class.

pub mod class;
pub mod path;
pub mod value;

pub use class::{FieldClass, FieldClassRef};
pub use path::{FieldPath, Scope};
pub use value::Field;
