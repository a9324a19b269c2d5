//! The CTF binary codec: bit-granular cursors plus field-class-driven
//! decode and encode.
//!
//! This is the actual wire protocol of the engine. Alignment, bit width,
//! and byte order all come from the field classes; the codec itself holds
//! no layout knowledge.

pub mod bits;
pub mod decode;
pub mod encode;

pub use bits::{BitCursor, BitWriter};
pub use decode::{decode_field, ScopeFields};
pub use encode::{encode_field, materialize_wire_fields};
