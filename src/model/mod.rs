//! The trace metadata model and its runtime instances.
//!
//! Classes (trace, stream, event) describe structure; instances (trace,
//! stream, packet, event) carry decoded data. Classes freeze when the
//! first instance is created from them.

pub mod class;
pub mod instance;

pub use class::{EventClass, StreamClass, TraceClass};
pub use instance::{EnvValue, Event, Packet, Stream, Trace};
