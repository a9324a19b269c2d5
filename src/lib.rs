//! # Overview
//!
//! Trace data is organized as follows:
//! * Trace, described by a frozen trace class
//!   - One or more streams (one per binary stream file)
//!     * Series of packets, each a series of events
//!
//! Processing happens in a graph of components. Sources decode stream
//! files into messages, filters reshape the message flow (the muxer
//! merges streams in time order, the trimmer keeps a time range), and
//! sinks consume the result. Messages travel through pull-based
//! iterators created when the graph is configured.
//!
//! Per stream, the message sequence follows the grammar:
//! * stream-beginning
//!   - zero or more packets: packet-beginning, events, packet-end
//!   - discarded-events / discarded-packets between packet boundaries
//! * stream-end
//!
//! The binary wire form is described by a TOML trace layout descriptor
//! ([`source::TraceLayout`]); all decoding and encoding goes through the
//! field-class codec in [`codec`].
#![deny(warnings, clippy::all)]

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod field;
pub mod graph;
pub mod iter;
pub mod message;
pub mod model;
pub mod mux;
pub mod opts;
pub mod pipeline;
pub mod prelude;
pub mod sink;
pub mod source;
pub mod tracing;
pub mod trim;
pub mod types;
