pub use crate::clock::{ClockClass, ClockSnapshot};
pub use crate::config::{EngineConfig, ReadConfig, TrimConfig, CONFIG_ENV_VAR};
pub use crate::error::{DecodeError, Error};
pub use crate::field::class::{FieldClass, FieldClassRef};
pub use crate::field::value::Field;
pub use crate::graph::{ComponentClassRegistry, Graph, PortDirection, PortRef, RunStatus};
pub use crate::iter::{MessageIterator, Pull, UpstreamIterator};
pub use crate::message::Message;
pub use crate::model::{Event, EventClass, Packet, Stream, StreamClass, Trace, TraceClass};
pub use crate::opts::EngineOpts;
pub use crate::pipeline::{connect_all_outputs, default_registry, TracePipeline};
pub use crate::source::{ClockOverrides, PacketSource, TraceLayout};
pub use crate::types::Interruptor;
