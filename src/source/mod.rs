//! The file packet source: reads binary stream files described by a
//! [`TraceLayout`] and turns their packets into messages.
//!
//! Wire form per stream file: repeated packets of
//! `header { magic, stream_id }`,
//! `context { packet_size_bits, content_size_bits, timestamp_begin,
//! timestamp_end, events_discarded }`, then `header { id, timestamp }` +
//! scopes per event until the content size is exhausted. The cursor then
//! skips to the packet size boundary. Everything is decoded through the
//! field-class codec; this module holds no bit-twiddling of its own.

pub mod layout;
pub mod writer;

pub use layout::TraceLayout;
pub use writer::{write_stream_file, EventSpec, PacketSpec};

use crate::clock::ClockClass;
use crate::codec::{decode_field, BitCursor, ScopeFields};
use crate::error::{DecodeError, Error};
use crate::field::class::{ByteOrder, FieldClass, FieldClassRef};
use crate::field::path::Scope;
use crate::field::value::Field;
use crate::graph::{PortSpec, Source};
use crate::iter::{MessageIterator, Pull};
use crate::message::Message;
use crate::model::{Event, EventClass, Packet, Stream, Trace, TraceClass};
use crate::types::EventClassId;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

/// First word of every packet.
pub const PACKET_MAGIC: u32 = 0xc1fc_1fc1;

/// Bits each packet is padded to a multiple of.
pub const PACKET_ALIGNMENT_BITS: u64 = 64;

fn u32_le() -> Result<FieldClassRef, Error> {
    FieldClass::unsigned_integer(32, ByteOrder::Little)
}

fn u64_le() -> Result<FieldClassRef, Error> {
    FieldClass::unsigned_integer(64, ByteOrder::Little)
}

/// The fixed field classes framing every packet and event.
pub(crate) struct WireClasses {
    pub packet_header: FieldClassRef,
    pub packet_context: FieldClassRef,
    pub event_header: FieldClassRef,
}

impl WireClasses {
    pub(crate) fn for_layout(layout: &TraceLayout) -> Result<Self, Error> {
        let packet_header = FieldClass::structure(vec![
            ("magic".to_owned(), u32_le()?),
            ("stream_id".to_owned(), u64_le()?),
        ])?;
        let mut context_members = vec![
            ("packet_size_bits".to_owned(), u64_le()?),
            ("content_size_bits".to_owned(), u64_le()?),
            ("timestamp_begin".to_owned(), u64_le()?),
            ("timestamp_end".to_owned(), u64_le()?),
            ("events_discarded".to_owned(), u64_le()?),
        ];
        if let Some(extra) = layout.packet_context.as_ref() {
            context_members.extend(extra.struct_members()?);
        }
        let packet_context = FieldClass::structure(context_members)?;
        let event_header = FieldClass::structure(vec![
            ("id".to_owned(), u64_le()?),
            ("timestamp".to_owned(), u64_le()?),
        ])?;
        Ok(Self {
            packet_header,
            packet_context,
            event_header,
        })
    }
}

/// Clock corrections applied on top of the layout's clock class.
#[derive(Clone, Debug, Default)]
pub struct ClockOverrides {
    pub offset_seconds: Option<i64>,
    pub offset_ns: Option<i64>,
    pub force_unix_epoch_origin: bool,
}

fn build_clock(
    layout: &layout::ClockLayout,
    overrides: &ClockOverrides,
) -> Result<Rc<ClockClass>, Error> {
    let mut seconds = layout.offset_seconds;
    if let Some(s) = overrides.offset_seconds {
        seconds = seconds.saturating_add(s);
    }
    let mut cycles = i128::from(layout.offset_cycles);
    if let Some(ns) = overrides.offset_ns {
        cycles += i128::from(ns) * i128::from(layout.frequency) / 1_000_000_000;
    }
    let cycles = u64::try_from(cycles).map_err(|_| {
        Error::Layout("The clock offset override makes the cycle offset negative".to_owned())
    })?;
    let mut cc = ClockClass::new(layout.frequency)?
        .with_offset(seconds, cycles)
        .with_precision(layout.precision)
        .with_unix_epoch_origin(layout.unix_epoch_origin || overrides.force_unix_epoch_origin);
    if let Some(name) = layout.name.as_deref() {
        cc = cc.with_name(name);
    }
    if let Some(desc) = layout.description.as_deref() {
        cc = cc.with_description(desc);
    }
    if let Some(uuid) = layout.uuid {
        cc = cc.with_uuid(uuid);
    }
    Ok(Rc::new(cc))
}

/// Instantiation parameters for the packet source component class.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PacketSourceParams {
    pub layout: PathBuf,
    pub clock_class_offset_s: Option<i64>,
    pub clock_class_offset_ns: Option<i64>,
    #[serde(default)]
    pub force_clock_class_origin_unix_epoch: bool,
}

impl PacketSourceParams {
    pub fn from_json(params: &serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(params.clone())
            .map_err(|e| Error::Layout(format!("Invalid packet source parameters. {e}")))
    }

    fn overrides(&self) -> ClockOverrides {
        ClockOverrides {
            offset_seconds: self.clock_class_offset_s,
            offset_ns: self.clock_class_offset_ns,
            force_unix_epoch_origin: self.force_clock_class_origin_unix_epoch,
        }
    }
}

/// Source component: one output port (`stream0`, `stream1`, ...) per
/// stream file in the layout.
pub struct PacketSource {
    stream_files: Vec<PathBuf>,
    streams: Vec<Rc<Stream>>,
    wire: Rc<WireClasses>,
    // The trace holds the frozen metadata alive for the streams
    _trace: Rc<Trace>,
}

impl PacketSource {
    pub fn from_params(params: &serde_json::Value) -> Result<Self, Error> {
        let params = PacketSourceParams::from_json(params)?;
        let layout = TraceLayout::load(&params.layout)?;
        Self::new(&layout, &params.overrides())
    }

    pub fn new(layout: &TraceLayout, overrides: &ClockOverrides) -> Result<Self, Error> {
        let wire = Rc::new(WireClasses::for_layout(layout)?);

        let tc = TraceClass::new();
        let sc = tc.create_stream_class()?;
        if let Some(clock) = layout.clock.as_ref() {
            sc.set_default_clock_class(build_clock(clock, overrides)?)?;
        }
        sc.set_packet_context_class(wire.packet_context.clone())?;
        if let Some(common) = layout.event_common_context.as_ref() {
            sc.set_event_common_context_class(common.to_class()?)?;
        }
        sc.set_assigns_automatic_event_class_id(false)?;
        for ev in layout.events.iter() {
            let ec = sc.create_event_class_with_id(EventClassId(ev.id))?;
            if let Some(name) = ev.name.as_deref() {
                ec.set_name(name)?;
            }
            if let Some(level) = ev.log_level {
                ec.set_log_level(level)?;
            }
            if let Some(ctx) = ev.specific_context.as_ref() {
                ec.set_specific_context_class(ctx.to_class()?)?;
            }
            if let Some(payload) = ev.payload.as_ref() {
                ec.set_payload_class(payload.to_class()?)?;
            }
        }

        let mut trace = Trace::builder(tc);
        if let Some(name) = layout.name.as_deref() {
            trace = trace.name(name);
        }
        for (k, v) in layout.env.iter() {
            trace = trace.env_entry(k, v.as_str());
        }
        let trace = trace.build();

        let mut streams = Vec::with_capacity(layout.stream_files.len());
        for path in layout.stream_files.iter() {
            let stream = trace.create_stream(&sc)?;
            stream.set_name(path.display().to_string());
            streams.push(stream);
        }

        Ok(Self {
            stream_files: layout.stream_files.clone(),
            streams,
            wire,
            _trace: trace,
        })
    }

    fn stream_index(&self, port: &str) -> Result<usize, Error> {
        port.strip_prefix("stream")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|idx| *idx < self.streams.len())
            .ok_or_else(|| Error::GraphState("unknown packet source output port"))
    }
}

impl Source for PacketSource {
    fn initial_ports(&self) -> Vec<PortSpec> {
        (0..self.stream_files.len())
            .map(|idx| PortSpec::output(format!("stream{idx}")))
            .collect()
    }

    fn create_message_iterator(&mut self, port: &str) -> Result<Box<dyn MessageIterator>, Error> {
        let idx = self.stream_index(port)?;
        let data = std::fs::read(&self.stream_files[idx])?;
        debug!(
            file = %self.stream_files[idx].display(),
            bytes = data.len(),
            "Opened stream file"
        );
        Ok(Box::new(FileStreamIterator::new(
            data,
            self.streams[idx].clone(),
            self.wire.clone(),
        )))
    }
}

struct FileStreamIterator {
    data: Vec<u8>,
    pos_bits: u64,
    stream: Rc<Stream>,
    wire: Rc<WireClasses>,
    outbox: VecDeque<Message>,
    discarded_total: u64,
    last_packet_end: Option<u64>,
    done: bool,
}

impl FileStreamIterator {
    fn new(data: Vec<u8>, stream: Rc<Stream>, wire: Rc<WireClasses>) -> Self {
        let mut outbox = VecDeque::new();
        outbox.push_back(Message::stream_beginning(stream.clone()));
        Self {
            data,
            pos_bits: 0,
            stream,
            wire,
            outbox,
            discarded_total: 0,
            last_packet_end: None,
            done: false,
        }
    }

    fn clocked(&self) -> bool {
        self.stream.class().default_clock_class().is_some()
    }

    fn total_bits(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    fn decode_packet(&mut self) -> Result<(), Error> {
        let mut cursor = BitCursor::new(&self.data);
        cursor.seek_to(self.pos_bits)?;
        let packet_start = cursor.position_bits();
        let no_scopes = ScopeFields::default();

        let header = decode_field(
            &mut cursor,
            &self.wire.packet_header,
            Scope::PacketContext,
            &no_scopes,
        )?;
        let magic = header.member("magic")?.unsigned()?;
        if magic as u32 != PACKET_MAGIC {
            return Err(DecodeError::BadMagic {
                offset: packet_start,
                found: magic as u32,
                expected: PACKET_MAGIC,
            }
            .into());
        }

        let context = decode_field(
            &mut cursor,
            &self.wire.packet_context,
            Scope::PacketContext,
            &no_scopes,
        )?;
        let packet_size_bits = context.member("packet_size_bits")?.unsigned()?;
        let content_size_bits = context.member("content_size_bits")?.unsigned()?;
        let ts_begin = context.member("timestamp_begin")?.unsigned()?;
        let ts_end = context.member("timestamp_end")?.unsigned()?;
        let events_discarded = context.member("events_discarded")?.unsigned()?;
        if content_size_bits > packet_size_bits {
            return Err(DecodeError::InvalidContentSize {
                packet_size_bits,
                content_size_bits,
            }
            .into());
        }
        let packet_end_bits = packet_start.saturating_add(packet_size_bits);
        if packet_end_bits > self.total_bits() {
            return Err(DecodeError::Truncated {
                offset: cursor.position_bits(),
                needed: packet_end_bits - packet_start,
                available: self.total_bits() - packet_start,
            }
            .into());
        }

        let packet = Packet::new(self.stream.clone(), Some(context.clone()));
        self.outbox.push_back(if self.clocked() {
            Message::packet_beginning_with_clock_snapshot(packet.clone(), ts_begin)?
        } else {
            Message::packet_beginning(packet.clone())
        });

        // Counter deltas across packets surface as discarded-events
        // messages between the packet boundaries
        if events_discarded > self.discarded_total {
            let delta = events_discarded - self.discarded_total;
            let range = self
                .clocked()
                .then(|| (self.last_packet_end.unwrap_or(ts_begin), ts_begin));
            self.outbox
                .push_back(Message::discarded_events(self.stream.clone(), Some(delta), range)?);
            self.discarded_total = events_discarded;
        }

        let content_end = packet_start.saturating_add(content_size_bits);
        while cursor.position_bits() < content_end {
            let msg = self.decode_event(&mut cursor, &packet, &context)?;
            self.outbox.push_back(msg);
        }

        self.outbox.push_back(if self.clocked() {
            Message::packet_end_with_clock_snapshot(packet, ts_end)?
        } else {
            Message::packet_end(packet)
        });
        self.last_packet_end = Some(ts_end);
        self.pos_bits = packet_end_bits;
        Ok(())
    }

    fn decode_event(
        &self,
        cursor: &mut BitCursor<'_>,
        packet: &Rc<Packet>,
        packet_context: &Field,
    ) -> Result<Message, Error> {
        let mut scopes = ScopeFields {
            packet_context: Some(packet_context),
            ..Default::default()
        };
        let header = decode_field(cursor, &self.wire.event_header, Scope::PacketContext, &scopes)?;
        let id = header.member("id")?.unsigned()?;
        let timestamp = header.member("timestamp")?.unsigned()?;
        let class = self.event_class(id)?;

        let common = match self.stream.class().event_common_context_class() {
            Some(fc) => Some(decode_field(
                cursor,
                &fc,
                Scope::EventCommonContext,
                &scopes,
            )?),
            None => None,
        };
        scopes.event_common_context = common.as_ref();
        let specific = match class.specific_context_class() {
            Some(fc) => Some(decode_field(
                cursor,
                &fc,
                Scope::EventSpecificContext,
                &scopes,
            )?),
            None => None,
        };
        scopes.event_specific_context = specific.as_ref();
        let payload = match class.payload_class() {
            Some(fc) => Some(decode_field(cursor, &fc, Scope::EventPayload, &scopes)?),
            None => None,
        };

        let event = Event::new(
            class,
            self.stream.clone(),
            Some(packet.clone()),
            common,
            specific,
            payload,
        );
        if self.clocked() {
            Message::event_with_clock_snapshot(event, timestamp)
        } else {
            Ok(Message::event(event))
        }
    }

    fn event_class(&self, id: u64) -> Result<Rc<EventClass>, Error> {
        self.stream
            .class()
            .event_class_by_id(EventClassId(id))
            .ok_or_else(|| Error::Layout(format!("No event class with ID {id} in the layout")))
    }
}

impl MessageIterator for FileStreamIterator {
    fn next_message(&mut self) -> Result<Pull, Error> {
        loop {
            if let Some(msg) = self.outbox.pop_front() {
                return Ok(Pull::Message(msg));
            }
            if self.done {
                return Ok(Pull::End);
            }
            if self.pos_bits >= self.total_bits() {
                self.outbox.push_back(match self.last_packet_end {
                    Some(cycles) if self.clocked() => {
                        Message::stream_end_with_clock_snapshot(self.stream.clone(), cycles)?
                    }
                    _ => Message::stream_end(self.stream.clone()),
                });
                self.done = true;
                continue;
            }
            self.decode_packet()?;
        }
    }
}

/// Per-stream-file begin/end time ranges, the `trace-infos` query result.
pub fn trace_infos(params: &serde_json::Value) -> Result<serde_json::Value, Error> {
    let params = PacketSourceParams::from_json(params)?;
    let layout = TraceLayout::load(&params.layout)?;
    let wire = WireClasses::for_layout(&layout)?;
    let clock = layout
        .clock
        .as_ref()
        .map(|c| build_clock(c, &params.overrides()))
        .transpose()?;

    let mut infos = Vec::new();
    for path in layout.stream_files.iter() {
        let data = std::fs::read(path)?;
        let mut begin_ns: Option<i64> = None;
        let mut end_ns: Option<i64> = None;
        for (ts_begin, ts_end) in scan_packet_bounds(&data, &wire)? {
            if let Some(cc) = clock.as_ref() {
                let b = cc.cycles_to_ns_from_origin(ts_begin)?;
                let e = cc.cycles_to_ns_from_origin(ts_end)?;
                begin_ns = Some(begin_ns.map_or(b, |cur| cur.min(b)));
                end_ns = Some(end_ns.map_or(e, |cur| cur.max(e)));
            }
        }
        infos.push(serde_json::json!({
            "stream-file": path.display().to_string(),
            "begin-ns": begin_ns,
            "end-ns": end_ns,
        }));
    }
    Ok(serde_json::Value::Array(infos))
}

/// Walk a stream file packet by packet, reading only framing, and return
/// each packet's `[timestamp_begin, timestamp_end]` cycles.
fn scan_packet_bounds(data: &[u8], wire: &WireClasses) -> Result<Vec<(u64, u64)>, Error> {
    let mut cursor = BitCursor::new(data);
    let no_scopes = ScopeFields::default();
    let mut bounds = Vec::new();
    while !cursor.is_exhausted() {
        let packet_start = cursor.position_bits();
        let header = decode_field(&mut cursor, &wire.packet_header, Scope::PacketContext, &no_scopes)?;
        let magic = header.member("magic")?.unsigned()?;
        if magic as u32 != PACKET_MAGIC {
            return Err(DecodeError::BadMagic {
                offset: packet_start,
                found: magic as u32,
                expected: PACKET_MAGIC,
            }
            .into());
        }
        let context = decode_field(&mut cursor, &wire.packet_context, Scope::PacketContext, &no_scopes)?;
        let packet_size_bits = context.member("packet_size_bits")?.unsigned()?;
        bounds.push((
            context.member("timestamp_begin")?.unsigned()?,
            context.member("timestamp_end")?.unsigned()?,
        ));
        cursor.seek_to(packet_start.saturating_add(packet_size_bits))?;
    }
    Ok(bounds)
}
