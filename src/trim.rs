//! The trimmer filter: restricts a message flow to a `[begin, end]`
//! nanosecond range (inclusive).
//!
//! Boundary messages pass through so the per-stream structure stays
//! valid. Excluded events are never silently dropped; they become
//! `DiscardedEvents` messages, keeping the discarded-count invariant
//! (discarded + passed == input events) across the pipeline.

use crate::clock::ClockSnapshot;
use crate::error::Error;
use crate::graph::{Filter, PortSpec};
use crate::iter::{MessageIterator, Pull, UpstreamIterator};
use crate::message::Message;
use crate::model::Stream;
use crate::types::{StreamClassId, StreamId};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

pub struct Trimmer {
    begin_ns: Option<i64>,
    end_ns: Option<i64>,
}

impl Trimmer {
    /// `None` bounds are open on that side.
    pub fn new(begin_ns: Option<i64>, end_ns: Option<i64>) -> Self {
        Self { begin_ns, end_ns }
    }
}

impl Filter for Trimmer {
    fn initial_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("in"), PortSpec::output("out")]
    }

    fn create_message_iterator(
        &mut self,
        mut upstreams: Vec<UpstreamIterator>,
        _port: &str,
    ) -> Result<Box<dyn MessageIterator>, Error> {
        let upstream = upstreams
            .pop()
            .ok_or_else(|| Error::DisconnectedPort("in".to_owned()))?;
        Ok(Box::new(TrimmerIterator::new(
            upstream,
            self.begin_ns,
            self.end_ns,
        )))
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Placement {
    Before,
    Inside,
    After,
}

struct PendingDiscard {
    count: u64,
    range_begin_ns: Option<i64>,
    range_end_ns: i64,
}

#[derive(Default)]
struct StreamTrimState {
    pending: Option<PendingDiscard>,
    last_ns: Option<i64>,
}

type StreamKey = (StreamClassId, StreamId);

pub struct TrimmerIterator {
    upstream: UpstreamIterator,
    begin_ns: Option<i64>,
    end_ns: Option<i64>,
    outbox: VecDeque<Message>,
    streams: BTreeMap<StreamKey, StreamTrimState>,
}

impl TrimmerIterator {
    pub fn new(upstream: UpstreamIterator, begin_ns: Option<i64>, end_ns: Option<i64>) -> Self {
        Self {
            upstream,
            begin_ns,
            end_ns,
            outbox: VecDeque::new(),
            streams: BTreeMap::new(),
        }
    }

    fn place(&self, ns: i64) -> Placement {
        if let Some(begin) = self.begin_ns {
            if ns < begin {
                return Placement::Before;
            }
        }
        if let Some(end) = self.end_ns {
            if ns > end {
                return Placement::After;
            }
        }
        Placement::Inside
    }

    fn stream_key(stream: &Rc<Stream>) -> StreamKey {
        (stream.class().id(), stream.id())
    }

    fn snapshot_at(stream: &Rc<Stream>, ns: i64) -> Result<Option<ClockSnapshot>, Error> {
        match stream.class().default_clock_class() {
            Some(cc) => {
                let cycles = cc.cycles_from_ns_from_origin(ns)?;
                Ok(Some(ClockSnapshot::new(cc, cycles)))
            }
            None => Ok(None),
        }
    }

    /// Emit the stream's accumulated discard notice, if any, ahead of the
    /// message that triggered the flush.
    fn flush_pending(&mut self, stream: &Rc<Stream>) -> Result<(), Error> {
        let key = Self::stream_key(stream);
        let pending = match self.streams.get_mut(&key).and_then(|s| s.pending.take()) {
            Some(p) => p,
            None => return Ok(()),
        };
        let beginning = match pending.range_begin_ns {
            Some(ns) => Self::snapshot_at(stream, ns)?,
            None => None,
        };
        let end = Self::snapshot_at(stream, pending.range_end_ns)?;
        self.outbox.push_back(Message::discarded_events_with_snapshots(
            stream.clone(),
            Some(pending.count),
            beginning,
            end,
        ));
        Ok(())
    }

    fn record_drop(&mut self, stream: &Rc<Stream>, ns: i64, placement: Placement) {
        let key = Self::stream_key(stream);
        let state = self.streams.entry(key).or_default();
        // The gap closes at the range start for too-early events, or just
        // past the dropped event for too-late ones.
        let range_end_ns = match placement {
            Placement::Before => self.begin_ns.unwrap_or(ns),
            _ => ns.saturating_add(1),
        };
        match state.pending.as_mut() {
            Some(p) => {
                p.count += 1;
                p.range_end_ns = p.range_end_ns.max(range_end_ns);
            }
            None => {
                state.pending = Some(PendingDiscard {
                    count: 1,
                    range_begin_ns: state.last_ns,
                    range_end_ns,
                });
            }
        }
    }

    fn note_time(&mut self, stream: &Rc<Stream>, ns: Option<i64>) {
        if let Some(ns) = ns {
            let key = Self::stream_key(stream);
            self.streams.entry(key).or_default().last_ns = Some(ns);
        }
    }

    fn process(&mut self, msg: Message) -> Result<(), Error> {
        match &msg {
            Message::Event(m) => {
                let stream = m.event().stream().clone();
                let ns = msg.ns_from_origin()?;
                // Clockless events are always inside the range
                let placement = ns.map_or(Placement::Inside, |ns| self.place(ns));
                match (placement, ns) {
                    (Placement::Inside, _) | (_, None) => {
                        self.flush_pending(&stream)?;
                        self.note_time(&stream, ns);
                        self.outbox.push_back(msg);
                    }
                    (_, Some(ns)) => self.record_drop(&stream, ns, placement),
                }
            }
            Message::MessageIteratorInactivity(m) => {
                let ns = m.clock_snapshot().ns_from_origin()?;
                if self.place(ns) == Placement::Inside {
                    self.outbox.push_back(msg);
                }
            }
            Message::StreamEnd(m) => {
                let stream = m.stream().clone();
                self.flush_pending(&stream)?;
                self.outbox.push_back(msg);
            }
            Message::PacketEnd(m) => {
                let stream = m.packet().stream().clone();
                self.flush_pending(&stream)?;
                let ns = msg.ns_from_origin()?;
                self.note_time(&stream, ns);
                self.outbox.push_back(msg);
            }
            _ => {
                // Remaining boundary and discarded messages pass through,
                // contributing their time to the stream position.
                if let Some(stream) = msg.stream().cloned() {
                    let ns = msg.ns_from_origin()?;
                    self.note_time(&stream, ns);
                }
                self.outbox.push_back(msg);
            }
        }
        Ok(())
    }
}

impl MessageIterator for TrimmerIterator {
    fn next_message(&mut self) -> Result<Pull, Error> {
        loop {
            if let Some(msg) = self.outbox.pop_front() {
                return Ok(Pull::Message(msg));
            }
            match self.upstream.next_message()? {
                Pull::Message(msg) => self.process(msg)?,
                Pull::Again => return Ok(Pull::Again),
                Pull::End => return Ok(Pull::End),
            }
        }
    }
}
