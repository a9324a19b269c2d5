//! The message type system: everything that flows through a graph.
//!
//! A message is either a stream lifetime boundary, a packet boundary, an
//! event, a discarded-items notice, or a liveness signal. Stream-scoped
//! messages share their `Rc<Stream>`; event messages carry the decoded
//! field scopes through an `Rc<Event>`.

use crate::clock::ClockSnapshot;
use crate::error::Error;
use crate::model::{Event, Packet, Stream};
use std::rc::Rc;

#[derive(Clone)]
pub enum Message {
    StreamBeginning(StreamMessage),
    StreamEnd(StreamMessage),
    PacketBeginning(PacketMessage),
    PacketEnd(PacketMessage),
    Event(EventMessage),
    DiscardedEvents(DiscardedItemsMessage),
    DiscardedPackets(DiscardedItemsMessage),
    MessageIteratorInactivity(InactivityMessage),
    StreamActivityBeginning(StreamActivityMessage),
    StreamActivityEnd(StreamActivityMessage),
}

impl Message {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::StreamBeginning(_) => "stream-beginning",
            Message::StreamEnd(_) => "stream-end",
            Message::PacketBeginning(_) => "packet-beginning",
            Message::PacketEnd(_) => "packet-end",
            Message::Event(_) => "event",
            Message::DiscardedEvents(_) => "discarded-events",
            Message::DiscardedPackets(_) => "discarded-packets",
            Message::MessageIteratorInactivity(_) => "message-iterator-inactivity",
            Message::StreamActivityBeginning(_) => "stream-activity-beginning",
            Message::StreamActivityEnd(_) => "stream-activity-end",
        }
    }

    /// The stream this message belongs to, if any. Inactivity messages are
    /// iterator-scoped and have none.
    pub fn stream(&self) -> Option<&Rc<Stream>> {
        match self {
            Message::StreamBeginning(m) | Message::StreamEnd(m) => Some(&m.stream),
            Message::PacketBeginning(m) | Message::PacketEnd(m) => Some(m.packet.stream()),
            Message::Event(m) => Some(m.event.stream()),
            Message::DiscardedEvents(m) | Message::DiscardedPackets(m) => Some(&m.stream),
            Message::MessageIteratorInactivity(_) => None,
            Message::StreamActivityBeginning(m) | Message::StreamActivityEnd(m) => Some(&m.stream),
        }
    }

    /// The message's default clock snapshot. Fails when the stream class
    /// declares no default clock class; stream boundary messages on clocked
    /// streams may legitimately carry no snapshot, reported as `Ok(None)`.
    pub fn default_clock_snapshot(&self) -> Result<Option<&ClockSnapshot>, Error> {
        let snapshot = match self {
            Message::StreamBeginning(m) | Message::StreamEnd(m) => m.default_clock_snapshot.as_ref(),
            Message::PacketBeginning(m) | Message::PacketEnd(m) => {
                m.default_clock_snapshot.as_ref()
            }
            Message::Event(m) => m.default_clock_snapshot.as_ref(),
            Message::DiscardedEvents(m) | Message::DiscardedPackets(m) => m.beginning.as_ref(),
            Message::MessageIteratorInactivity(m) => return Ok(Some(&m.clock_snapshot)),
            Message::StreamActivityBeginning(m) | Message::StreamActivityEnd(m) => match &m.time {
                ActivityTime::Known(cs) => return Ok(Some(cs)),
                ActivityTime::Unknown | ActivityTime::Infinite => return Ok(None),
            },
        };
        if let Some(stream) = self.stream() {
            if stream.class().default_clock_class().is_none() {
                return Err(Error::NonexistentClockSnapshot);
            }
        }
        Ok(snapshot)
    }

    /// Nanoseconds from the clock origin of the default snapshot, if one
    /// exists. This is the multiplexer's ordering key.
    pub fn ns_from_origin(&self) -> Result<Option<i64>, Error> {
        match self.default_clock_snapshot() {
            Ok(Some(cs)) => cs.ns_from_origin().map(Some),
            Ok(None) | Err(Error::NonexistentClockSnapshot) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Clone)]
pub struct StreamMessage {
    stream: Rc<Stream>,
    default_clock_snapshot: Option<ClockSnapshot>,
}

impl StreamMessage {
    pub fn stream(&self) -> &Rc<Stream> {
        &self.stream
    }
}

#[derive(Clone)]
pub struct PacketMessage {
    packet: Rc<Packet>,
    default_clock_snapshot: Option<ClockSnapshot>,
}

impl PacketMessage {
    pub fn packet(&self) -> &Rc<Packet> {
        &self.packet
    }
}

#[derive(Clone)]
pub struct EventMessage {
    event: Rc<Event>,
    default_clock_snapshot: Option<ClockSnapshot>,
}

impl EventMessage {
    pub fn event(&self) -> &Rc<Event> {
        &self.event
    }
}

/// Discarded events or packets: an optional count and an optional
/// `[beginning, end)` snapshot range bounding when the loss happened.
#[derive(Clone)]
pub struct DiscardedItemsMessage {
    stream: Rc<Stream>,
    count: Option<u64>,
    beginning: Option<ClockSnapshot>,
    end: Option<ClockSnapshot>,
}

impl DiscardedItemsMessage {
    pub fn stream(&self) -> &Rc<Stream> {
        &self.stream
    }

    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn beginning(&self) -> Option<&ClockSnapshot> {
        self.beginning.as_ref()
    }

    pub fn end(&self) -> Option<&ClockSnapshot> {
        self.end.as_ref()
    }
}

/// The upstream is alive but has produced nothing up to this point in
/// time. Lets downstream clocks advance during quiet periods.
#[derive(Clone)]
pub struct InactivityMessage {
    clock_snapshot: ClockSnapshot,
}

impl InactivityMessage {
    pub fn clock_snapshot(&self) -> &ClockSnapshot {
        &self.clock_snapshot
    }
}

#[derive(Clone)]
pub enum ActivityTime {
    Unknown,
    Infinite,
    Known(ClockSnapshot),
}

#[derive(Clone)]
pub struct StreamActivityMessage {
    stream: Rc<Stream>,
    time: ActivityTime,
}

impl StreamActivityMessage {
    pub fn stream(&self) -> &Rc<Stream> {
        &self.stream
    }

    pub fn time(&self) -> &ActivityTime {
        &self.time
    }
}

fn snapshot_for(stream: &Rc<Stream>, cycles: u64) -> Result<ClockSnapshot, Error> {
    stream
        .class()
        .default_clock_class()
        .map(|cc| ClockSnapshot::new(cc, cycles))
        .ok_or(Error::NonexistentClockSnapshot)
}

impl Message {
    pub fn stream_beginning(stream: Rc<Stream>) -> Self {
        Message::StreamBeginning(StreamMessage {
            stream,
            default_clock_snapshot: None,
        })
    }

    pub fn stream_beginning_with_clock_snapshot(
        stream: Rc<Stream>,
        cycles: u64,
    ) -> Result<Self, Error> {
        let cs = snapshot_for(&stream, cycles)?;
        Ok(Message::StreamBeginning(StreamMessage {
            stream,
            default_clock_snapshot: Some(cs),
        }))
    }

    pub fn stream_end(stream: Rc<Stream>) -> Self {
        Message::StreamEnd(StreamMessage {
            stream,
            default_clock_snapshot: None,
        })
    }

    pub fn stream_end_with_clock_snapshot(stream: Rc<Stream>, cycles: u64) -> Result<Self, Error> {
        let cs = snapshot_for(&stream, cycles)?;
        Ok(Message::StreamEnd(StreamMessage {
            stream,
            default_clock_snapshot: Some(cs),
        }))
    }

    pub fn packet_beginning(packet: Rc<Packet>) -> Self {
        Message::PacketBeginning(PacketMessage {
            packet,
            default_clock_snapshot: None,
        })
    }

    pub fn packet_beginning_with_clock_snapshot(
        packet: Rc<Packet>,
        cycles: u64,
    ) -> Result<Self, Error> {
        let cs = snapshot_for(packet.stream(), cycles)?;
        Ok(Message::PacketBeginning(PacketMessage {
            packet,
            default_clock_snapshot: Some(cs),
        }))
    }

    pub fn packet_end(packet: Rc<Packet>) -> Self {
        Message::PacketEnd(PacketMessage {
            packet,
            default_clock_snapshot: None,
        })
    }

    pub fn packet_end_with_clock_snapshot(packet: Rc<Packet>, cycles: u64) -> Result<Self, Error> {
        let cs = snapshot_for(packet.stream(), cycles)?;
        Ok(Message::PacketEnd(PacketMessage {
            packet,
            default_clock_snapshot: Some(cs),
        }))
    }

    pub fn event(event: Event) -> Self {
        Message::Event(EventMessage {
            event: Rc::new(event),
            default_clock_snapshot: None,
        })
    }

    pub fn event_with_clock_snapshot(event: Event, cycles: u64) -> Result<Self, Error> {
        let cs = snapshot_for(event.stream(), cycles)?;
        Ok(Message::Event(EventMessage {
            event: Rc::new(event),
            default_clock_snapshot: Some(cs),
        }))
    }

    pub fn discarded_events(
        stream: Rc<Stream>,
        count: Option<u64>,
        range_cycles: Option<(u64, u64)>,
    ) -> Result<Self, Error> {
        Ok(Message::DiscardedEvents(Self::discarded_items(
            stream,
            count,
            range_cycles,
        )?))
    }

    pub fn discarded_packets(
        stream: Rc<Stream>,
        count: Option<u64>,
        range_cycles: Option<(u64, u64)>,
    ) -> Result<Self, Error> {
        Ok(Message::DiscardedPackets(Self::discarded_items(
            stream,
            count,
            range_cycles,
        )?))
    }

    fn discarded_items(
        stream: Rc<Stream>,
        count: Option<u64>,
        range_cycles: Option<(u64, u64)>,
    ) -> Result<DiscardedItemsMessage, Error> {
        let (beginning, end) = match range_cycles {
            Some((begin, end)) => (
                Some(snapshot_for(&stream, begin)?),
                Some(snapshot_for(&stream, end)?),
            ),
            None => (None, None),
        };
        Ok(DiscardedItemsMessage {
            stream,
            count,
            beginning,
            end,
        })
    }

    /// Build a discarded message from ready-made snapshots, e.g. when a
    /// filter re-times a loss it manufactured itself.
    pub(crate) fn discarded_events_with_snapshots(
        stream: Rc<Stream>,
        count: Option<u64>,
        beginning: Option<ClockSnapshot>,
        end: Option<ClockSnapshot>,
    ) -> Self {
        Message::DiscardedEvents(DiscardedItemsMessage {
            stream,
            count,
            beginning,
            end,
        })
    }

    pub fn message_iterator_inactivity(clock_snapshot: ClockSnapshot) -> Self {
        Message::MessageIteratorInactivity(InactivityMessage { clock_snapshot })
    }

    pub fn stream_activity_beginning(stream: Rc<Stream>, time: ActivityTime) -> Self {
        Message::StreamActivityBeginning(StreamActivityMessage { stream, time })
    }

    pub fn stream_activity_end(stream: Rc<Stream>, time: ActivityTime) -> Self {
        Message::StreamActivityEnd(StreamActivityMessage { stream, time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockClass;
    use crate::model::{Trace, TraceClass};
    use pretty_assertions::assert_eq;

    fn clocked_stream() -> Rc<Stream> {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(Rc::new(ClockClass::new(1_000_000_000).unwrap()))
            .unwrap();
        let trace = Trace::new(tc);
        trace.create_stream(&sc).unwrap()
    }

    fn clockless_stream() -> Rc<Stream> {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let trace = Trace::new(tc);
        trace.create_stream(&sc).unwrap()
    }

    #[test]
    fn snapshot_on_clockless_stream_is_refused() {
        let stream = clockless_stream();
        assert!(matches!(
            Message::stream_beginning_with_clock_snapshot(stream.clone(), 10),
            Err(Error::NonexistentClockSnapshot)
        ));
        let msg = Message::stream_beginning(stream);
        assert!(matches!(
            msg.default_clock_snapshot(),
            Err(Error::NonexistentClockSnapshot)
        ));
        // But the ordering key helper treats the stream as unclocked
        assert_eq!(msg.ns_from_origin().unwrap(), None);
    }

    #[test]
    fn event_message_carries_ns_from_origin() {
        let stream = clocked_stream();
        let msg = Message::stream_beginning_with_clock_snapshot(stream, 1_234).unwrap();
        assert_eq!(msg.ns_from_origin().unwrap(), Some(1_234));
    }

    #[test]
    fn discarded_range_orders_by_beginning() {
        let stream = clocked_stream();
        let msg = Message::discarded_events(stream, Some(7), Some((100, 200))).unwrap();
        assert_eq!(msg.ns_from_origin().unwrap(), Some(100));
        match &msg {
            Message::DiscardedEvents(m) => {
                assert_eq!(m.count(), Some(7));
                assert_eq!(m.end().unwrap().cycles(), 200);
            }
            _ => panic!("wrong kind"),
        }
    }
}
