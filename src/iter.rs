//! The pull-based message iterator protocol.
//!
//! Downstream consumers call `next_message` and receive either a message,
//! a try-again hint (live upstream with nothing ready), or an end-of-flow
//! marker. End is sticky, and so are hard errors.

use crate::error::Error;
use crate::message::Message;
use crate::types::{StreamClassId, StreamId};
use std::collections::BTreeMap;

pub enum Pull {
    Message(Message),
    /// The upstream is live but nothing is ready right now.
    Again,
    End,
}

pub trait MessageIterator {
    fn next_message(&mut self) -> Result<Pull, Error>;
}

/// Wraps a component-provided iterator and enforces protocol stickiness:
/// after `End` every later call returns `End`, and after a hard error
/// every later call fails with `Error::IteratorFaulted`.
pub struct UpstreamIterator {
    inner: Box<dyn MessageIterator>,
    ended: bool,
    faulted: bool,
}

impl UpstreamIterator {
    pub fn new(inner: Box<dyn MessageIterator>) -> Self {
        Self {
            inner,
            ended: false,
            faulted: false,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl MessageIterator for UpstreamIterator {
    fn next_message(&mut self) -> Result<Pull, Error> {
        if self.faulted {
            return Err(Error::IteratorFaulted);
        }
        if self.ended {
            return Ok(Pull::End);
        }
        match self.inner.next_message() {
            Ok(Pull::End) => {
                self.ended = true;
                Ok(Pull::End)
            }
            Ok(other) => Ok(other),
            Err(e) => {
                self.faulted = true;
                Err(e)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StreamPhase {
    Open,
    InPacket,
    Closed,
}

/// Checks the per-stream message ordering invariant:
/// stream-beginning, then packets that properly nest their events, then
/// stream-end, with discarded-item ranges never moving backwards.
#[derive(Default)]
pub struct MessageOrderValidator {
    streams: BTreeMap<(StreamClassId, StreamId), StreamPhase>,
    last_discarded_end_ns: BTreeMap<(StreamClassId, StreamId), i64>,
}

impl MessageOrderValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(msg: &Message) -> Option<(StreamClassId, StreamId)> {
        msg.stream().map(|s| (s.class().id(), s.id()))
    }

    pub fn check(&mut self, msg: &Message) -> Result<(), Error> {
        let key = match Self::key(msg) {
            Some(k) => k,
            None => return Ok(()),
        };
        let phase = self.streams.get(&key).copied();
        let next = match (msg, phase) {
            (Message::StreamBeginning(_), None) => StreamPhase::Open,
            (Message::StreamActivityBeginning(_), Some(StreamPhase::Open)) => StreamPhase::Open,
            (Message::StreamActivityEnd(_), Some(StreamPhase::Open)) => StreamPhase::Open,
            (Message::PacketBeginning(_), Some(StreamPhase::Open)) => StreamPhase::InPacket,
            (Message::Event(_), Some(StreamPhase::InPacket)) => StreamPhase::InPacket,
            // Events outside packets are valid for packet-less stream classes
            (Message::Event(_), Some(StreamPhase::Open)) => StreamPhase::Open,
            (Message::PacketEnd(_), Some(StreamPhase::InPacket)) => StreamPhase::Open,
            (Message::DiscardedEvents(m), Some(p)) if p != StreamPhase::Closed => {
                self.check_discarded_range(key, m.beginning(), m.end())?;
                p
            }
            (Message::DiscardedPackets(m), Some(StreamPhase::Open)) => {
                self.check_discarded_range(key, m.beginning(), m.end())?;
                StreamPhase::Open
            }
            (Message::StreamEnd(_), Some(StreamPhase::Open)) => StreamPhase::Closed,
            _ => {
                return Err(Error::GraphState("out-of-order message for stream"));
            }
        };
        self.streams.insert(key, next);
        Ok(())
    }

    fn check_discarded_range(
        &mut self,
        key: (StreamClassId, StreamId),
        beginning: Option<&crate::clock::ClockSnapshot>,
        end: Option<&crate::clock::ClockSnapshot>,
    ) -> Result<(), Error> {
        if let (Some(begin), Some(end)) = (beginning, end) {
            let begin_ns = begin.ns_from_origin()?;
            let end_ns = end.ns_from_origin()?;
            if end_ns < begin_ns {
                return Err(Error::GraphState("discarded range ends before it begins"));
            }
            if let Some(last) = self.last_discarded_end_ns.get(&key) {
                if begin_ns < *last {
                    return Err(Error::GraphState("discarded range moved backwards"));
                }
            }
            self.last_discarded_end_ns.insert(key, end_ns);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockClass;
    use crate::model::{Packet, Stream, Trace, TraceClass};
    use std::rc::Rc;

    struct Scripted {
        steps: Vec<Result<Pull, Error>>,
    }

    impl MessageIterator for Scripted {
        fn next_message(&mut self) -> Result<Pull, Error> {
            if self.steps.is_empty() {
                Ok(Pull::End)
            } else {
                self.steps.remove(0)
            }
        }
    }

    fn stream() -> Rc<Stream> {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(Rc::new(ClockClass::new(1_000_000_000).unwrap()))
            .unwrap();
        let trace = Trace::new(tc);
        trace.create_stream(&sc).unwrap()
    }

    #[test]
    fn end_is_sticky() {
        let s = stream();
        let mut it = UpstreamIterator::new(Box::new(Scripted {
            steps: vec![
                Ok(Pull::Message(Message::stream_beginning(s.clone()))),
                Ok(Pull::End),
                // Never reached: the wrapper pins End
                Ok(Pull::Message(Message::stream_end(s))),
            ],
        }));
        assert!(matches!(it.next_message(), Ok(Pull::Message(_))));
        assert!(matches!(it.next_message(), Ok(Pull::End)));
        assert!(matches!(it.next_message(), Ok(Pull::End)));
        assert!(it.is_ended());
    }

    #[test]
    fn errors_fault_the_iterator() {
        let mut it = UpstreamIterator::new(Box::new(Scripted {
            steps: vec![Err(Error::Unsupported("scripted".to_owned())), Ok(Pull::End)],
        }));
        assert!(it.next_message().is_err());
        assert!(matches!(it.next_message(), Err(Error::IteratorFaulted)));
    }

    #[test]
    fn validator_accepts_well_formed_flow() {
        let s = stream();
        let packet = Packet::new(s.clone(), None);
        let mut v = MessageOrderValidator::new();
        v.check(&Message::stream_beginning(s.clone())).unwrap();
        v.check(&Message::packet_beginning(packet.clone())).unwrap();
        v.check(&Message::packet_end(packet)).unwrap();
        v.check(&Message::discarded_events(s.clone(), Some(1), Some((5, 9))).unwrap())
            .unwrap();
        v.check(&Message::stream_end(s)).unwrap();
    }

    #[test]
    fn validator_rejects_event_before_stream_beginning() {
        let s = stream();
        let packet = Packet::new(s, None);
        let mut v = MessageOrderValidator::new();
        assert!(v.check(&Message::packet_beginning(packet)).is_err());
    }

    #[test]
    fn validator_rejects_backwards_discarded_ranges() {
        let s = stream();
        let mut v = MessageOrderValidator::new();
        v.check(&Message::stream_beginning(s.clone())).unwrap();
        v.check(&Message::discarded_events(s.clone(), Some(1), Some((100, 200))).unwrap())
            .unwrap();
        assert!(v
            .check(&Message::discarded_events(s, Some(1), Some((50, 80))).unwrap())
            .is_err());
    }
}
