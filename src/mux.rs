//! The multiplexer filter: merges N upstream message flows into one
//! sequence ordered by default clock snapshot time.

use crate::error::Error;
use crate::graph::{Filter, PortRef, PortSpec};
use crate::iter::{MessageIterator, Pull, UpstreamIterator};
use crate::message::Message;

/// Filter component with one output port and a growing set of input
/// ports: connecting `inN` makes `inN+1` appear, so there is always a
/// free input to connect to.
pub struct Muxer {
    next_input: usize,
}

impl Muxer {
    pub fn new() -> Self {
        Self { next_input: 1 }
    }
}

impl Default for Muxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for Muxer {
    fn initial_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("in0"), PortSpec::output("out")]
    }

    fn input_port_connected(&mut self, _port: &str, _peer: &PortRef) -> Result<Vec<PortSpec>, Error> {
        let name = format!("in{}", self.next_input);
        self.next_input += 1;
        Ok(vec![PortSpec::input(name)])
    }

    fn create_message_iterator(
        &mut self,
        upstreams: Vec<UpstreamIterator>,
        _port: &str,
    ) -> Result<Box<dyn MessageIterator>, Error> {
        Ok(Box::new(MuxerIterator::new(upstreams)))
    }
}

struct MuxInput {
    iterator: UpstreamIterator,
    buffered: Option<Message>,
    /// Last default-snapshot time seen on this input; holds the position
    /// of clockless messages relative to clocked inputs.
    last_ns: Option<i64>,
    ended: bool,
}

/// Merge core. One buffered message per live input; the input whose
/// buffered message has the smallest ordering key is drained first.
/// A try-again upstream never blocks inputs that are ready.
pub struct MuxerIterator {
    inputs: Vec<MuxInput>,
}

impl MuxerIterator {
    pub fn new(upstreams: Vec<UpstreamIterator>) -> Self {
        Self {
            inputs: upstreams
                .into_iter()
                .map(|iterator| MuxInput {
                    iterator,
                    buffered: None,
                    last_ns: None,
                    ended: false,
                })
                .collect(),
        }
    }
}

impl MessageIterator for MuxerIterator {
    fn next_message(&mut self) -> Result<Pull, Error> {
        let mut any_waiting = false;
        for input in self.inputs.iter_mut() {
            if input.ended || input.buffered.is_some() {
                continue;
            }
            match input.iterator.next_message()? {
                Pull::Message(msg) => {
                    if let Some(ns) = msg.ns_from_origin()? {
                        input.last_ns = Some(ns);
                    }
                    input.buffered = Some(msg);
                }
                Pull::Again => any_waiting = true,
                Pull::End => input.ended = true,
            }
        }

        // Ordering key: time first, then clockless before clocked at the
        // same instant, then input index (strict < keeps the first, so
        // equal keys resolve to the lowest index).
        let mut best: Option<(usize, (i64, bool))> = None;
        for (idx, input) in self.inputs.iter().enumerate() {
            if let Some(msg) = &input.buffered {
                let own_ns = msg.ns_from_origin()?;
                let clocked = own_ns.is_some();
                let ns = own_ns.or(input.last_ns).unwrap_or(i64::MIN);
                let key = (ns, clocked);
                if best.map_or(true, |(_, b)| key < b) {
                    best = Some((idx, key));
                }
            }
        }
        if let Some((idx, _)) = best {
            if let Some(msg) = self.inputs[idx].buffered.take() {
                return Ok(Pull::Message(msg));
            }
        }

        if any_waiting {
            Ok(Pull::Again)
        } else {
            Ok(Pull::End)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockClass;
    use crate::model::{Stream, Trace, TraceClass};
    use std::rc::Rc;

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

    fn upstream(steps: Vec<Result<Pull, Error>>) -> UpstreamIterator {
        UpstreamIterator::new(Box::new(Scripted { steps }))
    }

    fn at(stream: &Rc<Stream>, cycles: u64) -> Result<Pull, Error> {
        Ok(Pull::Message(
            Message::stream_beginning_with_clock_snapshot(stream.clone(), cycles).unwrap(),
        ))
    }

    fn drain_ns(mux: &mut MuxerIterator) -> Vec<Option<i64>> {
        let mut out = Vec::new();
        loop {
            match mux.next_message().unwrap() {
                Pull::Message(m) => out.push(m.ns_from_origin().unwrap()),
                Pull::Again => continue,
                Pull::End => return out,
            }
        }
    }

    #[test]
    fn merges_two_clocked_inputs_in_time_order() {
        let a = clocked_stream();
        let b = clocked_stream();
        let mut mux = MuxerIterator::new(vec![
            upstream(vec![at(&a, 10), at(&a, 30), at(&a, 50)]),
            upstream(vec![at(&b, 20), at(&b, 40)]),
        ]);
        assert_eq!(
            drain_ns(&mut mux),
            vec![Some(10), Some(20), Some(30), Some(40), Some(50)]
        );
    }

    #[test]
    fn ties_resolve_to_the_lower_input_index() {
        let a = clocked_stream();
        let b = clocked_stream();
        let mut mux = MuxerIterator::new(vec![
            upstream(vec![at(&b, 7)]),
            upstream(vec![at(&a, 7)]),
        ]);
        let mut streams = Vec::new();
        loop {
            match mux.next_message().unwrap() {
                Pull::Message(m) => streams.push(Rc::ptr_eq(m.stream().unwrap(), &b)),
                Pull::Again => continue,
                Pull::End => break,
            }
        }
        assert_eq!(streams, vec![true, false]);
    }

    #[test]
    fn again_does_not_block_ready_inputs() {
        let a = clocked_stream();
        let b = clocked_stream();
        let mut mux = MuxerIterator::new(vec![
            upstream(vec![Ok(Pull::Again), at(&a, 100)]),
            upstream(vec![at(&b, 5)]),
        ]);
        // First pull: input 0 is waiting, but input 1 has a message ready
        match mux.next_message().unwrap() {
            Pull::Message(m) => assert_eq!(m.ns_from_origin().unwrap(), Some(5)),
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn again_when_nothing_ready_and_an_input_is_live() {
        let a = clocked_stream();
        let mut mux = MuxerIterator::new(vec![upstream(vec![Ok(Pull::Again), at(&a, 1)])]);
        assert!(matches!(mux.next_message().unwrap(), Pull::Again));
        assert!(matches!(mux.next_message().unwrap(), Pull::Message(_)));
        assert!(matches!(mux.next_message().unwrap(), Pull::End));
    }

    #[test]
    fn clockless_input_sorts_before_clocked() {
        let a = clockless_stream();
        let b = clocked_stream();
        let mut mux = MuxerIterator::new(vec![
            upstream(vec![at(&b, 99)]),
            upstream(vec![Ok(Pull::Message(Message::stream_beginning(a.clone())))]),
        ]);
        assert_eq!(drain_ns(&mut mux), vec![None, Some(99)]);
    }

    #[test]
    fn connecting_an_input_grows_a_fresh_one() {
        let mut muxer = Muxer::new();
        let peer = PortRef::new(crate::types::ComponentId(0), crate::graph::PortDirection::Output, "out");
        let added = muxer.input_port_connected("in0", &peer).unwrap();
        assert_eq!(added, vec![PortSpec::input("in1")]);
        let added = muxer.input_port_connected("in1", &peer).unwrap();
        assert_eq!(added, vec![PortSpec::input("in2")]);
    }
}
