//! Sink components: a buffering collector backing the pipeline iterator
//! and a pretty-printing sink for the dump binary.

use crate::error::Error;
use crate::graph::{ConsumeStatus, PortSpec, Sink, SinkContext};
use crate::iter::{MessageIterator, Pull, UpstreamIterator};
use crate::message::Message;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

pub type MessageBuffer = Rc<RefCell<VecDeque<Message>>>;

/// Moves one upstream message per consume call into a shared buffer the
/// pipeline iterator drains.
pub struct CollectorSink {
    buffer: MessageBuffer,
    upstream: Option<UpstreamIterator>,
}

impl CollectorSink {
    pub fn new(buffer: MessageBuffer) -> Self {
        Self {
            buffer,
            upstream: None,
        }
    }
}

impl Sink for CollectorSink {
    fn initial_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("in")]
    }

    fn graph_is_configured(&mut self, ctx: &mut SinkContext<'_>) -> Result<(), Error> {
        self.upstream = Some(ctx.create_message_iterator("in")?);
        Ok(())
    }

    fn consume(&mut self) -> Result<ConsumeStatus, Error> {
        let upstream = self
            .upstream
            .as_mut()
            .ok_or(Error::GraphState("sink was never configured"))?;
        match upstream.next_message()? {
            Pull::Message(msg) => {
                self.buffer.borrow_mut().push_back(msg);
                Ok(ConsumeStatus::Ok)
            }
            Pull::Again => Ok(ConsumeStatus::Again),
            Pull::End => Ok(ConsumeStatus::End),
        }
    }
}

/// Renders one line per message, in upstream order.
pub struct DetailsSink {
    out: Box<dyn Write>,
    upstream: Option<UpstreamIterator>,
}

impl DetailsSink {
    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out,
            upstream: None,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

/// One-line rendering of a message: time prefix, kind, then the kind's
/// interesting details.
pub fn format_message(msg: &Message) -> Result<String, Error> {
    let mut line = match msg.ns_from_origin()? {
        Some(ns) => format!("[{ns} ns] "),
        None => "[no time] ".to_owned(),
    };
    line.push_str(msg.kind_name());
    match msg {
        Message::Event(m) => {
            let event = m.event();
            if let Some(name) = event.class().name() {
                line.push_str(&format!(" {name}"));
            } else {
                line.push_str(&format!(" id={}", event.class().id()));
            }
            if let Some(ctx) = event.common_context_field() {
                line.push_str(&format!(" common-context={ctx}"));
            }
            if let Some(ctx) = event.specific_context_field() {
                line.push_str(&format!(" specific-context={ctx}"));
            }
            if let Some(payload) = event.payload_field() {
                line.push_str(&format!(" payload={payload}"));
            }
        }
        Message::DiscardedEvents(m) | Message::DiscardedPackets(m) => {
            match m.count() {
                Some(count) => line.push_str(&format!(" count={count}")),
                None => line.push_str(" count=unknown"),
            }
            if let (Some(b), Some(e)) = (m.beginning(), m.end()) {
                line.push_str(&format!(
                    " range=[{}, {})",
                    b.ns_from_origin()?,
                    e.ns_from_origin()?
                ));
            }
        }
        _ => (),
    }
    if let Some(stream) = msg.stream() {
        line.push_str(&format!(" stream={}", stream.id()));
    }
    Ok(line)
}

impl Sink for DetailsSink {
    fn initial_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("in")]
    }

    fn graph_is_configured(&mut self, ctx: &mut SinkContext<'_>) -> Result<(), Error> {
        self.upstream = Some(ctx.create_message_iterator("in")?);
        Ok(())
    }

    fn consume(&mut self) -> Result<ConsumeStatus, Error> {
        let upstream = self
            .upstream
            .as_mut()
            .ok_or(Error::GraphState("sink was never configured"))?;
        match upstream.next_message()? {
            Pull::Message(msg) => {
                let line = format_message(&msg)?;
                writeln!(self.out, "{line}")?;
                Ok(ConsumeStatus::Ok)
            }
            Pull::Again => Ok(ConsumeStatus::Again),
            Pull::End => {
                self.out.flush()?;
                Ok(ConsumeStatus::End)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockClass;
    use crate::model::{Event, Trace, TraceClass};
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_an_event_line() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(Rc::new(ClockClass::new(1_000_000_000).unwrap()))
            .unwrap();
        let ec = sc.create_event_class().unwrap();
        ec.set_name("sched_switch").unwrap();
        let trace = Trace::new(tc);
        let stream = trace.create_stream(&sc).unwrap();
        let event = Event::new(ec, stream, None, None, None, None);
        let msg = Message::event_with_clock_snapshot(event, 42).unwrap();
        assert_eq!(
            format_message(&msg).unwrap(),
            "[42 ns] event sched_switch stream=0"
        );
    }

    #[test]
    fn formats_a_discarded_line() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_default_clock_class(Rc::new(ClockClass::new(1_000_000_000).unwrap()))
            .unwrap();
        let trace = Trace::new(tc);
        let stream = trace.create_stream(&sc).unwrap();
        let msg = Message::discarded_events(stream, Some(4), Some((10, 20))).unwrap();
        assert_eq!(
            format_message(&msg).unwrap(),
            "[10 ns] discarded-events count=4 range=[10, 20) stream=0"
        );
    }
}
