//! Convenience layer: the default component class registry and a
//! ready-made source -> muxer [-> trimmer] -> collector pipeline exposed
//! as a plain `Iterator` over messages.

use crate::error::Error;
use crate::graph::{
    ComponentClass, ComponentClassRegistry, FilterFactory, Graph, PortDirection, PortRef,
    RunStatus, SinkFactory, SourceFactory,
};
use crate::message::Message;
use crate::mux::Muxer;
use crate::sink::{CollectorSink, DetailsSink, MessageBuffer};
use crate::source::{trace_infos, ClockOverrides, PacketSource, TraceLayout};
use crate::trim::Trimmer;
use crate::types::ComponentId;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

pub const PACKET_SOURCE_CLASS: &str = "ctf-packets";
pub const MUXER_CLASS: &str = "muxer";
pub const TRIMMER_CLASS: &str = "trimmer";
pub const DETAILS_SINK_CLASS: &str = "details";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TrimmerParams {
    begin_ns: Option<i64>,
    end_ns: Option<i64>,
}

/// Registry holding every component class this crate ships.
pub fn default_registry() -> Result<ComponentClassRegistry, Error> {
    let mut registry = ComponentClassRegistry::new();
    let source: SourceFactory = Box::new(|params| Ok(Box::new(PacketSource::from_params(params)?)));
    registry.register_source(
        PACKET_SOURCE_CLASS,
        ComponentClass::new(
            "Reads CTF packets from binary stream files",
            "Parameters: layout (path to a TOML trace layout descriptor), \
             clock-class-offset-s, clock-class-offset-ns, \
             force-clock-class-origin-unix-epoch",
            source,
        )
        .with_query(Box::new(|object, params| match object {
            "trace-infos" => trace_infos(params),
            _ => Err(Error::NoSuchQueryObject(
                PACKET_SOURCE_CLASS.to_owned(),
                object.to_owned(),
            )),
        })),
    )?;
    let muxer: FilterFactory = Box::new(|_params| Ok(Box::new(Muxer::new())));
    registry.register_filter(
        MUXER_CLASS,
        ComponentClass::new(
            "Merges input flows into one time-ordered sequence",
            "No parameters",
            muxer,
        ),
    )?;
    let trimmer: FilterFactory = Box::new(|params| {
        let params: TrimmerParams = serde_json::from_value(params.clone())
            .map_err(|e| Error::Layout(format!("Invalid trimmer parameters. {e}")))?;
        Ok(Box::new(Trimmer::new(params.begin_ns, params.end_ns)))
    });
    registry.register_filter(
        TRIMMER_CLASS,
        ComponentClass::new(
            "Keeps messages inside a [begin-ns, end-ns] range",
            "Parameters: begin-ns, end-ns (either may be omitted)",
            trimmer,
        ),
    )?;
    let details: SinkFactory = Box::new(|_params| Ok(Box::new(DetailsSink::stdout())));
    registry.register_sink(
        DETAILS_SINK_CLASS,
        ComponentClass::new(
            "Prints one line per message to stdout",
            "No parameters",
            details,
        ),
    )?;
    Ok(registry)
}

/// Find an input port on `component` that nothing is connected to yet.
fn free_input_port(graph: &Graph, component: ComponentId) -> Result<PortRef, Error> {
    graph
        .input_ports(component)
        .into_iter()
        .map(|name| PortRef::new(component, PortDirection::Input, name))
        .find(|port| !graph.port_is_connected(port))
        .ok_or(Error::GraphState("no free input port left"))
}

/// Connect every output port of `upstream` to a free input port of
/// `downstream`. Ports added by connection hooks (the muxer grows one
/// input per connection) are picked up as they appear.
pub fn connect_all_outputs(
    graph: &mut Graph,
    upstream: ComponentId,
    downstream: ComponentId,
) -> Result<(), Error> {
    for name in graph.output_ports(upstream) {
        let out = PortRef::new(upstream, PortDirection::Output, name);
        let inp = free_input_port(graph, downstream)?;
        graph.connect_ports(&out, &inp)?;
    }
    Ok(())
}

/// A whole-trace read as one iterator: packet source into muxer,
/// optionally through a trimmer, into a collecting sink.
pub struct TracePipeline {
    graph: Graph,
    buffer: MessageBuffer,
    retry_duration: Duration,
    done: bool,
}

impl TracePipeline {
    pub fn new(
        layout: &TraceLayout,
        overrides: &ClockOverrides,
        trim_range: Option<(Option<i64>, Option<i64>)>,
    ) -> Result<Self, Error> {
        let mut graph = Graph::new();
        let source = graph.add_source(
            "source",
            Box::new(PacketSource::new(layout, overrides)?),
        )?;
        let muxer = graph.add_filter("muxer", Box::new(Muxer::new()))?;
        connect_all_outputs(&mut graph, source, muxer)?;

        let mut tail = muxer;
        if let Some((begin_ns, end_ns)) = trim_range {
            let trimmer = graph.add_filter("trimmer", Box::new(Trimmer::new(begin_ns, end_ns)))?;
            connect_all_outputs(&mut graph, tail, trimmer)?;
            tail = trimmer;
        }

        let buffer: MessageBuffer = Rc::new(RefCell::new(VecDeque::new()));
        let collector = graph.add_sink("collector", Box::new(CollectorSink::new(buffer.clone())))?;
        connect_all_outputs(&mut graph, tail, collector)?;
        graph.configure()?;

        Ok(Self {
            graph,
            buffer,
            retry_duration: Duration::from_millis(10),
            done: false,
        })
    }

    pub fn with_retry_duration(mut self, retry_duration: Duration) -> Self {
        self.retry_duration = retry_duration;
        self
    }
}

impl Iterator for TracePipeline {
    type Item = Result<Message, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(msg) = self.buffer.borrow_mut().pop_front() {
                return Some(Ok(msg));
            }
            if self.done {
                return None;
            }
            match self.graph.run_once() {
                Ok(RunStatus::Ok) => (),
                Ok(RunStatus::TryAgain) => std::thread::sleep(self.retry_duration),
                Ok(RunStatus::End) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::value::Field;
    use crate::source::{write_stream_file, EventSpec, PacketSpec};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const LAYOUT: &str = r#"
        name = "pipeline-test"

        [clock]
        frequency = 1000000000

        [[event]]
        id = 0
        name = "tick"

        [event.payload]
        kind = "struct"
        members = [{ name = "seq", class = { kind = "unsigned-integer", bits = 32 } }]
    "#;

    fn payload(layout: &TraceLayout, seq: u64) -> Field {
        let class = layout.events[0].payload.as_ref().unwrap().to_class().unwrap();
        let mut f = Field::new(class);
        f.member_mut("seq").unwrap().set_unsigned(seq).unwrap();
        f
    }

    fn two_stream_layout(dir: &std::path::Path) -> TraceLayout {
        let mut layout = TraceLayout::parse(LAYOUT).unwrap();
        let files: Vec<PathBuf> = (0..2).map(|i| dir.join(format!("stream{i}.bin"))).collect();

        // Interleaved timestamps across the two streams
        for (idx, file) in files.iter().enumerate() {
            let base = 10 + idx as u64 * 5;
            let packets = vec![PacketSpec {
                stream_id: idx as u64,
                timestamp_begin: base,
                timestamp_end: base + 20,
                events_discarded: 0,
                events: vec![
                    EventSpec::new(0, base + 1, Some(payload(&layout, 0))),
                    EventSpec::new(0, base + 11, Some(payload(&layout, 1))),
                ],
            }];
            std::fs::write(file, write_stream_file(&layout, packets).unwrap()).unwrap();
        }
        layout.stream_files = files;
        layout
    }

    #[test]
    fn merges_two_streams_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = two_stream_layout(dir.path());
        let pipeline = TracePipeline::new(&layout, &ClockOverrides::default(), None).unwrap();
        let messages: Vec<Message> = pipeline.map(|r| r.unwrap()).collect();

        let event_ns: Vec<i64> = messages
            .iter()
            .filter(|m| matches!(m, Message::Event(_)))
            .map(|m| m.ns_from_origin().unwrap().unwrap())
            .collect();
        assert_eq!(event_ns, vec![11, 16, 21, 26]);

        let mut sorted = event_ns.clone();
        sorted.sort_unstable();
        assert_eq!(event_ns, sorted);
        // Both streams open and close
        let begins = messages
            .iter()
            .filter(|m| matches!(m, Message::StreamBeginning(_)))
            .count();
        let ends = messages
            .iter()
            .filter(|m| matches!(m, Message::StreamEnd(_)))
            .count();
        assert_eq!((begins, ends), (2, 2));
    }

    #[test]
    fn trims_events_outside_the_range() {
        let dir = tempfile::tempdir().unwrap();
        let layout = two_stream_layout(dir.path());
        let pipeline =
            TracePipeline::new(&layout, &ClockOverrides::default(), Some((Some(15), Some(22))))
                .unwrap();
        let messages: Vec<Message> = pipeline.map(|r| r.unwrap()).collect();

        let event_ns: Vec<i64> = messages
            .iter()
            .filter(|m| matches!(m, Message::Event(_)))
            .map(|m| m.ns_from_origin().unwrap().unwrap())
            .collect();
        assert_eq!(event_ns, vec![16, 21]);

        let discarded: u64 = messages
            .iter()
            .filter_map(|m| match m {
                Message::DiscardedEvents(d) => d.count(),
                _ => None,
            })
            .sum();
        assert_eq!(discarded, 2);
    }

    #[test]
    fn registry_answers_the_trace_infos_query() {
        let dir = tempfile::tempdir().unwrap();
        let layout = two_stream_layout(dir.path());
        let layout_path = dir.path().join("layout.toml");
        // Top-level keys must precede the table sections
        let descriptor = format!("stream-files = [\"stream0.bin\", \"stream1.bin\"]\n{LAYOUT}");
        std::fs::write(&layout_path, descriptor).unwrap();
        drop(layout);

        let registry = default_registry().unwrap();
        let infos = registry
            .query(
                PACKET_SOURCE_CLASS,
                "trace-infos",
                &serde_json::json!({ "layout": layout_path.display().to_string() }),
            )
            .unwrap();
        assert_eq!(infos[0]["begin-ns"], serde_json::json!(10));
        assert_eq!(infos[0]["end-ns"], serde_json::json!(30));
        assert_eq!(infos[1]["begin-ns"], serde_json::json!(15));

        assert!(matches!(
            registry.query(PACKET_SOURCE_CLASS, "bogus", &serde_json::json!({})),
            Err(Error::NoSuchQueryObject(_, _))
        ));
    }
}
