//! The processing graph: components, ports, connections, and the run loop.
//!
//! A graph is configured (components added, ports connected), then run.
//! Connection hooks may grow components re-entrantly by returning port
//! specs, which the graph applies after the hook returns; that keeps every
//! mutation of graph topology in one place.

pub mod component;
pub mod port;

pub use component::{
    ComponentClass, ComponentClassRegistry, ConsumeStatus, Filter, FilterFactory, QueryHandler,
    Sink, SinkFactory, Source, SourceFactory,
};
pub use port::{Connection, PortDirection, PortRef, PortSpec};

use crate::error::Error;
use crate::graph::port::PortSpec as Spec;
use crate::iter::UpstreamIterator;
use crate::types::{ComponentId, ConnectionId, Interruptor};
use std::cell::{Cell, RefCell};
use std::time::Duration;
use tracing::debug;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GraphState {
    Configuring,
    Configured,
    Running,
    Canceled,
    Faulted,
}

/// Outcome of one `run_once` step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunStatus {
    Ok,
    /// The consumed sink had nothing ready; sleep and retry.
    TryAgain,
    /// Every sink has ended.
    End,
}

enum ComponentKind {
    Source(RefCell<Box<dyn Source>>),
    Filter(RefCell<Box<dyn Filter>>),
    Sink(RefCell<Box<dyn Sink>>),
}

impl ComponentKind {
    fn role(&self) -> &'static str {
        match self {
            ComponentKind::Source(_) => "source",
            ComponentKind::Filter(_) => "filter",
            ComponentKind::Sink(_) => "sink",
        }
    }
}

struct ComponentEntry {
    id: ComponentId,
    name: String,
    kind: ComponentKind,
    input_ports: Vec<String>,
    output_ports: Vec<String>,
    retired: Cell<bool>,
}

/// Handed to a sink's `graph_is_configured` hook so it can build the
/// iterator chains feeding its input ports.
pub struct SinkContext<'a> {
    graph: &'a Graph,
    sink: ComponentId,
}

impl SinkContext<'_> {
    pub fn component(&self) -> ComponentId {
        self.sink
    }

    pub fn input_ports(&self) -> Vec<String> {
        self.graph
            .entry(self.sink)
            .map(|e| e.input_ports.clone())
            .unwrap_or_default()
    }

    /// Build the full upstream iterator chain behind one of the sink's
    /// connected input ports.
    pub fn create_message_iterator(&mut self, input_port: &str) -> Result<UpstreamIterator, Error> {
        let conn = self
            .graph
            .connection_to_input(self.sink, input_port)
            .ok_or_else(|| Error::DisconnectedPort(input_port.to_owned()))?;
        let upstream = conn.upstream.clone();
        let mut visiting = vec![self.sink];
        self.graph.build_iterator(&upstream, &mut visiting)
    }
}

type PortsConnectedListener = Box<dyn Fn(&PortRef, &PortRef)>;
type PortAddedListener = Box<dyn Fn(&PortRef)>;

pub struct Graph {
    state: GraphState,
    components: Vec<ComponentEntry>,
    connections: Vec<Connection>,
    ports_connected_listeners: Vec<PortsConnectedListener>,
    port_added_listeners: Vec<PortAddedListener>,
    next_sink: usize,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            state: GraphState::Configuring,
            components: Vec::new(),
            connections: Vec::new(),
            ports_connected_listeners: Vec::new(),
            port_added_listeners: Vec::new(),
            next_sink: 0,
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    fn set_state(&mut self, state: GraphState) {
        self.state = state;
    }

    fn check_not_canceled(&self) -> Result<(), Error> {
        if self.state() == GraphState::Canceled {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }

    /// Mark the graph canceled. Every later connect or run attempt fails
    /// with `Error::Canceled`.
    pub fn cancel(&mut self) {
        self.set_state(GraphState::Canceled);
    }

    pub fn add_ports_connected_listener(&mut self, listener: PortsConnectedListener) {
        self.ports_connected_listeners.push(listener);
    }

    pub fn add_port_added_listener(&mut self, listener: PortAddedListener) {
        self.port_added_listeners.push(listener);
    }

    fn entry(&self, id: ComponentId) -> Option<&ComponentEntry> {
        self.components.get(id.0)
    }

    fn entry_or_err(&self, id: ComponentId) -> Result<&ComponentEntry, Error> {
        self.entry(id)
            .ok_or(Error::GraphState("unknown component ID"))
    }

    fn check_unique_name(&self, name: &str) -> Result<(), Error> {
        if self.components.iter().any(|c| c.name == name) {
            return Err(Error::GraphState("component name already in use"));
        }
        Ok(())
    }

    pub fn add_source<T: AsRef<str>>(
        &mut self,
        name: T,
        component: Box<dyn Source>,
    ) -> Result<ComponentId, Error> {
        let initial = component.initial_ports();
        self.add_entry(name.as_ref(), ComponentKind::Source(RefCell::new(component)), initial)
    }

    pub fn add_filter<T: AsRef<str>>(
        &mut self,
        name: T,
        component: Box<dyn Filter>,
    ) -> Result<ComponentId, Error> {
        let initial = component.initial_ports();
        self.add_entry(name.as_ref(), ComponentKind::Filter(RefCell::new(component)), initial)
    }

    pub fn add_sink<T: AsRef<str>>(
        &mut self,
        name: T,
        component: Box<dyn Sink>,
    ) -> Result<ComponentId, Error> {
        let initial = component.initial_ports();
        self.add_entry(name.as_ref(), ComponentKind::Sink(RefCell::new(component)), initial)
    }

    pub fn add_source_component<T: AsRef<str>>(
        &mut self,
        registry: &ComponentClassRegistry,
        class_name: &str,
        name: T,
        params: &serde_json::Value,
    ) -> Result<ComponentId, Error> {
        let component = registry.instantiate_source(class_name, params)?;
        self.add_source(name, component)
    }

    pub fn add_filter_component<T: AsRef<str>>(
        &mut self,
        registry: &ComponentClassRegistry,
        class_name: &str,
        name: T,
        params: &serde_json::Value,
    ) -> Result<ComponentId, Error> {
        let component = registry.instantiate_filter(class_name, params)?;
        self.add_filter(name, component)
    }

    pub fn add_sink_component<T: AsRef<str>>(
        &mut self,
        registry: &ComponentClassRegistry,
        class_name: &str,
        name: T,
        params: &serde_json::Value,
    ) -> Result<ComponentId, Error> {
        let component = registry.instantiate_sink(class_name, params)?;
        self.add_sink(name, component)
    }

    fn add_entry(
        &mut self,
        name: &str,
        kind: ComponentKind,
        initial_ports: Vec<Spec>,
    ) -> Result<ComponentId, Error> {
        self.check_not_canceled()?;
        if self.state() != GraphState::Configuring {
            return Err(Error::GraphState("components can only be added while configuring"));
        }
        self.check_unique_name(name)?;
        let id = ComponentId(self.components.len());
        debug!(component = name, role = kind.role(), %id, "Adding component");
        self.components.push(ComponentEntry {
            id,
            name: name.to_owned(),
            kind,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            retired: Cell::new(false),
        });
        self.apply_port_specs(id, initial_ports)?;
        Ok(id)
    }

    pub fn component_name(&self, id: ComponentId) -> Option<&str> {
        self.entry(id).map(|e| e.name.as_str())
    }

    pub fn input_ports(&self, id: ComponentId) -> Vec<String> {
        self.entry(id).map(|e| e.input_ports.clone()).unwrap_or_default()
    }

    pub fn output_ports(&self, id: ComponentId) -> Vec<String> {
        self.entry(id).map(|e| e.output_ports.clone()).unwrap_or_default()
    }

    pub fn add_input_port<T: AsRef<str>>(
        &mut self,
        id: ComponentId,
        name: T,
    ) -> Result<PortRef, Error> {
        let name = name.as_ref().to_owned();
        self.apply_port_specs(id, vec![Spec::input(&name)])?;
        Ok(PortRef::new(id, PortDirection::Input, name))
    }

    pub fn add_output_port<T: AsRef<str>>(
        &mut self,
        id: ComponentId,
        name: T,
    ) -> Result<PortRef, Error> {
        let name = name.as_ref().to_owned();
        self.apply_port_specs(id, vec![Spec::output(&name)])?;
        Ok(PortRef::new(id, PortDirection::Output, name))
    }

    fn apply_port_specs(&mut self, id: ComponentId, specs: Vec<Spec>) -> Result<(), Error> {
        for spec in specs.into_iter() {
            let entry = self
                .components
                .get_mut(id.0)
                .ok_or(Error::GraphState("unknown component ID"))?;
            match spec.direction {
                PortDirection::Input => {
                    if matches!(entry.kind, ComponentKind::Source(_)) {
                        return Err(Error::GraphState("source components have no input ports"));
                    }
                    if entry.input_ports.iter().any(|p| *p == spec.name) {
                        return Err(Error::DuplicatePort(
                            "input",
                            spec.name,
                            entry.name.clone(),
                        ));
                    }
                    entry.input_ports.push(spec.name.clone());
                }
                PortDirection::Output => {
                    if matches!(entry.kind, ComponentKind::Sink(_)) {
                        return Err(Error::GraphState("sink components have no output ports"));
                    }
                    if entry.output_ports.iter().any(|p| *p == spec.name) {
                        return Err(Error::DuplicatePort(
                            "output",
                            spec.name,
                            entry.name.clone(),
                        ));
                    }
                    entry.output_ports.push(spec.name.clone());
                }
            }
            let port = PortRef::new(id, spec.direction, spec.name);
            for listener in self.port_added_listeners.iter() {
                listener(&port);
            }
        }
        Ok(())
    }

    fn has_port(&self, port: &PortRef) -> Result<(), Error> {
        let entry = self.entry_or_err(port.component)?;
        let (ports, dir) = match port.direction {
            PortDirection::Input => (&entry.input_ports, "input"),
            PortDirection::Output => (&entry.output_ports, "output"),
        };
        if ports.iter().any(|p| *p == port.name) {
            Ok(())
        } else {
            Err(Error::NoSuchPort(entry.name.clone(), dir, port.name.clone()))
        }
    }

    pub fn port_is_connected(&self, port: &PortRef) -> bool {
        self.connections
            .iter()
            .any(|c| c.upstream == *port || c.downstream == *port)
    }

    fn connection_to_input(&self, component: ComponentId, input_port: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| {
            c.downstream.component == component && c.downstream.name == input_port
        })
    }

    /// Connect an upstream output port to a downstream input port.
    ///
    /// Both components get a veto (`accept_*_port_connection`); a refusal
    /// surfaces as `Error::PortConnectionRefused`. After the connection is
    /// recorded, listeners fire and both components' connected hooks run;
    /// ports the hooks ask for are added before this returns.
    pub fn connect_ports(
        &mut self,
        upstream: &PortRef,
        downstream: &PortRef,
    ) -> Result<ConnectionId, Error> {
        self.check_not_canceled()?;
        if self.state() != GraphState::Configuring {
            return Err(Error::GraphState("ports can only be connected while configuring"));
        }
        if upstream.direction != PortDirection::Output || downstream.direction != PortDirection::Input
        {
            return Err(Error::GraphState(
                "connections run from an output port to an input port",
            ));
        }
        self.has_port(upstream)?;
        self.has_port(downstream)?;
        if upstream.component == downstream.component {
            let name = self.entry_or_err(upstream.component)?.name.clone();
            return Err(Error::SelfConnection(name));
        }
        if self.port_is_connected(upstream) {
            return Err(Error::PortAlreadyConnected(upstream.to_string()));
        }
        if self.port_is_connected(downstream) {
            return Err(Error::PortAlreadyConnected(downstream.to_string()));
        }

        let up_entry = self.entry_or_err(upstream.component)?;
        let accepted = match &up_entry.kind {
            ComponentKind::Source(c) => c
                .borrow_mut()
                .accept_output_port_connection(&upstream.name, downstream)?,
            ComponentKind::Filter(c) => c
                .borrow_mut()
                .accept_output_port_connection(&upstream.name, downstream)?,
            ComponentKind::Sink(_) => false,
        };
        if !accepted {
            return Err(Error::PortConnectionRefused(up_entry.name.clone()));
        }
        let down_entry = self.entry_or_err(downstream.component)?;
        let accepted = match &down_entry.kind {
            ComponentKind::Filter(c) => c
                .borrow_mut()
                .accept_input_port_connection(&downstream.name, upstream)?,
            ComponentKind::Sink(c) => c
                .borrow_mut()
                .accept_input_port_connection(&downstream.name, upstream)?,
            ComponentKind::Source(_) => false,
        };
        if !accepted {
            return Err(Error::PortConnectionRefused(down_entry.name.clone()));
        }

        let id = ConnectionId(self.connections.len());
        debug!(%upstream, %downstream, connection = %id, "Connecting ports");
        self.connections.push(Connection {
            id,
            upstream: upstream.clone(),
            downstream: downstream.clone(),
        });

        for listener in self.ports_connected_listeners.iter() {
            listener(upstream, downstream);
        }

        let up_specs = match &self.entry_or_err(upstream.component)?.kind {
            ComponentKind::Source(c) => c
                .borrow_mut()
                .output_port_connected(&upstream.name, downstream)?,
            ComponentKind::Filter(c) => c
                .borrow_mut()
                .output_port_connected(&upstream.name, downstream)?,
            ComponentKind::Sink(_) => Vec::new(),
        };
        let down_specs = match &self.entry_or_err(downstream.component)?.kind {
            ComponentKind::Filter(c) => c
                .borrow_mut()
                .input_port_connected(&downstream.name, upstream)?,
            ComponentKind::Sink(c) => c
                .borrow_mut()
                .input_port_connected(&downstream.name, upstream)?,
            ComponentKind::Source(_) => Vec::new(),
        };
        self.apply_port_specs(upstream.component, up_specs)?;
        self.apply_port_specs(downstream.component, down_specs)?;
        Ok(id)
    }

    fn build_iterator(
        &self,
        upstream: &PortRef,
        visiting: &mut Vec<ComponentId>,
    ) -> Result<UpstreamIterator, Error> {
        if visiting.contains(&upstream.component) {
            return Err(Error::GraphState("connection cycle detected"));
        }
        let entry = self.entry_or_err(upstream.component)?;
        match &entry.kind {
            ComponentKind::Source(c) => {
                let it = c.borrow_mut().create_message_iterator(&upstream.name)?;
                Ok(UpstreamIterator::new(it))
            }
            ComponentKind::Filter(c) => {
                visiting.push(upstream.component);
                let mut upstreams = Vec::new();
                for input in entry.input_ports.iter() {
                    if let Some(conn) = self.connection_to_input(entry.id, input) {
                        let up = conn.upstream.clone();
                        upstreams.push(self.build_iterator(&up, visiting)?);
                    }
                }
                visiting.pop();
                let it = c
                    .borrow_mut()
                    .create_message_iterator(upstreams, &upstream.name)?;
                Ok(UpstreamIterator::new(it))
            }
            ComponentKind::Sink(_) => Err(Error::GraphState("sinks have no output ports")),
        }
    }

    /// Finish configuration: sources and filters are notified first, then
    /// each sink builds its upstream iterator chains.
    pub fn configure(&mut self) -> Result<(), Error> {
        self.check_not_canceled()?;
        if self.state() != GraphState::Configuring {
            return Err(Error::GraphState("the graph is already configured"));
        }
        for entry in self.components.iter() {
            match &entry.kind {
                ComponentKind::Source(c) => c.borrow_mut().graph_is_configured()?,
                ComponentKind::Filter(c) => c.borrow_mut().graph_is_configured()?,
                ComponentKind::Sink(_) => (),
            }
        }
        for entry in self.components.iter() {
            if let ComponentKind::Sink(c) = &entry.kind {
                let mut ctx = SinkContext {
                    graph: self,
                    sink: entry.id,
                };
                c.borrow_mut().graph_is_configured(&mut ctx)?;
            }
        }
        self.set_state(GraphState::Configured);
        Ok(())
    }

    /// Drive the next un-retired sink through one consume call.
    pub fn run_once(&mut self) -> Result<RunStatus, Error> {
        self.check_not_canceled()?;
        match self.state() {
            GraphState::Configuring => self.configure()?,
            GraphState::Configured | GraphState::Running => (),
            GraphState::Faulted => {
                return Err(Error::GraphState("the graph previously faulted"));
            }
            GraphState::Canceled => return Err(Error::Canceled),
        }
        self.set_state(GraphState::Running);

        let sinks: Vec<usize> = self
            .components
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, ComponentKind::Sink(_)) && !e.retired.get())
            .map(|(i, _)| i)
            .collect();
        if sinks.is_empty() {
            return Ok(RunStatus::End);
        }
        // Rotate across sinks so one busy sink cannot starve the others
        let idx = sinks
            .iter()
            .copied()
            .find(|i| *i >= self.next_sink)
            .unwrap_or(sinks[0]);
        self.next_sink = idx + 1;

        let status = {
            let entry = &self.components[idx];
            match &entry.kind {
                ComponentKind::Sink(c) => c.borrow_mut().consume(),
                _ => unreachable!("filtered to sinks above"),
            }
        };
        match status {
            Ok(ConsumeStatus::Ok) => Ok(RunStatus::Ok),
            Ok(ConsumeStatus::Again) => Ok(RunStatus::TryAgain),
            Ok(ConsumeStatus::End) => {
                let entry = &self.components[idx];
                debug!(component = entry.name.as_str(), "Sink ended");
                entry.retired.set(true);
                let any_left = self
                    .components
                    .iter()
                    .any(|e| matches!(e.kind, ComponentKind::Sink(_)) && !e.retired.get());
                if any_left {
                    Ok(RunStatus::Ok)
                } else {
                    Ok(RunStatus::End)
                }
            }
            Err(e) => {
                self.set_state(GraphState::Faulted);
                Err(e)
            }
        }
    }

    /// Run to completion, sleeping `retry_duration` on try-again, bailing
    /// out with `Error::Canceled` when the interruptor fires.
    pub fn run(&mut self, interruptor: &Interruptor, retry_duration: Duration) -> Result<(), Error> {
        loop {
            if interruptor.is_set() {
                self.cancel();
                return Err(Error::Canceled);
            }
            match self.run_once()? {
                RunStatus::Ok => (),
                RunStatus::TryAgain => std::thread::sleep(retry_duration),
                RunStatus::End => return Ok(()),
            }
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for entry in self.components.iter() {
            match &entry.kind {
                ComponentKind::Source(c) => {
                    if let Ok(mut c) = c.try_borrow_mut() {
                        c.finalize();
                    }
                }
                ComponentKind::Filter(c) => {
                    if let Ok(mut c) = c.try_borrow_mut() {
                        c.finalize();
                    }
                }
                ComponentKind::Sink(c) => {
                    if let Ok(mut c) = c.try_borrow_mut() {
                        c.finalize();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::{MessageIterator, Pull};
    use crate::message::Message;
    use crate::model::{Stream, Trace, TraceClass};
    use std::rc::Rc;

    fn stream() -> Rc<Stream> {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let trace = Trace::new(tc);
        trace.create_stream(&sc).unwrap()
    }

    struct OneStreamIterator {
        queue: Vec<Message>,
    }

    impl MessageIterator for OneStreamIterator {
        fn next_message(&mut self) -> Result<Pull, Error> {
            if self.queue.is_empty() {
                Ok(Pull::End)
            } else {
                Ok(Pull::Message(self.queue.remove(0)))
            }
        }
    }

    struct TestSource {
        stream: Rc<Stream>,
        refuse: bool,
    }

    impl Source for TestSource {
        fn initial_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::output("out")]
        }

        fn accept_output_port_connection(
            &mut self,
            _port: &str,
            _peer: &PortRef,
        ) -> Result<bool, Error> {
            Ok(!self.refuse)
        }

        fn create_message_iterator(
            &mut self,
            _port: &str,
        ) -> Result<Box<dyn MessageIterator>, Error> {
            Ok(Box::new(OneStreamIterator {
                queue: vec![
                    Message::stream_beginning(self.stream.clone()),
                    Message::stream_end(self.stream.clone()),
                ],
            }))
        }
    }

    #[derive(Default)]
    struct CountingSink {
        upstream: Option<UpstreamIterator>,
        seen: usize,
    }

    impl Sink for CountingSink {
        fn initial_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::input("in")]
        }

        fn graph_is_configured(&mut self, ctx: &mut SinkContext<'_>) -> Result<(), Error> {
            self.upstream = Some(ctx.create_message_iterator("in")?);
            Ok(())
        }

        fn consume(&mut self) -> Result<ConsumeStatus, Error> {
            let it = self
                .upstream
                .as_mut()
                .ok_or(Error::GraphState("sink was never configured"))?;
            match it.next_message()? {
                Pull::Message(_) => {
                    self.seen += 1;
                    Ok(ConsumeStatus::Ok)
                }
                Pull::Again => Ok(ConsumeStatus::Again),
                Pull::End => Ok(ConsumeStatus::End),
            }
        }
    }

    struct StallingSink;

    impl Sink for StallingSink {
        fn initial_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::input("in")]
        }

        fn graph_is_configured(&mut self, _ctx: &mut SinkContext<'_>) -> Result<(), Error> {
            Ok(())
        }

        fn consume(&mut self) -> Result<ConsumeStatus, Error> {
            Ok(ConsumeStatus::Again)
        }
    }

    fn simple_graph(refuse: bool) -> (Graph, PortRef, PortRef) {
        let mut g = Graph::new();
        let src = g
            .add_source("src", Box::new(TestSource { stream: stream(), refuse }))
            .unwrap();
        let sink = g.add_sink("sink", Box::<CountingSink>::default()).unwrap();
        let out = PortRef::new(src, PortDirection::Output, "out");
        let inp = PortRef::new(sink, PortDirection::Input, "in");
        (g, out, inp)
    }

    #[test]
    fn runs_a_source_to_sink_pipeline() {
        let (mut g, out, inp) = simple_graph(false);
        g.connect_ports(&out, &inp).unwrap();
        g.configure().unwrap();
        assert_eq!(g.run_once().unwrap(), RunStatus::Ok);
        assert_eq!(g.run_once().unwrap(), RunStatus::Ok);
        assert_eq!(g.run_once().unwrap(), RunStatus::End);
    }

    #[test]
    fn a_stalled_sink_does_not_starve_the_others() {
        let (mut g, out, inp) = simple_graph(false);
        g.add_sink("stalled", Box::new(StallingSink)).unwrap();
        g.connect_ports(&out, &inp).unwrap();
        g.configure().unwrap();
        // One sink per call, rotating: the counting sink keeps making
        // progress even though the stalled sink always reports Again.
        let statuses: Vec<RunStatus> = (0..6).map(|_| g.run_once().unwrap()).collect();
        assert_eq!(
            statuses,
            vec![
                RunStatus::Ok,
                RunStatus::TryAgain,
                RunStatus::Ok,
                RunStatus::TryAgain,
                RunStatus::Ok,
                RunStatus::TryAgain,
            ]
        );
    }

    #[test]
    fn refused_connection_is_an_error() {
        let (mut g, out, inp) = simple_graph(true);
        assert!(matches!(
            g.connect_ports(&out, &inp),
            Err(Error::PortConnectionRefused(name)) if name == "src"
        ));
    }

    #[test]
    fn double_connection_is_refused() {
        let (mut g, out, inp) = simple_graph(false);
        let sink2 = g.add_sink("sink2", Box::<CountingSink>::default()).unwrap();
        g.connect_ports(&out, &inp).unwrap();
        let inp2 = PortRef::new(sink2, PortDirection::Input, "in");
        assert!(matches!(
            g.connect_ports(&out, &inp2),
            Err(Error::PortAlreadyConnected(_))
        ));
    }

    #[test]
    fn cancel_blocks_everything() {
        let (mut g, out, inp) = simple_graph(false);
        g.cancel();
        assert!(matches!(g.connect_ports(&out, &inp), Err(Error::Canceled)));
        assert!(matches!(g.run_once(), Err(Error::Canceled)));
    }

    #[test]
    fn unknown_port_is_reported() {
        let (mut g, out, inp) = simple_graph(false);
        let bogus = PortRef::new(inp.component, PortDirection::Input, "nope");
        assert!(matches!(
            g.connect_ports(&out, &bogus),
            Err(Error::NoSuchPort(_, "input", _))
        ));
    }

    #[test]
    fn interrupted_run_cancels() {
        let (mut g, out, inp) = simple_graph(false);
        g.connect_ports(&out, &inp).unwrap();
        let intr = Interruptor::new();
        intr.set();
        assert!(matches!(
            g.run(&intr, Duration::from_millis(1)),
            Err(Error::Canceled)
        ));
        assert_eq!(g.state(), GraphState::Canceled);
    }
}
