use crate::error::Error;
use crate::graph::port::{PortRef, PortSpec};
use crate::graph::SinkContext;
use crate::iter::{MessageIterator, UpstreamIterator};
use std::collections::BTreeMap;

/// Outcome of one `Sink::consume` call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsumeStatus {
    Ok,
    /// Nothing ready upstream; try again later.
    Again,
    /// The sink is done and wants no further consume calls.
    End,
}

/// A message producer. Declares output ports and hands out one message
/// iterator per connected output port at configure time.
pub trait Source {
    /// Ports the component starts with, applied when it is added to a graph.
    fn initial_ports(&self) -> Vec<PortSpec>;

    /// Veto hook; returning `Ok(false)` refuses the connection.
    fn accept_output_port_connection(
        &mut self,
        _port: &str,
        _peer: &PortRef,
    ) -> Result<bool, Error> {
        Ok(true)
    }

    /// Post-connection hook. Returned port specs are added to this
    /// component by the graph after the hook returns.
    fn output_port_connected(&mut self, _port: &str, _peer: &PortRef) -> Result<Vec<PortSpec>, Error> {
        Ok(Vec::new())
    }

    fn graph_is_configured(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn create_message_iterator(&mut self, port: &str) -> Result<Box<dyn MessageIterator>, Error>;

    fn finalize(&mut self) {}
}

/// A message transformer with input and output ports.
pub trait Filter {
    fn initial_ports(&self) -> Vec<PortSpec>;

    fn accept_input_port_connection(&mut self, _port: &str, _peer: &PortRef) -> Result<bool, Error> {
        Ok(true)
    }

    fn accept_output_port_connection(
        &mut self,
        _port: &str,
        _peer: &PortRef,
    ) -> Result<bool, Error> {
        Ok(true)
    }

    fn input_port_connected(&mut self, _port: &str, _peer: &PortRef) -> Result<Vec<PortSpec>, Error> {
        Ok(Vec::new())
    }

    fn output_port_connected(&mut self, _port: &str, _peer: &PortRef) -> Result<Vec<PortSpec>, Error> {
        Ok(Vec::new())
    }

    fn graph_is_configured(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Build the iterator for one of this filter's output ports. The graph
    /// supplies one upstream iterator per connected input port, in input
    /// port order.
    fn create_message_iterator(
        &mut self,
        upstreams: Vec<UpstreamIterator>,
        port: &str,
    ) -> Result<Box<dyn MessageIterator>, Error>;

    fn finalize(&mut self) {}
}

/// A message consumer, driven by the graph's run loop.
pub trait Sink {
    fn initial_ports(&self) -> Vec<PortSpec>;

    fn accept_input_port_connection(&mut self, _port: &str, _peer: &PortRef) -> Result<bool, Error> {
        Ok(true)
    }

    fn input_port_connected(&mut self, _port: &str, _peer: &PortRef) -> Result<Vec<PortSpec>, Error> {
        Ok(Vec::new())
    }

    /// Called once when the graph leaves the configuring state. The context
    /// is how the sink obtains iterators on its connected input ports.
    fn graph_is_configured(&mut self, ctx: &mut SinkContext<'_>) -> Result<(), Error>;

    fn consume(&mut self) -> Result<ConsumeStatus, Error>;

    fn finalize(&mut self) {}
}

pub type SourceFactory = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Source>, Error>>;
pub type FilterFactory = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Filter>, Error>>;
pub type SinkFactory = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Sink>, Error>>;

/// A query handler answers named-object lookups against a component
/// class, e.g. `trace-infos`, without instantiating a component.
pub type QueryHandler = Box<dyn Fn(&str, &serde_json::Value) -> Result<serde_json::Value, Error>>;

pub struct ComponentClass<F> {
    pub description: String,
    pub help: String,
    pub factory: F,
    pub query: Option<QueryHandler>,
}

impl<F> ComponentClass<F> {
    pub fn new<D: AsRef<str>, H: AsRef<str>>(description: D, help: H, factory: F) -> Self {
        Self {
            description: description.as_ref().to_owned(),
            help: help.as_ref().to_owned(),
            factory,
            query: None,
        }
    }

    pub fn with_query(mut self, handler: QueryHandler) -> Self {
        self.query = Some(handler);
        self
    }
}

/// Explicit component class registration, keyed by class name within
/// each of the three roles.
#[derive(Default)]
pub struct ComponentClassRegistry {
    sources: BTreeMap<String, ComponentClass<SourceFactory>>,
    filters: BTreeMap<String, ComponentClass<FilterFactory>>,
    sinks: BTreeMap<String, ComponentClass<SinkFactory>>,
}

impl ComponentClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<T: AsRef<str>>(
        &mut self,
        name: T,
        class: ComponentClass<SourceFactory>,
    ) -> Result<(), Error> {
        let name = name.as_ref();
        if self.sources.contains_key(name) {
            return Err(Error::ComponentClassExists(name.to_owned()));
        }
        self.sources.insert(name.to_owned(), class);
        Ok(())
    }

    pub fn register_filter<T: AsRef<str>>(
        &mut self,
        name: T,
        class: ComponentClass<FilterFactory>,
    ) -> Result<(), Error> {
        let name = name.as_ref();
        if self.filters.contains_key(name) {
            return Err(Error::ComponentClassExists(name.to_owned()));
        }
        self.filters.insert(name.to_owned(), class);
        Ok(())
    }

    pub fn register_sink<T: AsRef<str>>(
        &mut self,
        name: T,
        class: ComponentClass<SinkFactory>,
    ) -> Result<(), Error> {
        let name = name.as_ref();
        if self.sinks.contains_key(name) {
            return Err(Error::ComponentClassExists(name.to_owned()));
        }
        self.sinks.insert(name.to_owned(), class);
        Ok(())
    }

    pub fn instantiate_source(
        &self,
        class_name: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Source>, Error> {
        let class = self
            .sources
            .get(class_name)
            .ok_or_else(|| Error::NoSuchComponentClass(class_name.to_owned()))?;
        (class.factory)(params)
    }

    pub fn instantiate_filter(
        &self,
        class_name: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Filter>, Error> {
        let class = self
            .filters
            .get(class_name)
            .ok_or_else(|| Error::NoSuchComponentClass(class_name.to_owned()))?;
        (class.factory)(params)
    }

    pub fn instantiate_sink(
        &self,
        class_name: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Sink>, Error> {
        let class = self
            .sinks
            .get(class_name)
            .ok_or_else(|| Error::NoSuchComponentClass(class_name.to_owned()))?;
        (class.factory)(params)
    }

    /// Run a class-level query, e.g. `trace-infos` against a source class.
    pub fn query(
        &self,
        class_name: &str,
        object: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, Error> {
        let handler = self
            .sources
            .get(class_name)
            .map(|c| c.query.as_ref())
            .or_else(|| self.filters.get(class_name).map(|c| c.query.as_ref()))
            .or_else(|| self.sinks.get(class_name).map(|c| c.query.as_ref()))
            .ok_or_else(|| Error::NoSuchComponentClass(class_name.to_owned()))?;
        match handler {
            Some(h) => h(object, params),
            None => Err(Error::NoSuchQueryObject(
                class_name.to_owned(),
                object.to_owned(),
            )),
        }
    }
}
