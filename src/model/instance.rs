use crate::error::Error;
use crate::field::value::Field;
use crate::model::class::{EventClass, StreamClass, TraceClass};
use crate::types::StreamId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// A trace environment entry, e.g. `hostname` or `tracer_major`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EnvValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Integer(v) => v.fmt(f),
            EnvValue::Text(v) => v.fmt(f),
        }
    }
}

impl From<i64> for EnvValue {
    fn from(v: i64) -> Self {
        EnvValue::Integer(v)
    }
}

impl From<&str> for EnvValue {
    fn from(v: &str) -> Self {
        EnvValue::Text(v.to_owned())
    }
}

/// A runtime trace. Creating one freezes its trace class and everything
/// below it; the metadata is a fixed contract from then on.
pub struct Trace {
    class: Rc<TraceClass>,
    name: Option<String>,
    uuid: Option<Uuid>,
    env: BTreeMap<String, EnvValue>,
    streams: RefCell<Vec<Rc<Stream>>>,
}

impl Trace {
    pub fn builder(class: Rc<TraceClass>) -> TraceBuilder {
        TraceBuilder {
            class,
            name: None,
            uuid: None,
            env: BTreeMap::new(),
        }
    }

    pub fn new(class: Rc<TraceClass>) -> Rc<Self> {
        Self::builder(class).build()
    }

    pub fn class(&self) -> &Rc<TraceClass> {
        &self.class
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn env(&self) -> &BTreeMap<String, EnvValue> {
        &self.env
    }

    pub fn create_stream(self: &Rc<Self>, class: &Rc<StreamClass>) -> Result<Rc<Stream>, Error> {
        if !class.assigns_automatic_stream_id() {
            return Err(Error::InvalidIdAssignment("stream", "stream"));
        }
        let next = self
            .streams
            .borrow()
            .iter()
            .filter(|s| Rc::ptr_eq(&s.class, class))
            .map(|s| s.id.0 + 1)
            .max()
            .unwrap_or(0);
        Ok(self.insert_stream(class, StreamId(next)))
    }

    pub fn create_stream_with_id(
        self: &Rc<Self>,
        class: &Rc<StreamClass>,
        id: StreamId,
    ) -> Result<Rc<Stream>, Error> {
        if class.assigns_automatic_stream_id() {
            return Err(Error::InvalidIdAssignment("stream", "stream"));
        }
        let duplicate = self
            .streams
            .borrow()
            .iter()
            .any(|s| Rc::ptr_eq(&s.class, class) && s.id == id);
        if duplicate {
            return Err(Error::DuplicateId("stream", id.0));
        }
        Ok(self.insert_stream(class, id))
    }

    fn insert_stream(self: &Rc<Self>, class: &Rc<StreamClass>, id: StreamId) -> Rc<Stream> {
        let stream = Rc::new(Stream {
            id,
            class: class.clone(),
            trace: Rc::downgrade(self),
            name: RefCell::new(None),
        });
        self.streams.borrow_mut().push(stream.clone());
        stream
    }

    pub fn streams(&self) -> Vec<Rc<Stream>> {
        self.streams.borrow().clone()
    }
}

pub struct TraceBuilder {
    class: Rc<TraceClass>,
    name: Option<String>,
    uuid: Option<Uuid>,
    env: BTreeMap<String, EnvValue>,
}

impl TraceBuilder {
    pub fn name<T: AsRef<str>>(mut self, name: T) -> Self {
        self.name = Some(name.as_ref().to_owned());
        self
    }

    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn env_entry<K: AsRef<str>, V: Into<EnvValue>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.as_ref().to_owned(), value.into());
        self
    }

    pub fn build(self) -> Rc<Trace> {
        self.class.freeze();
        Rc::new(Trace {
            class: self.class,
            name: self.name,
            uuid: self.uuid,
            env: self.env,
            streams: RefCell::new(Vec::new()),
        })
    }
}

/// One sequential flow of packets within a trace.
pub struct Stream {
    id: StreamId,
    class: Rc<StreamClass>,
    trace: Weak<Trace>,
    name: RefCell<Option<String>>,
}

impl Stream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn class(&self) -> &Rc<StreamClass> {
        &self.class
    }

    pub fn trace(&self) -> Option<Rc<Trace>> {
        self.trace.upgrade()
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub fn set_name<T: AsRef<str>>(&self, name: T) {
        *self.name.borrow_mut() = Some(name.as_ref().to_owned());
    }
}

/// A decoded packet: the unit of data exchange between a producer and
/// the engine. Immutable once built.
pub struct Packet {
    stream: Rc<Stream>,
    context: Option<Field>,
}

impl Packet {
    pub fn new(stream: Rc<Stream>, context: Option<Field>) -> Rc<Self> {
        Rc::new(Self { stream, context })
    }

    pub fn stream(&self) -> &Rc<Stream> {
        &self.stream
    }

    pub fn context_field(&self) -> Option<&Field> {
        self.context.as_ref()
    }
}

/// A decoded event record with its up-to-three field scopes.
pub struct Event {
    class: Rc<EventClass>,
    packet: Option<Rc<Packet>>,
    stream: Rc<Stream>,
    common_context: Option<Field>,
    specific_context: Option<Field>,
    payload: Option<Field>,
}

impl Event {
    pub fn new(
        class: Rc<EventClass>,
        stream: Rc<Stream>,
        packet: Option<Rc<Packet>>,
        common_context: Option<Field>,
        specific_context: Option<Field>,
        payload: Option<Field>,
    ) -> Self {
        Self {
            class,
            packet,
            stream,
            common_context,
            specific_context,
            payload,
        }
    }

    pub fn class(&self) -> &Rc<EventClass> {
        &self.class
    }

    pub fn stream(&self) -> &Rc<Stream> {
        &self.stream
    }

    pub fn packet(&self) -> Option<&Rc<Packet>> {
        self.packet.as_ref()
    }

    pub fn common_context_field(&self) -> Option<&Field> {
        self.common_context.as_ref()
    }

    pub fn specific_context_field(&self) -> Option<&Field> {
        self.specific_context.as_ref()
    }

    pub fn payload_field(&self) -> Option<&Field> {
        self.payload.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_creation_freezes_the_class_hierarchy() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        let _ec = sc.create_event_class().unwrap();
        let trace = Trace::builder(tc.clone())
            .name("kernel")
            .env_entry("hostname", "buildbox")
            .env_entry("tracer_major", 2i64)
            .build();
        assert!(tc.is_frozen());
        assert!(sc.is_frozen());
        assert_eq!(trace.name(), Some("kernel"));
        assert_eq!(
            trace.env().get("hostname"),
            Some(&EnvValue::Text("buildbox".to_owned()))
        );
        assert!(matches!(
            sc.set_name("late"),
            Err(Error::FrozenClass("stream"))
        ));
    }

    #[test]
    fn automatic_stream_ids_count_per_stream_class() {
        let tc = TraceClass::new();
        let sc_a = tc.create_stream_class().unwrap();
        let sc_b = tc.create_stream_class().unwrap();
        let trace = Trace::new(tc);
        assert_eq!(trace.create_stream(&sc_a).unwrap().id(), StreamId(0));
        assert_eq!(trace.create_stream(&sc_a).unwrap().id(), StreamId(1));
        assert_eq!(trace.create_stream(&sc_b).unwrap().id(), StreamId(0));
    }

    #[test]
    fn user_assigned_stream_ids_must_be_unique() {
        let tc = TraceClass::new();
        let sc = tc.create_stream_class().unwrap();
        sc.set_assigns_automatic_stream_id(false).unwrap();
        let trace = Trace::new(tc);
        assert!(matches!(
            trace.create_stream(&sc),
            Err(Error::InvalidIdAssignment(_, _))
        ));
        trace.create_stream_with_id(&sc, StreamId(3)).unwrap();
        assert!(matches!(
            trace.create_stream_with_id(&sc, StreamId(3)),
            Err(Error::DuplicateId("stream", 3))
        ));
    }
}
