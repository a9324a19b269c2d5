use crate::clock::ClockClass;
use crate::error::Error;
use crate::field::class::FieldClassRef;
use crate::types::{EventClassId, LogLevel, StreamClassId};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Root of the metadata hierarchy: a trace class owns stream classes,
/// which own event classes.
///
/// Metadata classes are built incrementally by a producer and become
/// immutable ("frozen") the moment the first runtime instance is created
/// from them; every mutator checks the freeze flag and fails loudly
/// afterwards. The engine is single threaded, so interior mutability via
/// `Cell`/`RefCell` is sufficient.
pub struct TraceClass {
    assigns_automatic_stream_class_id: Cell<bool>,
    stream_classes: RefCell<Vec<Rc<StreamClass>>>,
    frozen: Cell<bool>,
}

impl TraceClass {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            assigns_automatic_stream_class_id: Cell::new(true),
            stream_classes: RefCell::new(Vec::new()),
            frozen: Cell::new(false),
        })
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen.get() {
            Err(Error::FrozenClass("trace"))
        } else {
            Ok(())
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(crate) fn freeze(&self) {
        self.frozen.set(true);
        for sc in self.stream_classes.borrow().iter() {
            sc.freeze();
        }
    }

    pub fn assigns_automatic_stream_class_id(&self) -> bool {
        self.assigns_automatic_stream_class_id.get()
    }

    /// Switch between automatic and user-assigned stream class IDs.
    /// Only valid before any stream class exists.
    pub fn set_assigns_automatic_stream_class_id(&self, on: bool) -> Result<(), Error> {
        self.check_mutable()?;
        if !self.stream_classes.borrow().is_empty() {
            return Err(Error::InvalidIdAssignment("trace", "stream class"));
        }
        self.assigns_automatic_stream_class_id.set(on);
        Ok(())
    }

    pub fn create_stream_class(self: &Rc<Self>) -> Result<Rc<StreamClass>, Error> {
        self.check_mutable()?;
        if !self.assigns_automatic_stream_class_id.get() {
            return Err(Error::InvalidIdAssignment("trace", "stream class"));
        }
        let id = StreamClassId(self.stream_classes.borrow().len() as u64);
        Ok(self.insert_stream_class(id))
    }

    pub fn create_stream_class_with_id(
        self: &Rc<Self>,
        id: StreamClassId,
    ) -> Result<Rc<StreamClass>, Error> {
        self.check_mutable()?;
        if self.assigns_automatic_stream_class_id.get() {
            return Err(Error::InvalidIdAssignment("trace", "stream class"));
        }
        if self.stream_class_by_id(id).is_some() {
            return Err(Error::DuplicateId("stream class", id.0));
        }
        Ok(self.insert_stream_class(id))
    }

    fn insert_stream_class(self: &Rc<Self>, id: StreamClassId) -> Rc<StreamClass> {
        let sc = Rc::new(StreamClass {
            id,
            trace_class: Rc::downgrade(self),
            frozen: Cell::new(false),
            name: RefCell::new(None),
            assigns_automatic_event_class_id: Cell::new(true),
            assigns_automatic_stream_id: Cell::new(true),
            default_clock_class: RefCell::new(None),
            packet_context_class: RefCell::new(None),
            event_common_context_class: RefCell::new(None),
            event_classes: RefCell::new(Vec::new()),
        });
        self.stream_classes.borrow_mut().push(sc.clone());
        sc
    }

    pub fn stream_class_count(&self) -> usize {
        self.stream_classes.borrow().len()
    }

    pub fn stream_class_by_id(&self, id: StreamClassId) -> Option<Rc<StreamClass>> {
        self.stream_classes
            .borrow()
            .iter()
            .find(|sc| sc.id == id)
            .cloned()
    }

    pub fn stream_classes(&self) -> Vec<Rc<StreamClass>> {
        self.stream_classes.borrow().clone()
    }
}

pub struct StreamClass {
    id: StreamClassId,
    trace_class: Weak<TraceClass>,
    frozen: Cell<bool>,
    name: RefCell<Option<String>>,
    assigns_automatic_event_class_id: Cell<bool>,
    assigns_automatic_stream_id: Cell<bool>,
    default_clock_class: RefCell<Option<Rc<ClockClass>>>,
    packet_context_class: RefCell<Option<FieldClassRef>>,
    event_common_context_class: RefCell<Option<FieldClassRef>>,
    event_classes: RefCell<Vec<Rc<EventClass>>>,
}

impl StreamClass {
    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen.get() {
            Err(Error::FrozenClass("stream"))
        } else {
            Ok(())
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(crate) fn freeze(&self) {
        self.frozen.set(true);
        for ec in self.event_classes.borrow().iter() {
            ec.freeze();
        }
    }

    pub fn id(&self) -> StreamClassId {
        self.id
    }

    pub fn trace_class(&self) -> Option<Rc<TraceClass>> {
        self.trace_class.upgrade()
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub fn set_name<T: AsRef<str>>(&self, name: T) -> Result<(), Error> {
        self.check_mutable()?;
        *self.name.borrow_mut() = Some(name.as_ref().to_owned());
        Ok(())
    }

    pub fn assigns_automatic_stream_id(&self) -> bool {
        self.assigns_automatic_stream_id.get()
    }

    pub fn set_assigns_automatic_stream_id(&self, on: bool) -> Result<(), Error> {
        self.check_mutable()?;
        self.assigns_automatic_stream_id.set(on);
        Ok(())
    }

    pub fn assigns_automatic_event_class_id(&self) -> bool {
        self.assigns_automatic_event_class_id.get()
    }

    pub fn set_assigns_automatic_event_class_id(&self, on: bool) -> Result<(), Error> {
        self.check_mutable()?;
        if !self.event_classes.borrow().is_empty() {
            return Err(Error::InvalidIdAssignment("stream", "event class"));
        }
        self.assigns_automatic_event_class_id.set(on);
        Ok(())
    }

    pub fn default_clock_class(&self) -> Option<Rc<ClockClass>> {
        self.default_clock_class.borrow().clone()
    }

    pub fn set_default_clock_class(&self, cc: Rc<ClockClass>) -> Result<(), Error> {
        self.check_mutable()?;
        *self.default_clock_class.borrow_mut() = Some(cc);
        Ok(())
    }

    pub fn packet_context_class(&self) -> Option<FieldClassRef> {
        self.packet_context_class.borrow().clone()
    }

    pub fn set_packet_context_class(&self, fc: FieldClassRef) -> Result<(), Error> {
        self.check_mutable()?;
        *self.packet_context_class.borrow_mut() = Some(fc);
        Ok(())
    }

    pub fn event_common_context_class(&self) -> Option<FieldClassRef> {
        self.event_common_context_class.borrow().clone()
    }

    pub fn set_event_common_context_class(&self, fc: FieldClassRef) -> Result<(), Error> {
        self.check_mutable()?;
        *self.event_common_context_class.borrow_mut() = Some(fc);
        Ok(())
    }

    pub fn create_event_class(self: &Rc<Self>) -> Result<Rc<EventClass>, Error> {
        self.check_mutable()?;
        if !self.assigns_automatic_event_class_id.get() {
            return Err(Error::InvalidIdAssignment("stream", "event class"));
        }
        let id = EventClassId(self.event_classes.borrow().len() as u64);
        Ok(self.insert_event_class(id))
    }

    pub fn create_event_class_with_id(
        self: &Rc<Self>,
        id: EventClassId,
    ) -> Result<Rc<EventClass>, Error> {
        self.check_mutable()?;
        if self.assigns_automatic_event_class_id.get() {
            return Err(Error::InvalidIdAssignment("stream", "event class"));
        }
        if self.event_class_by_id(id).is_some() {
            return Err(Error::DuplicateId("event class", id.0));
        }
        Ok(self.insert_event_class(id))
    }

    fn insert_event_class(self: &Rc<Self>, id: EventClassId) -> Rc<EventClass> {
        let ec = Rc::new(EventClass {
            id,
            stream_class: Rc::downgrade(self),
            frozen: Cell::new(false),
            name: RefCell::new(None),
            log_level: Cell::new(None),
            specific_context_class: RefCell::new(None),
            payload_class: RefCell::new(None),
        });
        self.event_classes.borrow_mut().push(ec.clone());
        ec
    }

    pub fn event_class_count(&self) -> usize {
        self.event_classes.borrow().len()
    }

    pub fn event_class_by_id(&self, id: EventClassId) -> Option<Rc<EventClass>> {
        self.event_classes
            .borrow()
            .iter()
            .find(|ec| ec.id == id)
            .cloned()
    }

    pub fn event_classes(&self) -> Vec<Rc<EventClass>> {
        self.event_classes.borrow().clone()
    }
}

pub struct EventClass {
    id: EventClassId,
    stream_class: Weak<StreamClass>,
    frozen: Cell<bool>,
    name: RefCell<Option<String>>,
    log_level: Cell<Option<LogLevel>>,
    specific_context_class: RefCell<Option<FieldClassRef>>,
    payload_class: RefCell<Option<FieldClassRef>>,
}

impl EventClass {
    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen.get() {
            Err(Error::FrozenClass("event"))
        } else {
            Ok(())
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(crate) fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn id(&self) -> EventClassId {
        self.id
    }

    pub fn stream_class(&self) -> Option<Rc<StreamClass>> {
        self.stream_class.upgrade()
    }

    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub fn set_name<T: AsRef<str>>(&self, name: T) -> Result<(), Error> {
        self.check_mutable()?;
        *self.name.borrow_mut() = Some(name.as_ref().to_owned());
        Ok(())
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level.get()
    }

    pub fn set_log_level(&self, level: LogLevel) -> Result<(), Error> {
        self.check_mutable()?;
        self.log_level.set(Some(level));
        Ok(())
    }

    pub fn specific_context_class(&self) -> Option<FieldClassRef> {
        self.specific_context_class.borrow().clone()
    }

    pub fn set_specific_context_class(&self, fc: FieldClassRef) -> Result<(), Error> {
        self.check_mutable()?;
        *self.specific_context_class.borrow_mut() = Some(fc);
        Ok(())
    }

    pub fn payload_class(&self) -> Option<FieldClassRef> {
        self.payload_class.borrow().clone()
    }

    pub fn set_payload_class(&self, fc: FieldClassRef) -> Result<(), Error> {
        self.check_mutable()?;
        *self.payload_class.borrow_mut() = Some(fc);
        Ok(())
    }
}
