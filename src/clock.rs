use crate::error::Error;
use std::rc::Rc;
use uuid::Uuid;

const NS_PER_SECOND: i128 = 1_000_000_000;

/// Metadata describing a tracer clock: its frequency in cycles per second
/// and a fixed offset (whole seconds plus cycles) from an origin.
///
/// When `unix_epoch_origin` is true the origin is 1970-01-01T00:00:00Z,
/// otherwise it is arbitrary and only snapshots of the same clock class are
/// comparable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockClass {
    name: Option<String>,
    description: Option<String>,
    frequency: u64,
    offset_seconds: i64,
    offset_cycles: u64,
    precision: u64,
    unix_epoch_origin: bool,
    uuid: Option<Uuid>,
}

impl ClockClass {
    /// A clock class ticking `frequency` times per second. Zero is rejected.
    pub fn new(frequency: u64) -> Result<Self, Error> {
        if frequency == 0 {
            return Err(Error::ZeroClockFrequency);
        }
        Ok(Self {
            name: None,
            description: None,
            frequency,
            offset_seconds: 0,
            offset_cycles: 0,
            precision: 0,
            unix_epoch_origin: true,
            uuid: None,
        })
    }

    pub fn with_name<T: AsRef<str>>(mut self, name: T) -> Self {
        self.name = Some(name.as_ref().to_owned());
        self
    }

    pub fn with_description<T: AsRef<str>>(mut self, description: T) -> Self {
        self.description = Some(description.as_ref().to_owned());
        self
    }

    pub fn with_offset(mut self, seconds: i64, cycles: u64) -> Self {
        self.offset_seconds = seconds;
        self.offset_cycles = cycles;
        self
    }

    pub fn with_precision(mut self, cycles: u64) -> Self {
        self.precision = cycles;
        self
    }

    pub fn with_unix_epoch_origin(mut self, is_unix_epoch: bool) -> Self {
        self.unix_epoch_origin = is_unix_epoch;
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn offset_seconds(&self) -> i64 {
        self.offset_seconds
    }

    pub fn offset_cycles(&self) -> u64 {
        self.offset_cycles
    }

    pub fn precision(&self) -> u64 {
        self.precision
    }

    pub fn unix_epoch_origin(&self) -> bool {
        self.unix_epoch_origin
    }

    pub fn uuid(&self) -> Option<&Uuid> {
        self.uuid.as_ref()
    }

    /// Convert a cycle count to nanoseconds from the clock's origin,
    /// applying the class offset.
    pub fn cycles_to_ns_from_origin(&self, cycles: u64) -> Result<i64, Error> {
        let total_cycles = i128::from(self.offset_cycles) + i128::from(cycles);
        let ns = i128::from(self.offset_seconds) * NS_PER_SECOND
            + (total_cycles * NS_PER_SECOND) / i128::from(self.frequency);
        i64::try_from(ns).map_err(|_| Error::ClockValueOverflow)
    }

    /// Inverse of [`cycles_to_ns_from_origin`](Self::cycles_to_ns_from_origin),
    /// truncating sub-cycle remainders. Times before the clock's own zero
    /// cycle are unrepresentable.
    pub fn cycles_from_ns_from_origin(&self, ns: i64) -> Result<u64, Error> {
        let rel_ns = i128::from(ns) - i128::from(self.offset_seconds) * NS_PER_SECOND;
        let cycles =
            rel_ns * i128::from(self.frequency) / NS_PER_SECOND - i128::from(self.offset_cycles);
        u64::try_from(cycles).map_err(|_| Error::ClockValueOverflow)
    }
}

/// A captured cycle count from a specific clock class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockSnapshot {
    clock_class: Rc<ClockClass>,
    cycles: u64,
}

impl ClockSnapshot {
    pub fn new(clock_class: Rc<ClockClass>, cycles: u64) -> Self {
        Self {
            clock_class,
            cycles,
        }
    }

    pub fn clock_class(&self) -> &Rc<ClockClass> {
        &self.clock_class
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn ns_from_origin(&self) -> Result<i64, Error> {
        self.clock_class.cycles_to_ns_from_origin(self.cycles)
    }
}
