use derive_more::{Display, From, Into};
use serde::Deserialize;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;

#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct Interruptor(Arc<AtomicBool>);

impl Interruptor {
    pub fn new() -> Self {
        Interruptor(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(SeqCst)
    }
}

impl Default for Interruptor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, From, Into, Display,
)]
#[repr(transparent)]
pub struct RetryDurationUs(pub u64);

impl Default for RetryDurationUs {
    fn default() -> Self {
        // 100ms
        RetryDurationUs(100000)
    }
}

impl FromStr for RetryDurationUs {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RetryDurationUs(s.trim().parse::<u64>()?))
    }
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, From, Into, Display,
)]
#[repr(transparent)]
pub struct StreamId(pub u64);

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, From, Into, Display,
)]
#[repr(transparent)]
pub struct StreamClassId(pub u64);

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, From, Into, Display,
)]
#[repr(transparent)]
pub struct EventClassId(pub u64);

/// Index of a component within its owning graph.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display)]
#[repr(transparent)]
pub struct ComponentId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display)]
#[repr(transparent)]
pub struct ConnectionId(pub usize);

/// Event severity reported by the producing tracer, carried on event classes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use LogLevel::*;
        Ok(match s.trim().to_lowercase().as_str() {
            "emergency" => Emergency,
            "alert" => Alert,
            "critical" => Critical,
            "error" => Error,
            "warning" => Warning,
            "notice" => Notice,
            "info" => Info,
            "debug" => Debug,
            _ => return Err(format!("'{s}' is not a valid log level")),
        })
    }
}
