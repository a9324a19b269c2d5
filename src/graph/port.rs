use crate::types::{ComponentId, ConnectionId};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// A port a component wants added, returned from connection hooks so the
/// graph applies the addition itself after the hook returns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortSpec {
    pub name: String,
    pub direction: PortDirection,
}

impl PortSpec {
    pub fn input<T: AsRef<str>>(name: T) -> Self {
        Self {
            name: name.as_ref().to_owned(),
            direction: PortDirection::Input,
        }
    }

    pub fn output<T: AsRef<str>>(name: T) -> Self {
        Self {
            name: name.as_ref().to_owned(),
            direction: PortDirection::Output,
        }
    }
}

/// Graph-wide address of a single port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortRef {
    pub component: ComponentId,
    pub direction: PortDirection,
    pub name: String,
}

impl PortRef {
    pub fn new<T: AsRef<str>>(component: ComponentId, direction: PortDirection, name: T) -> Self {
        Self {
            component,
            direction,
            name: name.as_ref().to_owned(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.component, self.direction, self.name)
    }
}

/// An established link from an upstream output port to a downstream
/// input port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub upstream: PortRef,
    pub downstream: PortRef,
}
