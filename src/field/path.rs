use derive_more::Display;
use serde::Deserialize;

/// Root scope a field path resolves against.
///
/// The packet context is decoded before any event of the packet, and the
/// event scopes are decoded in the order listed here, so a path target is
/// always available by the time the referring field is reached.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    #[display(fmt = "packet-context")]
    PacketContext,
    #[display(fmt = "event-common-context")]
    EventCommonContext,
    #[display(fmt = "event-specific-context")]
    EventSpecificContext,
    #[display(fmt = "event-payload")]
    EventPayload,
}

/// Structural location of a field: a root scope plus structure member
/// indices from that scope's root on down.
///
/// Dynamic array length fields and variant/option selectors are located
/// this way rather than by name so that renames and anonymous members
/// can't break the reference.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct FieldPath {
    root: Scope,
    indices: Vec<usize>,
}

impl FieldPath {
    pub fn new(root: Scope, indices: Vec<usize>) -> Self {
        Self { root, indices }
    }

    pub fn root(&self) -> Scope {
        self.root
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}", self.root)?;
        for i in self.indices.iter() {
            write!(f, ".{i}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_form() {
        let p = FieldPath::new(Scope::EventPayload, vec![2, 0]);
        assert_eq!(p.to_string(), "[event-payload.2.0]");
    }
}
