use crate::field::path::FieldPath;
use thiserror::Error;

/// Engine-level errors.
///
/// Transient retry ("try again") and normal exhaustion ("end") are not
/// errors; they travel as `Pull`/`ConsumeStatus`/`RunStatus` variants
/// instead so callers can't accidentally treat them as failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("The graph was canceled")]
    Canceled,

    #[error("The '{0}' component refused the port connection")]
    PortConnectionRefused(String),

    #[error("The requested operation is not supported by the '{0}' component class")]
    Unsupported(String),

    #[error("The component class '{0}' doesn't provide a query object named '{1}'")]
    NoSuchQueryObject(String, String),

    #[error("A component class named '{0}' is already registered")]
    ComponentClassExists(String),

    #[error("No component class named '{0}' is registered")]
    NoSuchComponentClass(String),

    #[error("Cannot mutate the {0} class, it was frozen when its first instance was created")]
    FrozenClass(&'static str),

    #[error("Cannot read the field, no value has been set")]
    UnsetField,

    #[error("The field is a {actual} field, not a {expected} field")]
    FieldTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("The value {value} is out of range for a {bit_width}-bit {signedness} integer field")]
    OutOfRangeValue {
        value: i128,
        bit_width: u8,
        signedness: &'static str,
    },

    #[error("The structure field class has no member named '{0}'")]
    NoSuchMember(String),

    #[error("A structure member named '{0}' already exists")]
    DuplicateMember(String),

    #[error("Index {index} is out of range, the {container} holds {len} entries")]
    IndexOutOfRange {
        container: &'static str,
        index: usize,
        len: usize,
    },

    #[error("The dynamic array field length must be set before elements can be accessed")]
    LengthNotSet,

    #[error("No variant option is selected")]
    NoSelectedOption,

    #[error("The message's stream class doesn't declare a default clock class")]
    NonexistentClockSnapshot,

    #[error("A clock class frequency of zero is invalid")]
    ZeroClockFrequency,

    #[error("The clock snapshot's time in nanoseconds from origin overflows a signed 64-bit value")]
    ClockValueOverflow,

    #[error(
        "The {0} class assigns {1} IDs automatically, the requested assignment mode is invalid"
    )]
    InvalidIdAssignment(&'static str, &'static str),

    #[error("A {0} with ID {1} already exists")]
    DuplicateId(&'static str, u64),

    #[error("Invalid graph state for the requested operation: {0}")]
    GraphState(&'static str),

    #[error("The '{0}' component has no {1} port named '{2}'")]
    NoSuchPort(String, &'static str, String),

    #[error("A {0} port named '{1}' already exists on the '{2}' component")]
    DuplicatePort(&'static str, String, String),

    #[error("The port '{0}' is already connected")]
    PortAlreadyConnected(String),

    #[error("Cannot connect two ports of the same component ('{0}')")]
    SelfConnection(String),

    #[error("The input port '{0}' has no upstream connection")]
    DisconnectedPort(String),

    #[error("The message iterator previously failed and can no longer be used")]
    IteratorFaulted,

    #[error("Field path {0} doesn't resolve to a field in its scope")]
    UnresolvedFieldPath(FieldPath),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid trace layout descriptor. {0}")]
    Layout(String),

    #[error("Failed to parse the trace layout descriptor. {0}")]
    LayoutParse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced while decoding or encoding the CTF binary representation
/// of a field tree. These are fatal for the current top-level decode; no
/// partially decoded field tree is ever handed to the caller.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(
        "Truncated data, needed {needed} bits at bit offset {offset} but only {available} remain"
    )]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error(
        "Bad packet magic number 0x{found:08x} at bit offset {offset}, expected 0x{expected:08x}"
    )]
    BadMagic {
        offset: u64,
        found: u32,
        expected: u32,
    },

    #[error("No variant option matches the selector tag value {0}")]
    NoVariantOptionForTag(i128),

    #[error("String field data is not valid UTF-8")]
    InvalidString(#[from] std::string::FromUtf8Error),

    #[error("Field path {0} doesn't resolve to a previously decoded integer field")]
    BadPath(FieldPath),

    #[error("The dynamic array length value {0} is unrepresentable or exceeds the available data")]
    UnrepresentableLength(i128),

    #[error(
        "The packet's content size {content_size_bits} exceeds its total size {packet_size_bits}"
    )]
    InvalidContentSize {
        packet_size_bits: u64,
        content_size_bits: u64,
    },

    #[error("A bit width of {0} is invalid, integer field classes hold 1 to 64 bits")]
    InvalidBitWidth(u8),
}
