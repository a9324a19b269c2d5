//! The TOML trace layout descriptor: a declarative description of a
//! trace's clock, field classes, and event classes, plus the binary
//! stream files holding its packets.

use crate::error::Error;
use crate::field::class::{
    EnumerationMapping, FieldClass, FieldClassRef, IntegerClass, IntegerRange, RealPrecision,
    VariantOption,
};
use crate::field::path::{FieldPath, Scope};
use crate::types::LogLevel;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TraceLayout {
    pub name: Option<String>,
    #[serde(default)]
    pub stream_files: Vec<PathBuf>,
    pub clock: Option<ClockLayout>,
    /// Extra structure members appended to the built-in packet context.
    pub packet_context: Option<FieldClassDesc>,
    pub event_common_context: Option<FieldClassDesc>,
    #[serde(default, rename = "event")]
    pub events: Vec<EventLayout>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl TraceLayout {
    pub fn parse(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    /// Load a layout file, resolving relative stream file paths against
    /// the layout's own directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut layout = Self::parse(&content)?;
        if let Some(dir) = path.parent() {
            for f in layout.stream_files.iter_mut() {
                if f.is_relative() {
                    *f = dir.join(f.as_path());
                }
            }
        }
        Ok(layout)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClockLayout {
    pub frequency: u64,
    #[serde(default)]
    pub offset_seconds: i64,
    #[serde(default)]
    pub offset_cycles: u64,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub precision: u64,
    #[serde(default = "default_true")]
    pub unix_epoch_origin: bool,
    pub uuid: Option<Uuid>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EventLayout {
    pub id: u64,
    pub name: Option<String>,
    pub log_level: Option<LogLevel>,
    pub specific_context: Option<FieldClassDesc>,
    pub payload: Option<FieldClassDesc>,
}

#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrderDesc {
    #[default]
    Little,
    Big,
}

impl From<ByteOrderDesc> for crate::field::class::ByteOrder {
    fn from(desc: ByteOrderDesc) -> Self {
        match desc {
            ByteOrderDesc::Little => Self::Little,
            ByteOrderDesc::Big => Self::Big,
        }
    }
}

fn default_precision() -> RealPrecision {
    RealPrecision::Double
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MemberDesc {
    pub name: String,
    pub class: FieldClassDesc,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MappingDesc {
    pub label: String,
    /// Inclusive `[lower, upper]` pairs.
    pub ranges: Vec<[i64; 2]>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VariantOptionDesc {
    pub name: String,
    pub ranges: Vec<[i64; 2]>,
    pub class: FieldClassDesc,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PathDesc {
    pub scope: Scope,
    pub indices: Vec<usize>,
}

impl From<&PathDesc> for FieldPath {
    fn from(desc: &PathDesc) -> Self {
        FieldPath::new(desc.scope, desc.indices.clone())
    }
}

/// Declarative form of a field class, tagged by `kind`.
#[derive(Clone, Debug, Deserialize)]
#[serde(
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case",
    tag = "kind",
    deny_unknown_fields
)]
pub enum FieldClassDesc {
    Bool,
    UnsignedInteger {
        bits: u8,
        #[serde(default)]
        byte_order: ByteOrderDesc,
    },
    SignedInteger {
        bits: u8,
        #[serde(default)]
        byte_order: ByteOrderDesc,
    },
    Real {
        #[serde(default = "default_precision")]
        precision: RealPrecision,
        #[serde(default)]
        byte_order: ByteOrderDesc,
    },
    String,
    UnsignedEnumeration {
        bits: u8,
        #[serde(default)]
        byte_order: ByteOrderDesc,
        mappings: Vec<MappingDesc>,
    },
    SignedEnumeration {
        bits: u8,
        #[serde(default)]
        byte_order: ByteOrderDesc,
        mappings: Vec<MappingDesc>,
    },
    Struct {
        members: Vec<MemberDesc>,
    },
    StaticArray {
        length: u64,
        element: Box<FieldClassDesc>,
    },
    DynamicArray {
        element: Box<FieldClassDesc>,
        length_path: PathDesc,
    },
    Variant {
        options: Vec<VariantOptionDesc>,
        selector_path: PathDesc,
    },
    Option {
        content: Box<FieldClassDesc>,
        selector_path: Option<PathDesc>,
    },
}

fn to_mappings(descs: &[MappingDesc]) -> Vec<EnumerationMapping> {
    descs
        .iter()
        .map(|m| EnumerationMapping {
            label: m.label.clone(),
            ranges: m
                .ranges
                .iter()
                .map(|[lo, hi]| IntegerRange::new(i128::from(*lo), i128::from(*hi)))
                .collect(),
        })
        .collect()
}

impl FieldClassDesc {
    pub fn to_class(&self) -> Result<FieldClassRef, Error> {
        Ok(match self {
            FieldClassDesc::Bool => FieldClass::boolean(),
            FieldClassDesc::UnsignedInteger { bits, byte_order } => {
                FieldClass::unsigned_integer(*bits, (*byte_order).into())?
            }
            FieldClassDesc::SignedInteger { bits, byte_order } => {
                FieldClass::signed_integer(*bits, (*byte_order).into())?
            }
            FieldClassDesc::Real {
                precision,
                byte_order,
            } => FieldClass::real(*precision, (*byte_order).into()),
            FieldClassDesc::String => FieldClass::string(),
            FieldClassDesc::UnsignedEnumeration {
                bits,
                byte_order,
                mappings,
            } => FieldClass::unsigned_enumeration(
                IntegerClass::new(*bits, (*byte_order).into())?,
                to_mappings(mappings),
            ),
            FieldClassDesc::SignedEnumeration {
                bits,
                byte_order,
                mappings,
            } => FieldClass::signed_enumeration(
                IntegerClass::new(*bits, (*byte_order).into())?,
                to_mappings(mappings),
            ),
            FieldClassDesc::Struct { members } => {
                let mut built = Vec::with_capacity(members.len());
                for m in members.iter() {
                    built.push((m.name.clone(), m.class.to_class()?));
                }
                FieldClass::structure(built)?
            }
            FieldClassDesc::StaticArray { length, element } => {
                FieldClass::static_array(element.to_class()?, *length)
            }
            FieldClassDesc::DynamicArray {
                element,
                length_path,
            } => FieldClass::dynamic_array(element.to_class()?, length_path.into()),
            FieldClassDesc::Variant {
                options,
                selector_path,
            } => {
                let mut built = Vec::with_capacity(options.len());
                for o in options.iter() {
                    let ranges = o
                        .ranges
                        .iter()
                        .map(|[lo, hi]| IntegerRange::new(i128::from(*lo), i128::from(*hi)))
                        .collect();
                    built.push(VariantOption::new(o.name.clone(), ranges, o.class.to_class()?));
                }
                FieldClass::variant(built, selector_path.into())?
            }
            FieldClassDesc::Option {
                content,
                selector_path,
            } => FieldClass::option(
                content.to_class()?,
                selector_path.as_ref().map(FieldPath::from),
            ),
        })
    }

    /// The structure members of a `struct` descriptor; anything else is a
    /// layout error. Used where the descriptor extends a built-in scope.
    pub fn struct_members(&self) -> Result<Vec<(String, FieldClassRef)>, Error> {
        match self {
            FieldClassDesc::Struct { members } => {
                let mut built = Vec::with_capacity(members.len());
                for m in members.iter() {
                    built.push((m.name.clone(), m.class.to_class()?));
                }
                Ok(built)
            }
            _ => Err(Error::Layout(
                "Scope field classes must be of kind 'struct'".to_owned(),
            )),
        }
    }
}
