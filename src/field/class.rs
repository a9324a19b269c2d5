use crate::error::{DecodeError, Error};
use crate::field::path::FieldPath;
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::Rc;

/// Field classes are immutable once constructed and shared by reference.
pub type FieldClassRef = Rc<FieldClass>;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

/// Preferred display radix for integer fields. Purely presentational.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayBase {
    Binary,
    Octal,
    Decimal,
    Hexadecimal,
}

impl Default for DisplayBase {
    fn default() -> Self {
        DisplayBase::Decimal
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IntegerClass {
    bit_width: u8,
    byte_order: ByteOrder,
    alignment: u8,
    preferred_base: DisplayBase,
}

impl IntegerClass {
    /// Integers hold 1 to 64 bits. Byte-multiple widths default to byte
    /// alignment, everything else packs bit-tight.
    pub fn new(bit_width: u8, byte_order: ByteOrder) -> Result<Self, Error> {
        if bit_width == 0 || bit_width > 64 {
            return Err(DecodeError::InvalidBitWidth(bit_width).into());
        }
        Ok(Self {
            bit_width,
            byte_order,
            alignment: if bit_width % 8 == 0 { 8 } else { 1 },
            preferred_base: DisplayBase::default(),
        })
    }

    pub fn with_alignment(mut self, bits: u8) -> Result<Self, Error> {
        if bits == 0 || !bits.is_power_of_two() || bits > 64 {
            return Err(Error::Layout(format!(
                "alignment must be a power of two in [1, 64], got {bits}"
            )));
        }
        self.alignment = bits;
        Ok(self)
    }

    pub fn with_preferred_base(mut self, base: DisplayBase) -> Self {
        self.preferred_base = base;
        self
    }

    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn alignment(&self) -> u8 {
        self.alignment
    }

    pub fn preferred_base(&self) -> DisplayBase {
        self.preferred_base
    }
}

/// Inclusive integer range. Signed and unsigned mapping values share the
/// i128 representation so one table covers both enumeration flavors.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IntegerRange {
    pub lower: i128,
    pub upper: i128,
}

impl IntegerRange {
    pub fn new(lower: i128, upper: i128) -> Self {
        Self { lower, upper }
    }

    pub fn single(value: i128) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn contains(&self, value: i128) -> bool {
        self.lower <= value && value <= self.upper
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EnumerationMapping {
    pub label: String,
    pub ranges: Vec<IntegerRange>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EnumerationClass {
    int: IntegerClass,
    mappings: Vec<EnumerationMapping>,
    // (range, mapping index), sorted by range lower bound for lookup
    sorted_ranges: Vec<(IntegerRange, usize)>,
}

impl EnumerationClass {
    pub fn new(int: IntegerClass, mappings: Vec<EnumerationMapping>) -> Self {
        let mut sorted_ranges = Vec::new();
        for (idx, m) in mappings.iter().enumerate() {
            for r in m.ranges.iter() {
                sorted_ranges.push((*r, idx));
            }
        }
        sorted_ranges.sort_by_key(|(r, _)| (r.lower, r.upper));
        Self {
            int,
            mappings,
            sorted_ranges,
        }
    }

    pub fn integer_class(&self) -> &IntegerClass {
        &self.int
    }

    pub fn mappings(&self) -> &[EnumerationMapping] {
        &self.mappings
    }

    /// All labels whose ranges contain `value`, in mapping order.
    /// Ranges may overlap; zero or many matches are both legal.
    pub fn labels_for_value(&self, value: i128) -> Vec<&str> {
        let end = self
            .sorted_ranges
            .partition_point(|(r, _)| r.lower <= value);
        let mut hits: Vec<usize> = self.sorted_ranges[..end]
            .iter()
            .filter(|(r, _)| r.upper >= value)
            .map(|(_, idx)| *idx)
            .collect();
        hits.sort_unstable();
        hits.dedup();
        hits.into_iter()
            .map(|idx| self.mappings[idx].label.as_str())
            .collect()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RealPrecision {
    Single,
    Double,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RealClass {
    precision: RealPrecision,
    byte_order: ByteOrder,
}

impl RealClass {
    pub fn new(precision: RealPrecision, byte_order: ByteOrder) -> Self {
        Self {
            precision,
            byte_order,
        }
    }

    pub fn precision(&self) -> RealPrecision {
        self.precision
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn bit_width(&self) -> u8 {
        match self.precision {
            RealPrecision::Single => 32,
            RealPrecision::Double => 64,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StructureMember {
    name: String,
    class: FieldClassRef,
}

impl StructureMember {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &FieldClassRef {
        &self.class
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StructureClass {
    members: Vec<StructureMember>,
    index_by_name: HashMap<String, usize>,
    alignment: u8,
}

impl StructureClass {
    pub fn new<N: Into<String>>(members: Vec<(N, FieldClassRef)>) -> Result<Self, Error> {
        let mut ms = Vec::with_capacity(members.len());
        let mut index_by_name = HashMap::with_capacity(members.len());
        let mut alignment = 1;
        for (name, class) in members.into_iter() {
            let name = name.into();
            if index_by_name.insert(name.clone(), ms.len()).is_some() {
                return Err(Error::DuplicateMember(name));
            }
            alignment = alignment.max(class.alignment_bits());
            ms.push(StructureMember { name, class });
        }
        Ok(Self {
            members: ms,
            index_by_name,
            alignment,
        })
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[StructureMember] {
        &self.members
    }

    pub fn member_at(&self, index: usize) -> Option<&StructureMember> {
        self.members.get(index)
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    pub fn alignment(&self) -> u8 {
        self.alignment
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StaticArrayClass {
    element: FieldClassRef,
    length: u64,
}

impl StaticArrayClass {
    pub fn new(element: FieldClassRef, length: u64) -> Self {
        Self { element, length }
    }

    pub fn element_class(&self) -> &FieldClassRef {
        &self.element
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DynamicArrayClass {
    element: FieldClassRef,
    length_path: FieldPath,
}

impl DynamicArrayClass {
    pub fn new(element: FieldClassRef, length_path: FieldPath) -> Self {
        Self {
            element,
            length_path,
        }
    }

    pub fn element_class(&self) -> &FieldClassRef {
        &self.element
    }

    pub fn length_path(&self) -> &FieldPath {
        &self.length_path
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct VariantOption {
    name: String,
    ranges: Vec<IntegerRange>,
    class: FieldClassRef,
}

impl VariantOption {
    pub fn new<N: Into<String>>(name: N, ranges: Vec<IntegerRange>, class: FieldClassRef) -> Self {
        Self {
            name: name.into(),
            ranges,
            class,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ranges(&self) -> &[IntegerRange] {
        &self.ranges
    }

    pub fn class(&self) -> &FieldClassRef {
        &self.class
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct VariantClass {
    options: Vec<VariantOption>,
    index_by_name: HashMap<String, usize>,
    selector_path: FieldPath,
}

impl VariantClass {
    pub fn new(options: Vec<VariantOption>, selector_path: FieldPath) -> Result<Self, Error> {
        let mut index_by_name = HashMap::with_capacity(options.len());
        for (idx, o) in options.iter().enumerate() {
            if index_by_name.insert(o.name.clone(), idx).is_some() {
                return Err(Error::DuplicateMember(o.name.clone()));
            }
        }
        Ok(Self {
            options,
            index_by_name,
            selector_path,
        })
    }

    pub fn options(&self) -> &[VariantOption] {
        &self.options
    }

    pub fn option_at(&self, index: usize) -> Option<&VariantOption> {
        self.options.get(index)
    }

    pub fn option_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    pub fn selector_path(&self) -> &FieldPath {
        &self.selector_path
    }

    /// The first option whose ranges contain the selector tag value.
    pub fn option_for_tag(&self, tag: i128) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.ranges.iter().any(|r| r.contains(tag)))
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct OptionClass {
    content: FieldClassRef,
    selector_path: Option<FieldPath>,
}

impl OptionClass {
    pub fn new(content: FieldClassRef, selector_path: Option<FieldPath>) -> Self {
        Self {
            content,
            selector_path,
        }
    }

    pub fn content_class(&self) -> &FieldClassRef {
        &self.content
    }

    pub fn selector_path(&self) -> Option<&FieldPath> {
        self.selector_path.as_ref()
    }
}

/// The schema of a single field: a closed sum over every CTF field shape.
///
/// Capability-style questions (is this numeric, is this a container) are
/// answered by matching on the kind rather than via an inheritance chain.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum FieldClass {
    Bool(IntegerClass),
    UnsignedInteger(IntegerClass),
    SignedInteger(IntegerClass),
    Real(RealClass),
    UnsignedEnumeration(EnumerationClass),
    SignedEnumeration(EnumerationClass),
    String,
    Structure(StructureClass),
    StaticArray(StaticArrayClass),
    DynamicArray(DynamicArrayClass),
    Variant(VariantClass),
    Option(OptionClass),
}

impl FieldClass {
    pub fn boolean() -> FieldClassRef {
        // Wire form is a single byte, zero or not
        Rc::new(FieldClass::Bool(IntegerClass {
            bit_width: 8,
            byte_order: ByteOrder::native(),
            alignment: 8,
            preferred_base: DisplayBase::Decimal,
        }))
    }

    pub fn unsigned_integer(bit_width: u8, byte_order: ByteOrder) -> Result<FieldClassRef, Error> {
        Ok(Rc::new(FieldClass::UnsignedInteger(IntegerClass::new(
            bit_width, byte_order,
        )?)))
    }

    pub fn signed_integer(bit_width: u8, byte_order: ByteOrder) -> Result<FieldClassRef, Error> {
        Ok(Rc::new(FieldClass::SignedInteger(IntegerClass::new(
            bit_width, byte_order,
        )?)))
    }

    pub fn real(precision: RealPrecision, byte_order: ByteOrder) -> FieldClassRef {
        Rc::new(FieldClass::Real(RealClass::new(precision, byte_order)))
    }

    pub fn unsigned_enumeration(
        int: IntegerClass,
        mappings: Vec<EnumerationMapping>,
    ) -> FieldClassRef {
        Rc::new(FieldClass::UnsignedEnumeration(EnumerationClass::new(
            int, mappings,
        )))
    }

    pub fn signed_enumeration(
        int: IntegerClass,
        mappings: Vec<EnumerationMapping>,
    ) -> FieldClassRef {
        Rc::new(FieldClass::SignedEnumeration(EnumerationClass::new(
            int, mappings,
        )))
    }

    pub fn string() -> FieldClassRef {
        Rc::new(FieldClass::String)
    }

    pub fn structure<N: Into<String>>(
        members: Vec<(N, FieldClassRef)>,
    ) -> Result<FieldClassRef, Error> {
        Ok(Rc::new(FieldClass::Structure(StructureClass::new(
            members,
        )?)))
    }

    pub fn static_array(element: FieldClassRef, length: u64) -> FieldClassRef {
        Rc::new(FieldClass::StaticArray(StaticArrayClass::new(
            element, length,
        )))
    }

    pub fn dynamic_array(element: FieldClassRef, length_path: FieldPath) -> FieldClassRef {
        Rc::new(FieldClass::DynamicArray(DynamicArrayClass::new(
            element,
            length_path,
        )))
    }

    pub fn variant(
        options: Vec<VariantOption>,
        selector_path: FieldPath,
    ) -> Result<FieldClassRef, Error> {
        Ok(Rc::new(FieldClass::Variant(VariantClass::new(
            options,
            selector_path,
        )?)))
    }

    pub fn option(content: FieldClassRef, selector_path: Option<FieldPath>) -> FieldClassRef {
        Rc::new(FieldClass::Option(OptionClass::new(content, selector_path)))
    }

    /// Name of the class kind, used in error reporting.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldClass::Bool(_) => "bool",
            FieldClass::UnsignedInteger(_) => "unsigned integer",
            FieldClass::SignedInteger(_) => "signed integer",
            FieldClass::Real(_) => "real",
            FieldClass::UnsignedEnumeration(_) => "unsigned enumeration",
            FieldClass::SignedEnumeration(_) => "signed enumeration",
            FieldClass::String => "string",
            FieldClass::Structure(_) => "structure",
            FieldClass::StaticArray(_) => "static array",
            FieldClass::DynamicArray(_) => "dynamic array",
            FieldClass::Variant(_) => "variant",
            FieldClass::Option(_) => "option",
        }
    }

    /// Alignment of the wire representation, in bits.
    pub fn alignment_bits(&self) -> u8 {
        match self {
            FieldClass::Bool(int)
            | FieldClass::UnsignedInteger(int)
            | FieldClass::SignedInteger(int) => int.alignment(),
            FieldClass::UnsignedEnumeration(e) | FieldClass::SignedEnumeration(e) => {
                e.integer_class().alignment()
            }
            FieldClass::Real(_) => 8,
            FieldClass::String => 8,
            FieldClass::Structure(s) => s.alignment(),
            FieldClass::StaticArray(a) => a.element_class().alignment_bits(),
            FieldClass::DynamicArray(a) => a.element_class().alignment_bits(),
            FieldClass::Variant(v) => v
                .options()
                .iter()
                .map(|o| o.class().alignment_bits())
                .max()
                .unwrap_or(1),
            FieldClass::Option(o) => o.content_class().alignment_bits(),
        }
    }

    pub fn as_structure(&self) -> Option<&StructureClass> {
        match self {
            FieldClass::Structure(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&VariantClass> {
        match self {
            FieldClass::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<&EnumerationClass> {
        match self {
            FieldClass::UnsignedEnumeration(e) | FieldClass::SignedEnumeration(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::path::Scope;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_bit_width_bounds() {
        assert!(IntegerClass::new(0, ByteOrder::Little).is_err());
        assert!(IntegerClass::new(65, ByteOrder::Little).is_err());
        assert!(IntegerClass::new(1, ByteOrder::Little).is_ok());
        assert!(IntegerClass::new(64, ByteOrder::Big).is_ok());
    }

    #[test]
    fn sub_byte_integers_pack_tight() {
        let int = IntegerClass::new(3, ByteOrder::Little).unwrap();
        assert_eq!(int.alignment(), 1);
        let int = IntegerClass::new(16, ByteOrder::Little).unwrap();
        assert_eq!(int.alignment(), 8);
    }

    #[test]
    fn overlapping_enum_ranges_yield_multiple_labels() {
        let int = IntegerClass::new(8, ByteOrder::Little).unwrap();
        let e = EnumerationClass::new(
            int,
            vec![
                EnumerationMapping {
                    label: "LOW".to_owned(),
                    ranges: vec![IntegerRange::new(0, 10)],
                },
                EnumerationMapping {
                    label: "FIVE".to_owned(),
                    ranges: vec![IntegerRange::single(5)],
                },
                EnumerationMapping {
                    label: "HIGH".to_owned(),
                    ranges: vec![IntegerRange::new(11, 20)],
                },
            ],
        );
        assert_eq!(e.labels_for_value(5), vec!["LOW", "FIVE"]);
        assert_eq!(e.labels_for_value(12), vec!["HIGH"]);
        assert!(e.labels_for_value(100).is_empty());
    }

    #[test]
    fn structure_rejects_duplicate_member_names() {
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let res = StructureClass::new(vec![("a", u8c.clone()), ("a", u8c)]);
        assert!(matches!(res, Err(Error::DuplicateMember(n)) if n == "a"));
    }

    #[test]
    fn structure_alignment_is_max_member_alignment() {
        let u3 = Rc::new(FieldClass::UnsignedInteger(
            IntegerClass::new(3, ByteOrder::Little).unwrap(),
        ));
        let u32c = FieldClass::unsigned_integer(32, ByteOrder::Little).unwrap();
        let s = StructureClass::new(vec![("a", u3), ("b", u32c)]).unwrap();
        assert_eq!(s.alignment(), 8);
    }

    #[test]
    fn variant_tag_selection() {
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let v = VariantClass::new(
            vec![
                VariantOption::new("a", vec![IntegerRange::single(1)], u8c.clone()),
                VariantOption::new("b", vec![IntegerRange::new(2, 9)], u8c),
            ],
            FieldPath::new(Scope::EventPayload, vec![0]),
        )
        .unwrap();
        assert_eq!(v.option_for_tag(1), Some(0));
        assert_eq!(v.option_for_tag(7), Some(1));
        assert_eq!(v.option_for_tag(10), None);
        assert_eq!(v.option_index("b"), Some(1));
    }
}
