use crate::error::Error;
use crate::field::class::{FieldClass, FieldClassRef};

/// A live value bound to exactly one field class.
///
/// Fields start unset; typed setters validate against the class and typed
/// getters fail on unset fields rather than fabricating defaults.
#[derive(Clone, Debug)]
pub struct Field {
    class: FieldClassRef,
    value: FieldValue,
}

#[derive(Clone, Debug)]
enum FieldValue {
    Unset,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f64),
    Str(String),
    Structure(Vec<Field>),
    Array(Vec<Field>),
    Variant { selected: usize, field: Box<Field> },
    OptionSome(Box<Field>),
    OptionNone,
}

impl Field {
    /// Instantiate an unset field conforming to `class`. Structure members
    /// and static array elements are created (unset) up front; dynamic
    /// arrays stay empty until their length is set and variants until an
    /// option is selected.
    pub fn new(class: FieldClassRef) -> Self {
        let value = match &*class {
            FieldClass::Structure(s) => FieldValue::Structure(
                s.members()
                    .iter()
                    .map(|m| Field::new(m.class().clone()))
                    .collect(),
            ),
            FieldClass::StaticArray(a) => FieldValue::Array(
                (0..a.length())
                    .map(|_| Field::new(a.element_class().clone()))
                    .collect(),
            ),
            _ => FieldValue::Unset,
        };
        Self { class, value }
    }

    pub fn class(&self) -> &FieldClassRef {
        &self.class
    }

    /// A field is set once it holds a complete value; containers are set
    /// when every reachable child is set.
    pub fn is_set(&self) -> bool {
        match &self.value {
            FieldValue::Unset => false,
            FieldValue::Bool(_)
            | FieldValue::Unsigned(_)
            | FieldValue::Signed(_)
            | FieldValue::Real(_)
            | FieldValue::Str(_)
            | FieldValue::OptionNone => true,
            FieldValue::Structure(fields) | FieldValue::Array(fields) => {
                fields.iter().all(|f| f.is_set())
            }
            FieldValue::Variant { field, .. } => field.is_set(),
            FieldValue::OptionSome(f) => f.is_set(),
        }
    }

    fn type_mismatch(&self, expected: &'static str) -> Error {
        Error::FieldTypeMismatch {
            expected,
            actual: self.class.kind_name(),
        }
    }

    pub fn set_bool(&mut self, value: bool) -> Result<(), Error> {
        match &*self.class {
            FieldClass::Bool(_) => {
                self.value = FieldValue::Bool(value);
                Ok(())
            }
            _ => Err(self.type_mismatch("bool")),
        }
    }

    pub fn boolean(&self) -> Result<bool, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::Bool(_), FieldValue::Bool(v)) => Ok(*v),
            (FieldClass::Bool(_), FieldValue::Unset) => Err(Error::UnsetField),
            _ => Err(self.type_mismatch("bool")),
        }
    }

    pub fn set_unsigned(&mut self, value: u64) -> Result<(), Error> {
        let int = match &*self.class {
            FieldClass::UnsignedInteger(int) => int,
            FieldClass::UnsignedEnumeration(e) => e.integer_class(),
            _ => return Err(self.type_mismatch("unsigned integer")),
        };
        let bit_width = int.bit_width();
        if bit_width < 64 && value >= (1u64 << bit_width) {
            return Err(Error::OutOfRangeValue {
                value: value.into(),
                bit_width,
                signedness: "unsigned",
            });
        }
        self.value = FieldValue::Unsigned(value);
        Ok(())
    }

    pub fn unsigned(&self) -> Result<u64, Error> {
        match (&*self.class, &self.value) {
            (
                FieldClass::UnsignedInteger(_) | FieldClass::UnsignedEnumeration(_),
                FieldValue::Unsigned(v),
            ) => Ok(*v),
            (
                FieldClass::UnsignedInteger(_) | FieldClass::UnsignedEnumeration(_),
                FieldValue::Unset,
            ) => Err(Error::UnsetField),
            _ => Err(self.type_mismatch("unsigned integer")),
        }
    }

    pub fn set_signed(&mut self, value: i64) -> Result<(), Error> {
        let int = match &*self.class {
            FieldClass::SignedInteger(int) => int,
            FieldClass::SignedEnumeration(e) => e.integer_class(),
            _ => return Err(self.type_mismatch("signed integer")),
        };
        let bit_width = int.bit_width();
        if bit_width < 64 {
            let limit = 1i64 << (bit_width - 1);
            if value < -limit || value >= limit {
                return Err(Error::OutOfRangeValue {
                    value: value.into(),
                    bit_width,
                    signedness: "signed",
                });
            }
        }
        self.value = FieldValue::Signed(value);
        Ok(())
    }

    pub fn signed(&self) -> Result<i64, Error> {
        match (&*self.class, &self.value) {
            (
                FieldClass::SignedInteger(_) | FieldClass::SignedEnumeration(_),
                FieldValue::Signed(v),
            ) => Ok(*v),
            (FieldClass::SignedInteger(_) | FieldClass::SignedEnumeration(_), FieldValue::Unset) => {
                Err(Error::UnsetField)
            }
            _ => Err(self.type_mismatch("signed integer")),
        }
    }

    pub fn set_real(&mut self, value: f64) -> Result<(), Error> {
        match &*self.class {
            FieldClass::Real(_) => {
                self.value = FieldValue::Real(value);
                Ok(())
            }
            _ => Err(self.type_mismatch("real")),
        }
    }

    pub fn real(&self) -> Result<f64, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::Real(_), FieldValue::Real(v)) => Ok(*v),
            (FieldClass::Real(_), FieldValue::Unset) => Err(Error::UnsetField),
            _ => Err(self.type_mismatch("real")),
        }
    }

    pub fn set_string<T: AsRef<str>>(&mut self, value: T) -> Result<(), Error> {
        match &*self.class {
            FieldClass::String => {
                self.value = FieldValue::Str(value.as_ref().to_owned());
                Ok(())
            }
            _ => Err(self.type_mismatch("string")),
        }
    }

    pub fn string(&self) -> Result<&str, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::String, FieldValue::Str(v)) => Ok(v),
            (FieldClass::String, FieldValue::Unset) => Err(Error::UnsetField),
            _ => Err(self.type_mismatch("string")),
        }
    }

    /// Labels of the enumeration mappings containing the current value.
    /// Multiple matches are legal; so are none.
    pub fn labels(&self) -> Result<Vec<&str>, Error> {
        let e = self
            .class
            .as_enumeration()
            .ok_or_else(|| self.type_mismatch("enumeration"))?;
        let value = match &self.value {
            FieldValue::Unsigned(v) => i128::from(*v),
            FieldValue::Signed(v) => i128::from(*v),
            FieldValue::Unset => return Err(Error::UnsetField),
            _ => return Err(self.type_mismatch("enumeration")),
        };
        Ok(e.labels_for_value(value))
    }

    // Structure access

    pub fn member_count(&self) -> Result<usize, Error> {
        match &self.value {
            FieldValue::Structure(fields) => Ok(fields.len()),
            _ => Err(self.type_mismatch("structure")),
        }
    }

    pub fn member(&self, name: &str) -> Result<&Field, Error> {
        let s = self
            .class
            .as_structure()
            .ok_or_else(|| self.type_mismatch("structure"))?;
        let idx = s
            .member_index(name)
            .ok_or_else(|| Error::NoSuchMember(name.to_owned()))?;
        match &self.value {
            FieldValue::Structure(fields) => Ok(&fields[idx]),
            _ => Err(self.type_mismatch("structure")),
        }
    }

    pub fn member_mut(&mut self, name: &str) -> Result<&mut Field, Error> {
        let idx = {
            let s = self
                .class
                .as_structure()
                .ok_or_else(|| Error::FieldTypeMismatch {
                    expected: "structure",
                    actual: self.class.kind_name(),
                })?;
            s.member_index(name)
                .ok_or_else(|| Error::NoSuchMember(name.to_owned()))?
        };
        match &mut self.value {
            FieldValue::Structure(fields) => Ok(&mut fields[idx]),
            _ => Err(Error::FieldTypeMismatch {
                expected: "structure",
                actual: "non-structure",
            }),
        }
    }

    pub fn member_at(&self, index: usize) -> Result<&Field, Error> {
        match &self.value {
            FieldValue::Structure(fields) => {
                fields.get(index).ok_or_else(|| Error::IndexOutOfRange {
                    container: "structure",
                    index,
                    len: fields.len(),
                })
            }
            _ => Err(self.type_mismatch("structure")),
        }
    }

    pub fn member_at_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        match &mut self.value {
            FieldValue::Structure(fields) => {
                let len = fields.len();
                fields.get_mut(index).ok_or(Error::IndexOutOfRange {
                    container: "structure",
                    index,
                    len,
                })
            }
            _ => Err(Error::FieldTypeMismatch {
                expected: "structure",
                actual: "non-structure",
            }),
        }
    }

    // Array access

    /// Element count. Fails with `LengthNotSet` for a dynamic array whose
    /// length hasn't been established yet.
    pub fn length(&self) -> Result<usize, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::StaticArray(_) | FieldClass::DynamicArray(_), FieldValue::Array(v)) => {
                Ok(v.len())
            }
            (FieldClass::DynamicArray(_), FieldValue::Unset) => Err(Error::LengthNotSet),
            _ => Err(self.type_mismatch("array")),
        }
    }

    /// Set a dynamic array's length. Growing appends unset elements;
    /// shrinking keeps the leading elements and drops the rest.
    pub fn set_length(&mut self, length: usize) -> Result<(), Error> {
        let element_class = match &*self.class {
            FieldClass::DynamicArray(a) => a.element_class().clone(),
            _ => return Err(self.type_mismatch("dynamic array")),
        };
        let mut fields = match std::mem::replace(&mut self.value, FieldValue::Unset) {
            FieldValue::Array(v) => v,
            _ => Vec::new(),
        };
        fields.resize_with(length, || Field::new(element_class.clone()));
        self.value = FieldValue::Array(fields);
        Ok(())
    }

    pub fn element(&self, index: usize) -> Result<&Field, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::StaticArray(_) | FieldClass::DynamicArray(_), FieldValue::Array(v)) => {
                v.get(index).ok_or_else(|| Error::IndexOutOfRange {
                    container: "array",
                    index,
                    len: v.len(),
                })
            }
            (FieldClass::DynamicArray(_), FieldValue::Unset) => Err(Error::LengthNotSet),
            _ => Err(self.type_mismatch("array")),
        }
    }

    pub fn element_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        match &mut self.value {
            FieldValue::Array(v) => {
                let len = v.len();
                v.get_mut(index).ok_or(Error::IndexOutOfRange {
                    container: "array",
                    index,
                    len,
                })
            }
            FieldValue::Unset if matches!(&*self.class, FieldClass::DynamicArray(_)) => {
                Err(Error::LengthNotSet)
            }
            _ => Err(Error::FieldTypeMismatch {
                expected: "array",
                actual: "non-array",
            }),
        }
    }

    // Variant access

    /// Select an option by index, replacing any previous selection with a
    /// fresh unset field of the option's class.
    pub fn select_option(&mut self, index: usize) -> Result<(), Error> {
        let v = self
            .class
            .as_variant()
            .ok_or_else(|| Error::FieldTypeMismatch {
                expected: "variant",
                actual: self.class.kind_name(),
            })?;
        let option = v.option_at(index).ok_or_else(|| Error::IndexOutOfRange {
            container: "variant",
            index,
            len: v.options().len(),
        })?;
        self.value = FieldValue::Variant {
            selected: index,
            field: Box::new(Field::new(option.class().clone())),
        };
        Ok(())
    }

    pub fn selected_option_index(&self) -> Result<usize, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::Variant(_), FieldValue::Variant { selected, .. }) => Ok(*selected),
            (FieldClass::Variant(_), FieldValue::Unset) => Err(Error::NoSelectedOption),
            _ => Err(self.type_mismatch("variant")),
        }
    }

    pub fn selected_field(&self) -> Result<&Field, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::Variant(_), FieldValue::Variant { field, .. }) => Ok(field),
            (FieldClass::Variant(_), FieldValue::Unset) => Err(Error::NoSelectedOption),
            _ => Err(self.type_mismatch("variant")),
        }
    }

    pub fn selected_field_mut(&mut self) -> Result<&mut Field, Error> {
        match &mut self.value {
            FieldValue::Variant { field, .. } => Ok(field),
            FieldValue::Unset if matches!(&*self.class, FieldClass::Variant(_)) => {
                Err(Error::NoSelectedOption)
            }
            _ => Err(Error::FieldTypeMismatch {
                expected: "variant",
                actual: "non-variant",
            }),
        }
    }

    // Option access

    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), Error> {
        let content_class = match &*self.class {
            FieldClass::Option(o) => o.content_class().clone(),
            _ => return Err(self.type_mismatch("option")),
        };
        self.value = if enabled {
            FieldValue::OptionSome(Box::new(Field::new(content_class)))
        } else {
            FieldValue::OptionNone
        };
        Ok(())
    }

    pub fn is_enabled(&self) -> Result<bool, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::Option(_), FieldValue::OptionSome(_)) => Ok(true),
            (FieldClass::Option(_), FieldValue::OptionNone) => Ok(false),
            (FieldClass::Option(_), FieldValue::Unset) => Err(Error::UnsetField),
            _ => Err(self.type_mismatch("option")),
        }
    }

    pub fn content(&self) -> Result<&Field, Error> {
        match (&*self.class, &self.value) {
            (FieldClass::Option(_), FieldValue::OptionSome(f)) => Ok(f),
            (FieldClass::Option(_), FieldValue::OptionNone | FieldValue::Unset) => {
                Err(Error::UnsetField)
            }
            _ => Err(self.type_mismatch("option")),
        }
    }

    pub fn content_mut(&mut self) -> Result<&mut Field, Error> {
        match &mut self.value {
            FieldValue::OptionSome(f) => Ok(f),
            FieldValue::OptionNone | FieldValue::Unset
                if matches!(&*self.class, FieldClass::Option(_)) =>
            {
                Err(Error::UnsetField)
            }
            _ => Err(Error::FieldTypeMismatch {
                expected: "option",
                actual: "non-option",
            }),
        }
    }

    /// Widened integer view used for selector and length resolution.
    pub(crate) fn integer_value(&self) -> Result<i128, Error> {
        match &self.value {
            FieldValue::Unsigned(v) => Ok(i128::from(*v)),
            FieldValue::Signed(v) => Ok(i128::from(*v)),
            FieldValue::Bool(v) => Ok(i128::from(*v)),
            FieldValue::Unset => Err(Error::UnsetField),
            _ => Err(self.type_mismatch("integer")),
        }
    }

    /// Store a widened integer value, dispatching on the class kind.
    /// Used when wire fields (lengths, tags) are computed rather than
    /// user-assigned.
    pub(crate) fn set_integer_value(&mut self, value: i128) -> Result<(), Error> {
        match &*self.class {
            FieldClass::UnsignedInteger(_) | FieldClass::UnsignedEnumeration(_) => {
                let v = u64::try_from(value).map_err(|_| Error::OutOfRangeValue {
                    value,
                    bit_width: 64,
                    signedness: "unsigned",
                })?;
                self.set_unsigned(v)
            }
            FieldClass::SignedInteger(_) | FieldClass::SignedEnumeration(_) => {
                let v = i64::try_from(value).map_err(|_| Error::OutOfRangeValue {
                    value,
                    bit_width: 64,
                    signedness: "signed",
                })?;
                self.set_signed(v)
            }
            _ => Err(self.type_mismatch("integer")),
        }
    }
}

impl PartialEq for Field {
    /// Two fields are equal iff their classes are equal and their
    /// effective values are equal; unset == unset, set != unset.
    fn eq(&self, other: &Self) -> bool {
        if self.class != other.class {
            return false;
        }
        use FieldValue::*;
        match (&self.value, &other.value) {
            (Unset, Unset) => true,
            (Bool(a), Bool(b)) => a == b,
            (Unsigned(a), Unsigned(b)) => a == b,
            (Signed(a), Signed(b)) => a == b,
            (Real(a), Real(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Structure(a), Structure(b)) | (Array(a), Array(b)) => a == b,
            (
                Variant {
                    selected: sa,
                    field: fa,
                },
                Variant {
                    selected: sb,
                    field: fb,
                },
            ) => sa == sb && fa == fb,
            (OptionSome(a), OptionSome(b)) => a == b,
            (OptionNone, OptionNone) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use FieldValue::*;
        match &self.value {
            Unset => write!(f, "<unset>"),
            Bool(v) => write!(f, "{v}"),
            Unsigned(v) => {
                write!(f, "{v}")?;
                if self.class.as_enumeration().is_some() {
                    if let Ok(labels) = self.labels() {
                        if !labels.is_empty() {
                            write!(f, " ({})", labels.join("|"))?;
                        }
                    }
                }
                Ok(())
            }
            Signed(v) => {
                write!(f, "{v}")?;
                if self.class.as_enumeration().is_some() {
                    if let Ok(labels) = self.labels() {
                        if !labels.is_empty() {
                            write!(f, " ({})", labels.join("|"))?;
                        }
                    }
                }
                Ok(())
            }
            Real(v) => write!(f, "{v}"),
            Str(v) => write!(f, "{v:?}"),
            Structure(fields) => {
                write!(f, "{{ ")?;
                if let Some(s) = self.class.as_structure() {
                    for (i, (m, field)) in s.members().iter().zip(fields.iter()).enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} = {}", m.name(), field)?;
                    }
                }
                write!(f, " }}")
            }
            Array(fields) => {
                write!(f, "[")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "]")
            }
            Variant { selected, field } => {
                if let Some(v) = self.class.as_variant() {
                    if let Some(o) = v.option_at(*selected) {
                        return write!(f, "{}: {}", o.name(), field);
                    }
                }
                write!(f, "{field}")
            }
            OptionSome(field) => write!(f, "{field}"),
            OptionNone => write!(f, "<none>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::class::{ByteOrder, IntegerRange, VariantOption};
    use crate::field::path::{FieldPath, Scope};
    use pretty_assertions::assert_eq;

    fn u8_class() -> FieldClassRef {
        FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap()
    }

    #[test]
    fn unsigned_range_validation() {
        let c = FieldClass::unsigned_integer(4, ByteOrder::Little).unwrap();
        let mut f = Field::new(c);
        assert!(f.set_unsigned(15).is_ok());
        assert!(matches!(
            f.set_unsigned(16),
            Err(Error::OutOfRangeValue { bit_width: 4, .. })
        ));
        assert_eq!(f.unsigned().unwrap(), 15);
    }

    #[test]
    fn signed_range_validation() {
        let c = FieldClass::signed_integer(8, ByteOrder::Little).unwrap();
        let mut f = Field::new(c);
        assert!(f.set_signed(-128).is_ok());
        assert!(f.set_signed(127).is_ok());
        assert!(f.set_signed(128).is_err());
        assert!(f.set_signed(-129).is_err());
    }

    #[test]
    fn reading_unset_field_is_an_error() {
        let f = Field::new(u8_class());
        assert!(matches!(f.unsigned(), Err(Error::UnsetField)));
    }

    #[test]
    fn structure_member_access_by_name_and_index() {
        let c = FieldClass::structure(vec![("a", u8_class()), ("b", FieldClass::string())])
            .unwrap();
        let mut f = Field::new(c);
        f.member_mut("a").unwrap().set_unsigned(7).unwrap();
        f.member_mut("b").unwrap().set_string("hi").unwrap();
        assert_eq!(f.member("a").unwrap().unsigned().unwrap(), 7);
        assert_eq!(f.member_at(1).unwrap().string().unwrap(), "hi");
        assert!(matches!(f.member("nope"), Err(Error::NoSuchMember(_))));
    }

    #[test]
    fn dynamic_array_requires_length() {
        let c = FieldClass::dynamic_array(
            u8_class(),
            FieldPath::new(Scope::EventPayload, vec![0]),
        );
        let mut f = Field::new(c);
        assert!(matches!(f.element(0), Err(Error::LengthNotSet)));
        f.set_length(2).unwrap();
        f.element_mut(0).unwrap().set_unsigned(1).unwrap();
        f.element_mut(1).unwrap().set_unsigned(2).unwrap();
        assert_eq!(f.length().unwrap(), 2);
        // Shrinking keeps the prefix
        f.set_length(1).unwrap();
        assert_eq!(f.element(0).unwrap().unsigned().unwrap(), 1);
        assert!(f.element(1).is_err());
    }

    #[test]
    fn variant_selection() {
        let c = FieldClass::variant(
            vec![
                VariantOption::new("u", vec![IntegerRange::single(0)], u8_class()),
                VariantOption::new("s", vec![IntegerRange::single(1)], FieldClass::string()),
            ],
            FieldPath::new(Scope::EventPayload, vec![0]),
        )
        .unwrap();
        let mut f = Field::new(c);
        assert!(matches!(f.selected_field(), Err(Error::NoSelectedOption)));
        assert!(matches!(
            f.select_option(2),
            Err(Error::IndexOutOfRange { .. })
        ));
        f.select_option(1).unwrap();
        f.selected_field_mut().unwrap().set_string("x").unwrap();
        assert_eq!(f.selected_option_index().unwrap(), 1);
        assert_eq!(f.selected_field().unwrap().string().unwrap(), "x");
    }

    #[test]
    fn equality_semantics() {
        let c = u8_class();
        let mut a = Field::new(c.clone());
        let mut b = Field::new(c.clone());
        // Unset fields of the same class are equal
        assert_eq!(a, b);
        a.set_unsigned(3).unwrap();
        // Set vs unset never equal
        assert_ne!(a, b);
        b.set_unsigned(3).unwrap();
        assert_eq!(a, b);
        b.set_unsigned(4).unwrap();
        assert_ne!(a, b);
        // Same value, different class
        let c16 = FieldClass::unsigned_integer(16, ByteOrder::Little).unwrap();
        let mut d = Field::new(c16);
        d.set_unsigned(3).unwrap();
        assert_ne!(a, d);
    }
}
