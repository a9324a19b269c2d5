use crate::codec::bits::BitWriter;
use crate::error::Error;
use crate::field::class::{FieldClass, RealPrecision};
use crate::field::path::{FieldPath, Scope};
use crate::field::value::Field;

/// Recompute the wire fields of a scope that are derived from structure
/// rather than user-assigned: dynamic-array length fields, variant
/// selector tags, and option enabled flags.
///
/// Assignments whose path points into `scope` are applied to `root`
/// directly; assignments targeting another scope are returned so the
/// caller can apply them to that scope's root before encoding it.
pub fn materialize_wire_fields(
    root: &mut Field,
    scope: Scope,
) -> Result<Vec<(FieldPath, i128)>, Error> {
    let mut assignments = Vec::new();
    collect_assignments(root, &mut assignments)?;

    let mut foreign = Vec::new();
    for (path, value) in assignments.into_iter() {
        if path.root() == scope {
            let mut target = &mut *root;
            for idx in path.indices() {
                target = target
                    .member_at_mut(*idx)
                    .map_err(|_| Error::UnresolvedFieldPath(path.clone()))?;
            }
            target.set_integer_value(value)?;
        } else {
            foreign.push((path, value));
        }
    }
    Ok(foreign)
}

fn collect_assignments(
    field: &Field,
    out: &mut Vec<(FieldPath, i128)>,
) -> Result<(), Error> {
    match &**field.class() {
        FieldClass::Structure(s) => {
            for idx in 0..s.member_count() {
                collect_assignments(field.member_at(idx)?, out)?;
            }
        }
        FieldClass::StaticArray(_) => {
            for idx in 0..field.length()? {
                collect_assignments(field.element(idx)?, out)?;
            }
        }
        FieldClass::DynamicArray(a) => {
            let len = field.length()?;
            out.push((a.length_path().clone(), len as i128));
            for idx in 0..len {
                collect_assignments(field.element(idx)?, out)?;
            }
        }
        FieldClass::Variant(v) => {
            let selected = field.selected_option_index()?;
            let option = v.option_at(selected).ok_or(Error::NoSelectedOption)?;
            let tag = option
                .ranges()
                .first()
                .map(|r| r.lower)
                .ok_or_else(|| {
                    Error::Layout(format!(
                        "variant option '{}' has no selector ranges",
                        option.name()
                    ))
                })?;
            out.push((v.selector_path().clone(), tag));
            collect_assignments(field.selected_field()?, out)?;
        }
        FieldClass::Option(o) => {
            let enabled = field.is_enabled()?;
            if let Some(path) = o.selector_path() {
                out.push((path.clone(), i128::from(enabled)));
            }
            if enabled {
                collect_assignments(field.content()?, out)?;
            }
        }
        _ => (),
    }
    Ok(())
}

/// Serialize a fully-set field tree, honoring the same alignment, bit
/// width, and byte order rules the decoder applies. Unset leaves are a
/// precondition error.
pub fn encode_field(writer: &mut BitWriter, field: &Field) -> Result<(), Error> {
    let class = field.class().clone();
    writer.align_to(class.alignment_bits());
    match &*class {
        FieldClass::Bool(int) => {
            writer.write_bits(u64::from(field.boolean()?), int.bit_width(), int.byte_order());
        }
        FieldClass::UnsignedInteger(int) => {
            writer.write_bits(field.unsigned()?, int.bit_width(), int.byte_order());
        }
        FieldClass::UnsignedEnumeration(e) => {
            let int = e.integer_class();
            writer.write_bits(field.unsigned()?, int.bit_width(), int.byte_order());
        }
        FieldClass::SignedInteger(int) => {
            writer.write_bits(field.signed()? as u64, int.bit_width(), int.byte_order());
        }
        FieldClass::SignedEnumeration(e) => {
            let int = e.integer_class();
            writer.write_bits(field.signed()? as u64, int.bit_width(), int.byte_order());
        }
        FieldClass::Real(real) => {
            let raw = match real.precision() {
                RealPrecision::Single => u64::from((field.real()? as f32).to_bits()),
                RealPrecision::Double => field.real()?.to_bits(),
            };
            writer.write_bits(raw, real.bit_width(), real.byte_order());
        }
        FieldClass::String => {
            writer.write_bytes(field.string()?.as_bytes());
            writer.write_bytes(&[0]);
        }
        FieldClass::Structure(s) => {
            for idx in 0..s.member_count() {
                encode_field(writer, field.member_at(idx)?)?;
            }
        }
        FieldClass::StaticArray(_) | FieldClass::DynamicArray(_) => {
            for idx in 0..field.length()? {
                encode_field(writer, field.element(idx)?)?;
            }
        }
        FieldClass::Variant(_) => {
            encode_field(writer, field.selected_field()?)?;
        }
        FieldClass::Option(_) => {
            if field.is_enabled()? {
                encode_field(writer, field.content()?)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bits::BitCursor;
    use crate::codec::decode::{decode_field, ScopeFields};
    use crate::field::class::{
        ByteOrder, FieldClassRef, IntegerRange, VariantOption,
    };
    use pretty_assertions::assert_eq;

    fn u8c() -> FieldClassRef {
        FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap()
    }

    fn round_trip(class: &FieldClassRef, field: &Field) {
        let mut w = BitWriter::new();
        encode_field(&mut w, field).unwrap();
        let bytes = w.into_bytes();

        let mut cur = BitCursor::new(&bytes);
        let decoded =
            decode_field(&mut cur, class, Scope::EventPayload, &ScopeFields::default()).unwrap();
        assert_eq!(&decoded, field);

        // And back to the same bytes
        let mut w2 = BitWriter::new();
        encode_field(&mut w2, &decoded).unwrap();
        assert_eq!(w2.into_bytes(), bytes);
    }

    #[test]
    fn round_trip_mixed_widths_and_orders() {
        let class = FieldClass::structure(vec![
            (
                "a",
                FieldClass::unsigned_integer(3, ByteOrder::Little).unwrap(),
            ),
            (
                "b",
                FieldClass::signed_integer(13, ByteOrder::Little).unwrap(),
            ),
            (
                "c",
                FieldClass::unsigned_integer(32, ByteOrder::Big).unwrap(),
            ),
            ("s", FieldClass::string()),
            (
                "r",
                FieldClass::real(RealPrecision::Double, ByteOrder::Little),
            ),
        ])
        .unwrap();
        let mut f = Field::new(class.clone());
        f.member_mut("a").unwrap().set_unsigned(5).unwrap();
        f.member_mut("b").unwrap().set_signed(-1000).unwrap();
        f.member_mut("c").unwrap().set_unsigned(0xdeadbeef).unwrap();
        f.member_mut("s").unwrap().set_string("trace").unwrap();
        f.member_mut("r").unwrap().set_real(-2.5).unwrap();
        round_trip(&class, &f);
    }

    #[test]
    fn round_trip_dynamic_array_with_materialized_length() {
        let class = FieldClass::structure(vec![
            ("len", u8c()),
            (
                "data",
                FieldClass::dynamic_array(u8c(), FieldPath::new(Scope::EventPayload, vec![0])),
            ),
        ])
        .unwrap();
        let mut f = Field::new(class.clone());
        let data = f.member_mut("data").unwrap();
        data.set_length(4).unwrap();
        for i in 0..4 {
            data.element_mut(i).unwrap().set_unsigned(i as u64).unwrap();
        }
        // The length member is computed, not user-assigned
        let foreign = materialize_wire_fields(&mut f, Scope::EventPayload).unwrap();
        assert!(foreign.is_empty());
        assert_eq!(f.member("len").unwrap().unsigned().unwrap(), 4);
        round_trip(&class, &f);
    }

    #[test]
    fn round_trip_variant_with_materialized_tag() {
        let class = FieldClass::structure(vec![
            ("tag", u8c()),
            (
                "value",
                FieldClass::variant(
                    vec![
                        VariantOption::new("a", vec![IntegerRange::single(0)], u8c()),
                        VariantOption::new(
                            "b",
                            vec![IntegerRange::single(1)],
                            FieldClass::string(),
                        ),
                    ],
                    FieldPath::new(Scope::EventPayload, vec![0]),
                )
                .unwrap(),
            ),
        ])
        .unwrap();
        let mut f = Field::new(class.clone());
        let v = f.member_mut("value").unwrap();
        v.select_option(1).unwrap();
        v.selected_field_mut().unwrap().set_string("sel").unwrap();
        materialize_wire_fields(&mut f, Scope::EventPayload).unwrap();
        assert_eq!(f.member("tag").unwrap().unsigned().unwrap(), 1);
        round_trip(&class, &f);
    }

    #[test]
    fn encoding_an_unset_leaf_fails() {
        let class = FieldClass::structure(vec![("a", u8c())]).unwrap();
        let f = Field::new(class);
        let mut w = BitWriter::new();
        assert!(matches!(
            encode_field(&mut w, &f),
            Err(Error::UnsetField)
        ));
    }
}
