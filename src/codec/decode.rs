use crate::codec::bits::BitCursor;
use crate::error::{DecodeError, Error};
use crate::field::class::{FieldClass, FieldClassRef, RealPrecision};
use crate::field::path::{FieldPath, Scope};
use crate::field::value::Field;

/// Scope roots that were fully decoded before the current one, available
/// as targets for length and selector field paths.
#[derive(Clone, Copy, Default)]
pub struct ScopeFields<'a> {
    pub packet_context: Option<&'a Field>,
    pub event_common_context: Option<&'a Field>,
    pub event_specific_context: Option<&'a Field>,
    pub event_payload: Option<&'a Field>,
}

impl<'a> ScopeFields<'a> {
    fn get(&self, scope: Scope) -> Option<&'a Field> {
        match scope {
            Scope::PacketContext => self.packet_context,
            Scope::EventCommonContext => self.event_common_context,
            Scope::EventSpecificContext => self.event_specific_context,
            Scope::EventPayload => self.event_payload,
        }
    }
}

/// Decode one top-level field (a whole scope, typically a structure)
/// from the cursor.
///
/// All-or-nothing: on failure the caller's cursor is left untouched and
/// no partial field tree escapes.
pub fn decode_field(
    cursor: &mut BitCursor<'_>,
    class: &FieldClassRef,
    scope: Scope,
    scopes: &ScopeFields<'_>,
) -> Result<Field, Error> {
    let mut scratch = cursor.clone();
    let mut decoder = Decoder {
        scopes,
        scope,
        stack: Vec::new(),
        recorded: Vec::new(),
    };
    let field = decoder.decode(&mut scratch, class)?;
    *cursor = scratch;
    Ok(field)
}

struct Decoder<'a> {
    scopes: &'a ScopeFields<'a>,
    scope: Scope,
    // Structural position of the field currently being decoded
    stack: Vec<usize>,
    // Integer values decoded so far in this scope, keyed by position,
    // so that length/selector paths into the in-progress scope resolve
    recorded: Vec<(Vec<usize>, i128)>,
}

impl<'a> Decoder<'a> {
    fn decode(
        &mut self,
        cur: &mut BitCursor<'_>,
        class: &FieldClassRef,
    ) -> Result<Field, Error> {
        cur.align_to(class.alignment_bits())?;
        let mut field = Field::new(class.clone());
        match &**class {
            FieldClass::Bool(int) => {
                let raw = cur.read_bits(int.bit_width(), int.byte_order())?;
                field.set_bool(raw != 0)?;
            }
            FieldClass::UnsignedInteger(int) => {
                let raw = cur.read_bits(int.bit_width(), int.byte_order())?;
                field.set_unsigned(raw)?;
                self.recorded.push((self.stack.clone(), i128::from(raw)));
            }
            FieldClass::UnsignedEnumeration(e) => {
                let int = e.integer_class();
                let raw = cur.read_bits(int.bit_width(), int.byte_order())?;
                field.set_unsigned(raw)?;
                self.recorded.push((self.stack.clone(), i128::from(raw)));
            }
            FieldClass::SignedInteger(int) => {
                let raw = cur.read_bits(int.bit_width(), int.byte_order())?;
                let value = sign_extend(raw, int.bit_width());
                field.set_signed(value)?;
                self.recorded.push((self.stack.clone(), i128::from(value)));
            }
            FieldClass::SignedEnumeration(e) => {
                let int = e.integer_class();
                let raw = cur.read_bits(int.bit_width(), int.byte_order())?;
                let value = sign_extend(raw, int.bit_width());
                field.set_signed(value)?;
                self.recorded.push((self.stack.clone(), i128::from(value)));
            }
            FieldClass::Real(real) => {
                let raw = cur.read_bits(real.bit_width(), real.byte_order())?;
                let value = match real.precision() {
                    RealPrecision::Single => f64::from(f32::from_bits(raw as u32)),
                    RealPrecision::Double => f64::from_bits(raw),
                };
                field.set_real(value)?;
            }
            FieldClass::String => {
                let bytes = cur.read_null_terminated_bytes()?;
                let s = String::from_utf8(bytes).map_err(DecodeError::InvalidString)?;
                field.set_string(s)?;
            }
            FieldClass::Structure(s) => {
                for (idx, member) in s.members().iter().enumerate() {
                    self.stack.push(idx);
                    let decoded = self.decode(cur, member.class())?;
                    self.stack.pop();
                    *field.member_at_mut(idx)? = decoded;
                }
            }
            FieldClass::StaticArray(a) => {
                for idx in 0..a.length() as usize {
                    self.stack.push(idx);
                    let decoded = self.decode(cur, a.element_class())?;
                    self.stack.pop();
                    *field.element_mut(idx)? = decoded;
                }
            }
            FieldClass::DynamicArray(a) => {
                let raw_len = self.resolve_path(a.length_path())?;
                // Every element takes at least one bit, so anything beyond
                // the remaining bit count is corrupt before we allocate
                if raw_len < 0 || raw_len as u128 > u128::from(cur.remaining_bits()) {
                    return Err(DecodeError::UnrepresentableLength(raw_len).into());
                }
                let len = raw_len as usize;
                field.set_length(len)?;
                for idx in 0..len {
                    self.stack.push(idx);
                    let decoded = self.decode(cur, a.element_class())?;
                    self.stack.pop();
                    *field.element_mut(idx)? = decoded;
                }
            }
            FieldClass::Variant(v) => {
                let tag = self.resolve_path(v.selector_path())?;
                let idx = v
                    .option_for_tag(tag)
                    .ok_or(DecodeError::NoVariantOptionForTag(tag))?;
                field.select_option(idx)?;
                // Only the selected option exists in the byte stream
                let option_class = v
                    .option_at(idx)
                    .map(|o| o.class().clone())
                    .ok_or(DecodeError::NoVariantOptionForTag(tag))?;
                self.stack.push(idx);
                let decoded = self.decode(cur, &option_class)?;
                self.stack.pop();
                *field.selected_field_mut()? = decoded;
            }
            FieldClass::Option(o) => {
                let path = o.selector_path().ok_or_else(|| {
                    Error::Layout(
                        "an option field class without a selector path cannot be decoded"
                            .to_owned(),
                    )
                })?;
                let enabled = self.resolve_path(path)? != 0;
                field.set_enabled(enabled)?;
                if enabled {
                    let content_class = o.content_class().clone();
                    let decoded = self.decode(cur, &content_class)?;
                    *field.content_mut()? = decoded;
                }
            }
        }
        Ok(field)
    }

    /// Resolve a length/selector path to the integer it refers to: either
    /// a field recorded earlier in the scope currently being decoded, or a
    /// field of an already-complete outer scope.
    fn resolve_path(&self, path: &FieldPath) -> Result<i128, Error> {
        if path.root() == self.scope {
            return self
                .recorded
                .iter()
                .rev()
                .find(|(pos, _)| pos == path.indices())
                .map(|(_, v)| *v)
                .ok_or_else(|| DecodeError::BadPath(path.clone()).into());
        }
        let mut field = self
            .scopes
            .get(path.root())
            .ok_or_else(|| DecodeError::BadPath(path.clone()))?;
        for idx in path.indices() {
            field = field
                .member_at(*idx)
                .map_err(|_| DecodeError::BadPath(path.clone()))?;
        }
        field
            .integer_value()
            .map_err(|_| DecodeError::BadPath(path.clone()).into())
    }
}

fn sign_extend(raw: u64, bit_width: u8) -> i64 {
    if bit_width >= 64 {
        raw as i64
    } else if (raw >> (bit_width - 1)) & 1 == 1 {
        (raw | !((1u64 << bit_width) - 1)) as i64
    } else {
        raw as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bits::BitWriter;
    use crate::field::class::ByteOrder;
    use pretty_assertions::assert_eq;

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0b1111, 4), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0b1000, 4), -8);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn failed_decode_leaves_cursor_untouched() {
        let class = FieldClass::structure(vec![
            (
                "a",
                FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap(),
            ),
            (
                "b",
                FieldClass::unsigned_integer(32, ByteOrder::Little).unwrap(),
            ),
        ])
        .unwrap();
        // Only 2 bytes available, "b" will run out
        let data = [0x01, 0x02];
        let mut cur = BitCursor::new(&data);
        let res = decode_field(&mut cur, &class, Scope::EventPayload, &ScopeFields::default());
        assert!(matches!(
            res,
            Err(Error::Decode(DecodeError::Truncated { .. }))
        ));
        assert_eq!(cur.position_bits(), 0);
    }

    #[test]
    fn dynamic_array_length_from_same_scope() {
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let class = FieldClass::structure(vec![
            ("len", u8c.clone()),
            (
                "data",
                FieldClass::dynamic_array(u8c, FieldPath::new(Scope::EventPayload, vec![0])),
            ),
        ])
        .unwrap();

        let mut w = BitWriter::new();
        w.write_bits(3, 8, ByteOrder::Little);
        for v in [10u64, 20, 30] {
            w.write_bits(v, 8, ByteOrder::Little);
        }
        let bytes = w.into_bytes();

        let mut cur = BitCursor::new(&bytes);
        let f = decode_field(&mut cur, &class, Scope::EventPayload, &ScopeFields::default())
            .unwrap();
        let data = f.member("data").unwrap();
        assert_eq!(data.length().unwrap(), 3);
        assert_eq!(data.element(1).unwrap().unsigned().unwrap(), 20);
    }

    #[test]
    fn corrupt_dynamic_array_length_is_rejected_before_allocation() {
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let class = FieldClass::structure(vec![
            (
                "len",
                FieldClass::unsigned_integer(64, ByteOrder::Little).unwrap(),
            ),
            (
                "data",
                FieldClass::dynamic_array(u8c, FieldPath::new(Scope::EventPayload, vec![0])),
            ),
        ])
        .unwrap();

        let mut w = BitWriter::new();
        w.write_bits(u64::MAX, 64, ByteOrder::Little);
        let bytes = w.into_bytes();
        let mut cur = BitCursor::new(&bytes);
        let res = decode_field(&mut cur, &class, Scope::EventPayload, &ScopeFields::default());
        assert!(matches!(
            res,
            Err(Error::Decode(DecodeError::UnrepresentableLength(_)))
        ));
    }

    #[test]
    fn variant_decodes_only_the_selected_option() {
        use crate::field::class::{IntegerRange, VariantOption};
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let u16c = FieldClass::unsigned_integer(16, ByteOrder::Little).unwrap();
        let class = FieldClass::structure(vec![
            ("tag", u8c.clone()),
            (
                "value",
                FieldClass::variant(
                    vec![
                        VariantOption::new("small", vec![IntegerRange::single(0)], u8c),
                        VariantOption::new("big", vec![IntegerRange::single(1)], u16c),
                    ],
                    FieldPath::new(Scope::EventPayload, vec![0]),
                )
                .unwrap(),
            ),
        ])
        .unwrap();

        let mut w = BitWriter::new();
        w.write_bits(1, 8, ByteOrder::Little);
        w.write_bits(0xbeef, 16, ByteOrder::Little);
        let bytes = w.into_bytes();

        let mut cur = BitCursor::new(&bytes);
        let f = decode_field(&mut cur, &class, Scope::EventPayload, &ScopeFields::default())
            .unwrap();
        let v = f.member("value").unwrap();
        assert_eq!(v.selected_option_index().unwrap(), 1);
        assert_eq!(v.selected_field().unwrap().unsigned().unwrap(), 0xbeef);
        // Exactly 3 bytes consumed, sibling options are not on the wire
        assert_eq!(cur.position_bits(), 24);
    }

    #[test]
    fn invalid_variant_tag_is_a_decode_error() {
        use crate::field::class::{IntegerRange, VariantOption};
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let class = FieldClass::structure(vec![
            ("tag", u8c.clone()),
            (
                "value",
                FieldClass::variant(
                    vec![VariantOption::new(
                        "only",
                        vec![IntegerRange::single(0)],
                        u8c,
                    )],
                    FieldPath::new(Scope::EventPayload, vec![0]),
                )
                .unwrap(),
            ),
        ])
        .unwrap();

        let data = [9u8, 0];
        let mut cur = BitCursor::new(&data);
        let res = decode_field(&mut cur, &class, Scope::EventPayload, &ScopeFields::default());
        assert!(matches!(
            res,
            Err(Error::Decode(DecodeError::NoVariantOptionForTag(9)))
        ));
    }

    #[test]
    fn length_from_outer_scope() {
        let u8c = FieldClass::unsigned_integer(8, ByteOrder::Little).unwrap();
        let pkt_ctx_class = FieldClass::structure(vec![("n", u8c.clone())]).unwrap();
        let mut pkt_ctx = Field::new(pkt_ctx_class);
        pkt_ctx.member_mut("n").unwrap().set_unsigned(2).unwrap();

        let payload_class = FieldClass::structure(vec![(
            "data",
            FieldClass::dynamic_array(u8c, FieldPath::new(Scope::PacketContext, vec![0])),
        )])
        .unwrap();

        let data = [7u8, 8];
        let mut cur = BitCursor::new(&data);
        let scopes = ScopeFields {
            packet_context: Some(&pkt_ctx),
            ..Default::default()
        };
        let f = decode_field(&mut cur, &payload_class, Scope::EventPayload, &scopes).unwrap();
        assert_eq!(f.member("data").unwrap().length().unwrap(), 2);
        assert_eq!(
            f.member("data")
                .unwrap()
                .element(1)
                .unwrap()
                .unsigned()
                .unwrap(),
            8
        );
    }
}
