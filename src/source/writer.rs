//! Stream file writer, the encoding mirror of the packet source. Used to
//! produce trace fixtures and to round-trip packets through the codec.

use crate::codec::{encode_field, materialize_wire_fields, BitWriter};
use crate::error::Error;
use crate::field::path::Scope;
use crate::field::value::Field;
use crate::source::{TraceLayout, WireClasses, PACKET_ALIGNMENT_BITS, PACKET_MAGIC};

pub struct EventSpec {
    pub class_id: u64,
    pub timestamp: u64,
    pub common_context: Option<Field>,
    pub specific_context: Option<Field>,
    pub payload: Option<Field>,
}

impl EventSpec {
    pub fn new(class_id: u64, timestamp: u64, payload: Option<Field>) -> Self {
        Self {
            class_id,
            timestamp,
            common_context: None,
            specific_context: None,
            payload,
        }
    }

    pub fn with_common_context(mut self, field: Field) -> Self {
        self.common_context = Some(field);
        self
    }

    pub fn with_specific_context(mut self, field: Field) -> Self {
        self.specific_context = Some(field);
        self
    }
}

pub struct PacketSpec {
    pub stream_id: u64,
    pub timestamp_begin: u64,
    pub timestamp_end: u64,
    /// Cumulative discarded-events counter as of this packet.
    pub events_discarded: u64,
    pub events: Vec<EventSpec>,
}

/// Serialize packets into stream file bytes. Packet and content sizes
/// are computed, not caller-supplied: a measuring encode pass runs first,
/// then the real one with the sizes filled in (both passes produce the
/// same bit length because the size fields are fixed-width).
pub fn write_stream_file(
    layout: &TraceLayout,
    packets: Vec<PacketSpec>,
) -> Result<Vec<u8>, Error> {
    let wire = WireClasses::for_layout(layout)?;
    let extras = layout
        .packet_context
        .as_ref()
        .map(|d| d.to_class())
        .transpose()?;
    let mut out = Vec::new();
    for mut packet in packets.into_iter() {
        for ev in packet.events.iter_mut() {
            for (scope, field) in [
                (Scope::EventCommonContext, ev.common_context.as_mut()),
                (Scope::EventSpecificContext, ev.specific_context.as_mut()),
                (Scope::EventPayload, ev.payload.as_mut()),
            ] {
                if let Some(field) = field {
                    let foreign = materialize_wire_fields(field, scope)?;
                    if !foreign.is_empty() {
                        return Err(Error::Layout(
                            "Cross-scope length and selector references are not supported by the stream writer"
                                .to_owned(),
                        ));
                    }
                }
            }
        }

        let content_size_bits =
            encode_packet(&wire, extras.as_ref(), &packet, 0, 0)?.position_bits();
        let packet_size_bits =
            content_size_bits.div_ceil(PACKET_ALIGNMENT_BITS) * PACKET_ALIGNMENT_BITS;
        let mut w = encode_packet(
            &wire,
            extras.as_ref(),
            &packet,
            packet_size_bits,
            content_size_bits,
        )?;
        w.pad_to(packet_size_bits);
        out.extend_from_slice(&w.into_bytes());
    }
    Ok(out)
}

fn encode_packet(
    wire: &WireClasses,
    extras: Option<&crate::field::class::FieldClassRef>,
    packet: &PacketSpec,
    packet_size_bits: u64,
    content_size_bits: u64,
) -> Result<BitWriter, Error> {
    let mut w = BitWriter::new();

    let mut header = Field::new(wire.packet_header.clone());
    header
        .member_mut("magic")?
        .set_unsigned(u64::from(PACKET_MAGIC))?;
    header.member_mut("stream_id")?.set_unsigned(packet.stream_id)?;
    encode_field(&mut w, &header)?;

    let mut context = Field::new(wire.packet_context.clone());
    context
        .member_mut("packet_size_bits")?
        .set_unsigned(packet_size_bits)?;
    context
        .member_mut("content_size_bits")?
        .set_unsigned(content_size_bits)?;
    context
        .member_mut("timestamp_begin")?
        .set_unsigned(packet.timestamp_begin)?;
    context
        .member_mut("timestamp_end")?
        .set_unsigned(packet.timestamp_end)?;
    context
        .member_mut("events_discarded")?
        .set_unsigned(packet.events_discarded)?;
    // Layout-declared extra context members are written as zeroes
    if let Some(extras_class) = extras {
        if let Some(s) = extras_class.as_structure() {
            for member in s.members().iter() {
                zero_fill(context.member_mut(member.name())?)?;
            }
        }
    }
    encode_field(&mut w, &context)?;

    for ev in packet.events.iter() {
        let mut header = Field::new(wire.event_header.clone());
        header.member_mut("id")?.set_unsigned(ev.class_id)?;
        header.member_mut("timestamp")?.set_unsigned(ev.timestamp)?;
        encode_field(&mut w, &header)?;
        for field in [
            ev.common_context.as_ref(),
            ev.specific_context.as_ref(),
            ev.payload.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            encode_field(&mut w, field)?;
        }
    }
    Ok(w)
}

/// Give a leaf or container a neutral value so the scope encodes.
fn zero_fill(field: &mut Field) -> Result<(), Error> {
    use crate::field::class::FieldClass;
    match &*field.class().clone() {
        FieldClass::Bool(_) => field.set_bool(false),
        FieldClass::UnsignedInteger(_) | FieldClass::UnsignedEnumeration(_) => {
            field.set_unsigned(0)
        }
        FieldClass::SignedInteger(_) | FieldClass::SignedEnumeration(_) => field.set_signed(0),
        FieldClass::Real(_) => field.set_real(0.0),
        FieldClass::String => field.set_string(""),
        FieldClass::Structure(s) => {
            for idx in 0..s.member_count() {
                zero_fill(field.member_at_mut(idx)?)?;
            }
            Ok(())
        }
        FieldClass::StaticArray(_) => {
            for idx in 0..field.length()? {
                zero_fill(field.element_mut(idx)?)?;
            }
            Ok(())
        }
        FieldClass::DynamicArray(_) => field.set_length(0),
        FieldClass::Variant(_) => {
            field.select_option(0)?;
            zero_fill(field.selected_field_mut()?)
        }
        FieldClass::Option(_) => field.set_enabled(false),
    }
}
