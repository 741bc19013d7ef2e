use std::sync::Arc;

use bytes::Buf;

use crate::{
    format::{
        Field,
        FieldType,
        MessageLayout,
    },
    util::BufReadBytesExt,
    value::Value,
};

/// A framed record that hasn't been decoded yet.
///
/// This borrows the payload from the input buffer, so iterating over these
/// doesn't copy anything.
#[derive(Clone, Debug)]
pub struct RawRecord<'a> {
    pub(crate) layout: Arc<MessageLayout>,
    pub(crate) offset: u64,
    pub(crate) payload: &'a [u8],
}

impl<'a> RawRecord<'a> {
    pub fn layout(&self) -> &Arc<MessageLayout> {
        &self.layout
    }

    pub fn name(&self) -> &str {
        self.layout.name()
    }

    /// Offset of the record header in the input.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes following the header.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Decodes a single field.
    pub fn field(&self, name: &str) -> Option<Value> {
        let mut buffer = self.payload;
        for field in self.layout.fields() {
            if field.name == name {
                return Some(decode_field(field, &mut buffer));
            }
            buffer.advance(field.field_type.size());
        }
        None
    }

    pub fn decode(&self) -> Record {
        Record {
            layout: self.layout.clone(),
            values: decode_values(&self.layout, self.payload),
        }
    }

    /// Decodes the record, releasing the borrow of the input.
    pub fn into_record(self) -> Record {
        let values = decode_values(&self.layout, self.payload);
        Record {
            layout: self.layout,
            values,
        }
    }
}

/// A decoded record.
///
/// Values are in the order of the layout's fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    layout: Arc<MessageLayout>,
    values: Vec<Value>,
}

impl Record {
    pub fn layout(&self) -> &Arc<MessageLayout> {
        &self.layout
    }

    pub fn name(&self) -> &str {
        self.layout.name()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.layout
            .field_index(field)
            .map(|index| &self.values[index])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.layout.fields().iter().zip(&self.values)
    }
}

/// Decodes all fields of a payload.
///
/// The payload must be exactly [`MessageLayout::payload_length`] bytes long.
pub fn decode_values(layout: &MessageLayout, payload: &[u8]) -> Vec<Value> {
    debug_assert_eq!(payload.len(), layout.payload_length());

    let mut buffer = payload;
    layout
        .fields()
        .iter()
        .map(|field| decode_field(field, &mut buffer))
        .collect()
}

fn decode_field<B: Buf>(field: &Field, buffer: &mut B) -> Value {
    let value = match field.field_type {
        FieldType::Int8 => Value::Int(buffer.get_i8().into()),
        FieldType::UInt8 | FieldType::FlightMode => Value::UInt(buffer.get_u8().into()),
        FieldType::Int16 | FieldType::Int16Centi => Value::Int(buffer.get_i16_le().into()),
        FieldType::UInt16 | FieldType::UInt16Centi => Value::UInt(buffer.get_u16_le().into()),
        FieldType::Int32 | FieldType::Int32Centi | FieldType::LatLon => {
            Value::Int(buffer.get_i32_le().into())
        }
        FieldType::UInt32 | FieldType::UInt32Centi => Value::UInt(buffer.get_u32_le().into()),
        FieldType::Int64 => Value::Int(buffer.get_i64_le()),
        FieldType::UInt64 => Value::UInt(buffer.get_u64_le()),
        FieldType::Float32 => Value::Float(buffer.get_f32_le().into()),
        FieldType::Float64 => Value::Float(buffer.get_f64_le()),
        FieldType::Char4 => Value::Text(buffer.get_padded_str::<4>()),
        FieldType::Char16 => Value::Text(buffer.get_padded_str::<16>()),
        FieldType::Char64 => Value::Text(buffer.get_padded_str::<64>()),
        FieldType::Int16Array32 => Value::Array((0..32).map(|_| buffer.get_i16_le()).collect()),
    };

    match (field.multiplier, value.as_f64()) {
        (Some(multiplier), Some(raw)) => Value::Float(raw * multiplier),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use crate::{
        format::MessageLayout,
        options::MultiplierTable,
        record::{
            RawRecord,
            decode_values,
        },
        value::Value,
    };

    #[test]
    fn it_decodes_fields() {
        let layout = MessageLayout::from_format(0x81, "TST", "bHqfnc", "A,B,C,D,E,F").unwrap();

        let mut payload = vec![];
        payload.push(0xfe);
        payload.extend_from_slice(&0xbeefu16.to_le_bytes());
        payload.extend_from_slice(&(-5i64).to_le_bytes());
        payload.extend_from_slice(&2.5f32.to_le_bytes());
        payload.extend_from_slice(b"AB\0\0");
        payload.extend_from_slice(&(-1234i16).to_le_bytes());

        let values = decode_values(&layout, &payload);
        assert_eq!(values[0], Value::Int(-2));
        assert_eq!(values[1], Value::UInt(0xbeef));
        assert_eq!(values[2], Value::Int(-5));
        assert_eq!(values[3], Value::Float(2.5));
        assert_eq!(values[4], Value::Text("AB".to_owned()));
        assert_relative_eq!(values[5].as_f64().unwrap(), -12.34, epsilon = 1e-9);
    }

    #[test]
    fn it_applies_multipliers() {
        let mut table = MultiplierTable::default();
        table.insert("POS", "Raw", 1e-7);
        let layout = MessageLayout::from_format(0x82, "POS", "iL", "Raw,Lat")
            .unwrap()
            .with_multiplier_table(&table);

        let mut payload = vec![];
        payload.extend_from_slice(&123456789i32.to_le_bytes());
        payload.extend_from_slice(&(-353632621i32).to_le_bytes());

        let values = decode_values(&layout, &payload);
        assert_relative_eq!(values[0].as_f64().unwrap(), 12.3456789, epsilon = 1e-12);
        assert_relative_eq!(values[1].as_f64().unwrap(), -35.3632621, epsilon = 1e-12);
    }

    #[test]
    fn it_decodes_single_fields() {
        let layout = Arc::new(MessageLayout::from_format(0x83, "TST", "BQ", "I,TimeUS").unwrap());
        let mut payload = vec![7];
        payload.extend_from_slice(&1000u64.to_le_bytes());

        let record = RawRecord {
            layout,
            offset: 0,
            payload: &payload,
        };
        assert_eq!(record.field("TimeUS"), Some(Value::UInt(1000)));
        assert_eq!(record.field("Nope"), None);
        assert_eq!(record.decode().get("I"), Some(&Value::UInt(7)));
    }
}
