//! Record encoder
//!
//! Writes records in the dataflash wire format. This is the inverse of the
//! decoder: scaled fields are divided by their multiplier and rounded.

use std::{
    collections::HashMap,
    io::Write,
    sync::Arc,
};

use byteorder::{
    LittleEndian,
    WriteBytesExt,
};

use crate::{
    format::{
        FMT_LENGTH,
        FMT_TYPE,
        Field,
        FieldType,
        FormatError,
        HEADER_MAGIC,
        MessageLayout,
    },
    options::MultiplierTable,
    value::Value,
};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("invalid format definition")]
    Format(#[from] FormatError),

    #[error("no format was written for type code {type_code:#04x}")]
    UnknownType { type_code: u8 },

    #[error("{name} has {expected} fields, but {got} values were given")]
    ValueCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("can't encode {value} as field {field}")]
    InvalidValue { field: String, value: Value },

    #[error("text for field {field} is longer than {max_length} bytes")]
    TextTooLong { field: String, max_length: usize },

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Encodes the payload of a `FMT` record.
///
/// Strings that don't fit their fields are truncated.
pub fn encode_format_payload(
    type_code: u8,
    name: &str,
    length: u8,
    format: &str,
    columns: &str,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(FMT_LENGTH - HEADER_MAGIC.len() - 1);
    payload.push(type_code);
    payload.push(length);
    put_padded(&mut payload, name.as_bytes(), 4);
    put_padded(&mut payload, format.as_bytes(), 16);
    put_padded(&mut payload, columns.as_bytes(), 64);
    payload
}

fn put_padded(buffer: &mut Vec<u8>, bytes: &[u8], width: usize) {
    let length = bytes.len().min(width);
    buffer.extend_from_slice(&bytes[..length]);
    buffer.resize(buffer.len() + width - length, 0);
}

#[derive(Debug)]
pub struct LogWriter<W = Vec<u8>> {
    writer: W,
    layouts: HashMap<u8, Arc<MessageLayout>>,
    multipliers: MultiplierTable,
}

impl LogWriter<Vec<u8>> {
    pub fn new() -> Self {
        Self::from_writer(vec![])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.writer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer
    }
}

impl Default for LogWriter<Vec<u8>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> LogWriter<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer,
            layouts: HashMap::new(),
            multipliers: MultiplierTable::default(),
        }
    }

    /// Multipliers used to encode formats written afterwards. These should
    /// match the ones the log will be decoded with.
    pub fn with_multipliers(mut self, multipliers: MultiplierTable) -> Self {
        self.multipliers = multipliers;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Writes a `FMT` record and remembers the layout for
    /// [`write_record`][Self::write_record].
    pub fn write_format(
        &mut self,
        type_code: u8,
        name: &str,
        format: &str,
        columns: &str,
    ) -> Result<Arc<MessageLayout>, EncodeError> {
        let layout = MessageLayout::from_format(type_code, name, format, columns)?
            .with_multiplier_table(&self.multipliers);
        if type_code == FMT_TYPE {
            return Err(FormatError::ReservedTypeCode { type_code }.into());
        }
        let length = u8::try_from(layout.length()).map_err(|_| {
            FormatError::LengthMismatch {
                format: format.to_owned(),
                declared: usize::from(u8::MAX),
                computed: layout.length(),
            }
        })?;

        self.write_format_unchecked(type_code, name, length, format, columns)?;

        let layout = Arc::new(layout);
        self.layouts.insert(type_code, layout.clone());
        Ok(layout)
    }

    /// Writes a `FMT` record as is, even if it's not a valid definition.
    pub fn write_format_unchecked(
        &mut self,
        type_code: u8,
        name: &str,
        length: u8,
        format: &str,
        columns: &str,
    ) -> Result<(), EncodeError> {
        let payload = encode_format_payload(type_code, name, length, format, columns);
        self.write_raw(FMT_TYPE, &payload)
    }

    /// Writes a header followed by `payload`.
    pub fn write_raw(&mut self, type_code: u8, payload: &[u8]) -> Result<(), EncodeError> {
        self.writer.write_all(&HEADER_MAGIC)?;
        self.writer.write_u8(type_code)?;
        self.writer.write_all(payload)?;
        Ok(())
    }

    /// Writes a record of a type that was defined by
    /// [`write_format`][Self::write_format].
    pub fn write_record(&mut self, type_code: u8, values: &[Value]) -> Result<(), EncodeError> {
        let layout = self
            .layouts
            .get(&type_code)
            .ok_or(EncodeError::UnknownType { type_code })?;

        if layout.fields().len() != values.len() {
            return Err(EncodeError::ValueCount {
                name: layout.name().to_owned(),
                expected: layout.fields().len(),
                got: values.len(),
            });
        }

        // encode first, so a bad value doesn't leave a partial record behind.
        let mut payload = Vec::with_capacity(layout.payload_length());
        for (field, value) in layout.fields().iter().zip(values) {
            encode_field(&mut payload, field, value)?;
        }

        self.write_raw(type_code, &payload)
    }
}

fn encode_field<W: Write>(writer: &mut W, field: &Field, value: &Value) -> Result<(), EncodeError> {
    let invalid = || {
        EncodeError::InvalidValue {
            field: field.name.clone(),
            value: value.clone(),
        }
    };

    let scaled = match (field.multiplier, value.as_f64()) {
        (Some(multiplier), Some(value)) if field.field_type.is_integer() => {
            Some(Value::Float((value / multiplier).round()))
        }
        _ => None,
    };
    let value = scaled.as_ref().unwrap_or(value);

    let int = || value.as_i64().ok_or_else(invalid);
    let uint = || value.as_u64().ok_or_else(invalid);

    match field.field_type {
        FieldType::Int8 => writer.write_i8(int()?.try_into().map_err(|_| invalid())?)?,
        FieldType::UInt8 | FieldType::FlightMode => {
            writer.write_u8(uint()?.try_into().map_err(|_| invalid())?)?
        }
        FieldType::Int16 | FieldType::Int16Centi => {
            writer.write_i16::<LittleEndian>(int()?.try_into().map_err(|_| invalid())?)?
        }
        FieldType::UInt16 | FieldType::UInt16Centi => {
            writer.write_u16::<LittleEndian>(uint()?.try_into().map_err(|_| invalid())?)?
        }
        FieldType::Int32 | FieldType::Int32Centi | FieldType::LatLon => {
            writer.write_i32::<LittleEndian>(int()?.try_into().map_err(|_| invalid())?)?
        }
        FieldType::UInt32 | FieldType::UInt32Centi => {
            writer.write_u32::<LittleEndian>(uint()?.try_into().map_err(|_| invalid())?)?
        }
        FieldType::Int64 => writer.write_i64::<LittleEndian>(int()?)?,
        FieldType::UInt64 => writer.write_u64::<LittleEndian>(uint()?)?,
        FieldType::Float32 => {
            writer.write_f32::<LittleEndian>(value.as_f64().ok_or_else(invalid)? as f32)?
        }
        FieldType::Float64 => writer.write_f64::<LittleEndian>(value.as_f64().ok_or_else(invalid)?)?,
        FieldType::Char4 | FieldType::Char16 | FieldType::Char64 => {
            let text = value.as_str().ok_or_else(invalid)?;
            let width = field.field_type.size();
            if text.len() > width {
                return Err(EncodeError::TextTooLong {
                    field: field.name.clone(),
                    max_length: width,
                });
            }
            writer.write_all(text.as_bytes())?;
            writer.write_all(&vec![0; width - text.len()])?;
        }
        FieldType::Int16Array32 => {
            let Value::Array(values) = value
            else {
                return Err(invalid());
            };
            if values.len() > 32 {
                return Err(invalid());
            }
            for value in values.iter().copied().chain(std::iter::repeat(0)).take(32) {
                writer.write_i16::<LittleEndian>(value)?;
            }
        }
    }

    Ok(())
}
