//! Message layouts
//!
//! Every record in a dataflash log starts with a 3 byte header: the two sync
//! bytes `0xa3 0x95`, followed by a type code. The type code is resolved to a
//! [`MessageLayout`] which describes how to decode the rest of the record.
//!
//! Layouts are declared inside the log itself by `FMT` records. The `FMT`
//! layout is the only one that has to be known up front.
//!
//! - [ArduPilot log structure][1]
//! - [pymavlink DFReader][2]
//!
//! [1]: https://github.com/ArduPilot/ardupilot/blob/master/libraries/AP_Logger/LogStructure.h
//! [2]: https://github.com/ArduPilot/pymavlink/blob/master/DFReader.py

use std::fmt::Debug;

use crate::options::MultiplierTable;

/// Sync bytes every record starts with.
pub const HEADER_MAGIC: [u8; 2] = [0xa3, 0x95];

/// Length of the record header (sync bytes + type code).
pub const HEADER_LENGTH: usize = 3;

/// Type code of `FMT` records. This can't be redefined by a log.
pub const FMT_TYPE: u8 = 0x80;

/// Length of a `FMT` record, including the header.
pub const FMT_LENGTH: usize = 89;

pub const FMT_NAME: &str = "FMT";
pub const FMT_FORMAT: &str = "BBnNZ";
pub const FMT_COLUMNS: &str = "Type,Length,Name,Format,Columns";

/// Primitive field type, identified by a single format character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `b`
    Int8,
    /// `B`
    UInt8,
    /// `M`, stored like `B`
    FlightMode,
    /// `h`
    Int16,
    /// `H`
    UInt16,
    /// `i`
    Int32,
    /// `I`
    UInt32,
    /// `q`
    Int64,
    /// `Q`
    UInt64,
    /// `f`
    Float32,
    /// `d`
    Float64,
    /// `n`: `char[4]`
    Char4,
    /// `N`: `char[16]`
    Char16,
    /// `Z`: `char[64]`
    Char64,
    /// `a`: `int16_t[32]`
    Int16Array32,
    /// `c`: `int16_t * 100`
    Int16Centi,
    /// `C`: `uint16_t * 100`
    UInt16Centi,
    /// `e`: `int32_t * 100`
    Int32Centi,
    /// `E`: `uint32_t * 100`
    UInt32Centi,
    /// `L`: latitude/longitude as `int32_t * 1e7`
    LatLon,
}

impl FieldType {
    pub fn from_code(code: u8) -> Option<Self> {
        let field_type = match code {
            b'b' => Self::Int8,
            b'B' => Self::UInt8,
            b'M' => Self::FlightMode,
            b'h' => Self::Int16,
            b'H' => Self::UInt16,
            b'i' => Self::Int32,
            b'I' => Self::UInt32,
            b'q' => Self::Int64,
            b'Q' => Self::UInt64,
            b'f' => Self::Float32,
            b'd' => Self::Float64,
            b'n' => Self::Char4,
            b'N' => Self::Char16,
            b'Z' => Self::Char64,
            b'a' => Self::Int16Array32,
            b'c' => Self::Int16Centi,
            b'C' => Self::UInt16Centi,
            b'e' => Self::Int32Centi,
            b'E' => Self::UInt32Centi,
            b'L' => Self::LatLon,
            _ => return None,
        };
        Some(field_type)
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Int8 => b'b',
            Self::UInt8 => b'B',
            Self::FlightMode => b'M',
            Self::Int16 => b'h',
            Self::UInt16 => b'H',
            Self::Int32 => b'i',
            Self::UInt32 => b'I',
            Self::Int64 => b'q',
            Self::UInt64 => b'Q',
            Self::Float32 => b'f',
            Self::Float64 => b'd',
            Self::Char4 => b'n',
            Self::Char16 => b'N',
            Self::Char64 => b'Z',
            Self::Int16Array32 => b'a',
            Self::Int16Centi => b'c',
            Self::UInt16Centi => b'C',
            Self::Int32Centi => b'e',
            Self::UInt32Centi => b'E',
            Self::LatLon => b'L',
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::FlightMode => 1,
            Self::Int16 | Self::UInt16 | Self::Int16Centi | Self::UInt16Centi => 2,
            Self::Int32
            | Self::UInt32
            | Self::Float32
            | Self::Int32Centi
            | Self::UInt32Centi
            | Self::LatLon
            | Self::Char4 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
            Self::Char16 => 16,
            Self::Char64 | Self::Int16Array32 => 64,
        }
    }

    /// Scale that is implied by the format character itself.
    pub fn intrinsic_multiplier(&self) -> Option<f64> {
        match self {
            Self::Int16Centi | Self::UInt16Centi | Self::Int32Centi | Self::UInt32Centi => {
                Some(0.01)
            }
            Self::LatLon => Some(1e-7),
            _ => None,
        }
    }

    /// Whether a multiplier can be applied to values of this type.
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::Char4 | Self::Char16 | Self::Char64 | Self::Int16Array32
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_numeric() && !matches!(self, Self::Float32 | Self::Float64)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Char4 | Self::Char16 | Self::Char64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("message name is empty")]
    EmptyName,

    #[error("unknown format character {code:?} in format {format:?}")]
    UnknownFormatCode { code: char, format: String },

    #[error("format {format:?} has {num_formats} fields, but {num_columns} columns were given")]
    ColumnCountMismatch {
        format: String,
        num_formats: usize,
        num_columns: usize,
    },

    #[error("declared length {declared} doesn't match length {computed} implied by format {format:?}")]
    LengthMismatch {
        format: String,
        declared: usize,
        computed: usize,
    },

    #[error("type code {type_code:#04x} is reserved for FMT")]
    ReservedTypeCode { type_code: u8 },

    #[error("FMT record is missing field {field}")]
    MissingField { field: &'static str },
}

/// A single field of a [`MessageLayout`].
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,

    /// Applied while decoding. If this is set, the field decodes to a float.
    pub multiplier: Option<f64>,

    /// Unit label declared by `FMTU`.
    pub unit: Option<String>,

    /// Multiplier declared by `FMTU`. Informative, unless it was copied into
    /// `multiplier`.
    pub declared_multiplier: Option<f64>,
}

/// Describes how to decode one message type.
///
/// Layouts are immutable once they're registered. Changes (e.g. units
/// attached by `FMTU`) produce a new layout that is only used for records
/// following it.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageLayout {
    type_code: u8,
    name: String,
    length: usize,
    fields: Vec<Field>,
    instance_field: Option<usize>,
}

impl MessageLayout {
    /// Creates a layout from the values of a `FMT` record.
    ///
    /// `columns` is a comma-separated list of field names, `format` has one
    /// format character per field.
    pub fn new(
        type_code: u8,
        name: &str,
        length: usize,
        format: &str,
        columns: &str,
    ) -> Result<Self, FormatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FormatError::EmptyName);
        }

        let field_types = format
            .bytes()
            .map(|code| {
                FieldType::from_code(code).ok_or_else(|| {
                    FormatError::UnknownFormatCode {
                        code: code as char,
                        format: format.to_owned(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let column_names: Vec<&str> = if columns.trim().is_empty() {
            vec![]
        }
        else {
            columns.split(',').map(str::trim).collect()
        };

        if column_names.len() != field_types.len() {
            return Err(FormatError::ColumnCountMismatch {
                format: format.to_owned(),
                num_formats: field_types.len(),
                num_columns: column_names.len(),
            });
        }

        let computed = HEADER_LENGTH + field_types.iter().map(FieldType::size).sum::<usize>();
        if computed != length {
            return Err(FormatError::LengthMismatch {
                format: format.to_owned(),
                declared: length,
                computed,
            });
        }

        let fields = column_names
            .into_iter()
            .zip(field_types)
            .map(|(name, field_type)| {
                Field {
                    name: name.to_owned(),
                    field_type,
                    multiplier: field_type.intrinsic_multiplier(),
                    unit: None,
                    declared_multiplier: None,
                }
            })
            .collect();

        Ok(Self {
            type_code,
            name: name.to_owned(),
            length,
            fields,
            instance_field: None,
        })
    }

    /// Like [`new`][Self::new], but computes the length from the format.
    pub fn from_format(
        type_code: u8,
        name: &str,
        format: &str,
        columns: &str,
    ) -> Result<Self, FormatError> {
        let length = HEADER_LENGTH
            + format
                .bytes()
                .map(|code| FieldType::from_code(code).map_or(0, |field_type| field_type.size()))
                .sum::<usize>();
        Self::new(type_code, name, length, format, columns)
    }

    /// The layout of `FMT` records.
    pub fn fmt() -> Self {
        Self::new(FMT_TYPE, FMT_NAME, FMT_LENGTH, FMT_FORMAT, FMT_COLUMNS)
            .expect("built-in FMT layout is invalid")
    }

    /// Applies explicit multipliers keyed by `(type name, field name)`.
    ///
    /// These override the intrinsic multiplier of the format character.
    pub fn with_multiplier_table(mut self, table: &MultiplierTable) -> Self {
        for field in &mut self.fields {
            if let Some(multiplier) = table.get(&self.name, &field.name) {
                if field.field_type.is_numeric() {
                    field.multiplier = Some(multiplier);
                }
            }
        }
        self
    }

    pub(crate) fn with_instance_field(mut self, index: Option<usize>) -> Self {
        self.instance_field = index;
        self
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn type_code(&self) -> u8 {
        self.type_code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of a record including the header.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Length of a record excluding the header.
    pub fn payload_length(&self) -> usize {
        self.length - HEADER_LENGTH
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// The format string, e.g. `QffL`.
    pub fn format(&self) -> String {
        self.fields
            .iter()
            .map(|field| field.field_type.code() as char)
            .collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Field marked as instance by a `FMTU` record.
    pub fn instance_field(&self) -> Option<&Field> {
        self.instance_field.map(|index| &self.fields[index])
    }

    /// Whether `other` decodes bytes the same way as `self`. Unit metadata is
    /// ignored.
    pub fn same_definition(&self, other: &Self) -> bool {
        self.type_code == other.type_code
            && self.name == other.name
            && self.length == other.length
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.field_type == b.field_type)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        format::{
            FMT_LENGTH,
            FieldType,
            FormatError,
            MessageLayout,
        },
        options::MultiplierTable,
    };

    #[test]
    fn it_builds_the_fmt_layout() {
        let layout = MessageLayout::fmt();
        assert_eq!(layout.length(), FMT_LENGTH);
        assert_eq!(layout.format(), "BBnNZ");
        assert_eq!(
            layout.columns().collect::<Vec<_>>(),
            ["Type", "Length", "Name", "Format", "Columns"]
        );
    }

    #[test]
    fn it_rejects_mismatched_columns() {
        let error = MessageLayout::new(0x81, "TST", 15, "Qf", "TimeUS").unwrap_err();
        assert!(matches!(
            error,
            FormatError::ColumnCountMismatch {
                num_formats: 2,
                num_columns: 1,
                ..
            }
        ));
    }

    #[test]
    fn it_rejects_wrong_lengths() {
        let error = MessageLayout::new(0x81, "TST", 16, "Qf", "TimeUS,Value").unwrap_err();
        assert!(matches!(
            error,
            FormatError::LengthMismatch {
                declared: 16,
                computed: 15,
                ..
            }
        ));
    }

    #[test]
    fn it_rejects_unknown_format_codes() {
        let error = MessageLayout::new(0x81, "TST", 7, "Qx", "TimeUS,X").unwrap_err();
        assert!(matches!(
            error,
            FormatError::UnknownFormatCode { code: 'x', .. }
        ));
    }

    #[test]
    fn it_resolves_multipliers() {
        let mut table = MultiplierTable::default();
        table.insert("GPS", "Alt", 0.01);
        table.insert("GPS", "Status", 2.0);

        let layout = MessageLayout::from_format(0x82, "GPS", "QBLLiN", "TimeUS,Status,Lat,Lng,Alt,Name")
            .unwrap()
            .with_multiplier_table(&table);

        let multipliers = layout
            .fields()
            .iter()
            .map(|field| field.multiplier)
            .collect::<Vec<_>>();
        assert_eq!(
            multipliers,
            [None, Some(2.0), Some(1e-7), Some(1e-7), Some(0.01), None]
        );
    }

    #[test]
    fn it_knows_field_sizes() {
        for code in b"bBMhHiIqQfdnNZacCeEL" {
            let field_type = FieldType::from_code(*code).unwrap();
            assert_eq!(field_type.code(), *code);
            assert!(field_type.size() > 0);
        }
        assert_eq!(FieldType::from_code(b'a').unwrap().size(), 64);
        assert_eq!(FieldType::from_code(b'N').unwrap().size(), 16);
    }
}
