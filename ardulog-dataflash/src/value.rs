use std::fmt::{
    Debug,
    Display,
};

use serde::Serialize;

use crate::format::{
    Field,
    FieldType,
};

/// A single decoded field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Array(Vec<i16>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::UInt(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => i64::try_from(*value).ok(),
            Value::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(value) => u64::try_from(*value).ok(),
            Value::UInt(value) => Some(*value),
            Value::Float(value) if value.fract() == 0.0 && *value >= 0.0 => Some(*value as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Array(_) => ValueKind::Array,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::UInt(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(text) => write!(f, "{text}"),
            Value::Array(values) => write!(f, "{values:?}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    UInt,
    Float,
    Text,
    Array,
}

impl ValueKind {
    /// The kind a field decodes to, after its multiplier was applied.
    pub fn of_field(field: &Field) -> Self {
        if field.multiplier.is_some() {
            return Self::Float;
        }
        match field.field_type {
            FieldType::Int8
            | FieldType::Int16
            | FieldType::Int32
            | FieldType::Int64
            | FieldType::Int16Centi
            | FieldType::Int32Centi
            | FieldType::LatLon => Self::Int,
            FieldType::UInt8
            | FieldType::FlightMode
            | FieldType::UInt16
            | FieldType::UInt32
            | FieldType::UInt64
            | FieldType::UInt16Centi
            | FieldType::UInt32Centi => Self::UInt,
            FieldType::Float32 | FieldType::Float64 => Self::Float,
            FieldType::Char4 | FieldType::Char16 | FieldType::Char64 => Self::Text,
            FieldType::Int16Array32 => Self::Array,
        }
    }
}

/// All values of one field, in log order.
#[derive(Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Column {
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Array(Vec<Vec<i16>>),
}

impl Column {
    pub fn new(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Self::Int(vec![]),
            ValueKind::UInt => Self::UInt(vec![]),
            ValueKind::Float => Self::Float(vec![]),
            ValueKind::Text => Self::Text(vec![]),
            ValueKind::Array => Self::Array(vec![]),
        }
    }

    /// Creates a column with `num_rows` fill values.
    pub fn filled(kind: ValueKind, num_rows: usize) -> Self {
        let mut column = Self::new(kind);
        for _ in 0..num_rows {
            column.push_fill();
        }
        column
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Column::Int(_) => ValueKind::Int,
            Column::UInt(_) => ValueKind::UInt,
            Column::Float(_) => ValueKind::Float,
            Column::Text(_) => ValueKind::Text,
            Column::Array(_) => ValueKind::Array,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int(values) => values.len(),
            Column::UInt(values) => values.len(),
            Column::Float(values) => values.len(),
            Column::Text(values) => values.len(),
            Column::Array(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Column::Int(values) => values.get(index).copied().map(Value::Int),
            Column::UInt(values) => values.get(index).copied().map(Value::UInt),
            Column::Float(values) => values.get(index).copied().map(Value::Float),
            Column::Text(values) => values.get(index).cloned().map(Value::Text),
            Column::Array(values) => values.get(index).cloned().map(Value::Array),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    /// Converts a numeric column to floats.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::Int(values) => Some(values.iter().map(|value| *value as f64).collect()),
            Column::UInt(values) => Some(values.iter().map(|value| *value as f64).collect()),
            Column::Float(values) => Some(values.clone()),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Column::Int(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_uints(&self) -> Option<&[u64]> {
        match self {
            Column::UInt(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Column::Float(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_texts(&self) -> Option<&[String]> {
        match self {
            Column::Text(values) => Some(values),
            _ => None,
        }
    }

    /// Appends a value.
    ///
    /// If the value doesn't match the column's kind, numeric columns are
    /// widened so the value fits: an unsigned column takes a negative value by
    /// becoming signed (or float, if its values don't fit `i64`), and any
    /// integer column becomes a float column for floats and for integers out
    /// of range. Anything else appends the fill value.
    pub(crate) fn push(&mut self, value: Value) {
        self.widen_for(&value);

        match (self, value) {
            (Column::Int(values), Value::Int(value)) => values.push(value),
            (Column::UInt(values), Value::UInt(value)) => values.push(value),
            // `widen_for` made sure these fit
            (Column::Int(values), value @ Value::UInt(_)) => {
                values.push(value.as_i64().unwrap_or_default())
            }
            (Column::UInt(values), value @ Value::Int(_)) => {
                values.push(value.as_u64().unwrap_or_default())
            }
            (Column::Float(values), value @ (Value::Int(_) | Value::UInt(_) | Value::Float(_))) => {
                values.push(value.as_f64().unwrap_or(f64::NAN))
            }
            (Column::Text(values), Value::Text(value)) => values.push(value),
            (Column::Array(values), Value::Array(value)) => values.push(value),
            (column, value) => {
                tracing::debug!(
                    column = ?column.kind(),
                    value = ?value.kind(),
                    "value doesn't fit column, using fill value"
                );
                column.push_fill();
            }
        }
    }

    fn widen_for(&mut self, value: &Value) {
        match (self.kind(), value) {
            (ValueKind::Int | ValueKind::UInt, Value::Float(_)) => self.promote_to_float(),
            (ValueKind::Int, Value::UInt(value)) if i64::try_from(*value).is_err() => {
                self.promote_to_float()
            }
            (ValueKind::UInt, Value::Int(value)) if *value < 0 => self.promote_to_int(),
            _ => {}
        }
    }

    /// Appends the fill value used for rows that don't define this column.
    pub(crate) fn push_fill(&mut self) {
        match self {
            Column::Int(values) => values.push(0),
            Column::UInt(values) => values.push(0),
            Column::Float(values) => values.push(f64::NAN),
            Column::Text(values) => values.push(String::new()),
            Column::Array(values) => values.push(vec![]),
        }
    }

    fn promote_to_float(&mut self) {
        if let Some(values) = self.to_f64() {
            *self = Column::Float(values);
        }
    }

    fn promote_to_int(&mut self) {
        let Column::UInt(values) = &*self
        else {
            return;
        };
        match values
            .iter()
            .map(|value| i64::try_from(*value))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(values) => *self = Column::Int(values),
            Err(_) => self.promote_to_float(),
        }
    }
}

impl Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Column::Int(values) => f.debug_tuple("Int").field(values).finish(),
            Column::UInt(values) => f.debug_tuple("UInt").field(values).finish(),
            Column::Float(values) => f.debug_tuple("Float").field(values).finish(),
            Column::Text(values) => f.debug_tuple("Text").field(values).finish(),
            Column::Array(values) => write!(f, "Array([{} rows])", values.len()),
        }
    }
}
