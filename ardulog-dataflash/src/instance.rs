//! Instances
//!
//! Some message types are logged by several sources at once, e.g. one `BAT`
//! message per battery monitor. These carry a discriminator field, and their
//! records are stored in one table per discriminator value.

use std::{
    fmt::Display,
    str::FromStr,
};

use serde::Serialize;

use crate::value::Value;

/// Conventional instance fields. The first candidate that is a column of the
/// type's layout is used.
const CONVENTIONS: &[(&str, &[&str])] = &[
    ("BAT", &["Inst", "Instance"]),
    ("BCL", &["Instance"]),
    ("GPS", &["I", "Instance"]),
    ("GPA", &["I", "Instance"]),
    ("IMU", &["I"]),
    ("ACC", &["I"]),
    ("GYR", &["I"]),
    ("BARO", &["I"]),
    ("MAG", &["I"]),
    ("ESC", &["Instance"]),
    ("RFND", &["Instance", "I"]),
    ("ARSP", &["I", "Instance"]),
    ("VIBE", &["IMU"]),
    ("XKF1", &["C"]),
    ("XKF2", &["C"]),
    ("XKF3", &["C"]),
    ("XKF4", &["C"]),
    ("XKF5", &["C"]),
    ("XKQ", &["C"]),
    ("XKV1", &["C"]),
    ("XKV2", &["C"]),
    ("XKFS", &["C"]),
    ("XKT", &["C"]),
    ("XKY0", &["C"]),
    ("XKY1", &["C"]),
    ("NKF1", &["C"]),
    ("NKF2", &["C"]),
    ("NKF3", &["C"]),
    ("NKF4", &["C"]),
    ("NKF5", &["C"]),
    ("NKQ", &["C"]),
];

/// Candidate instance fields for a message type, by convention.
pub fn conventional_instance_fields(name: &str) -> &'static [&'static str] {
    CONVENTIONS
        .iter()
        .find(|(type_name, _)| *type_name == name)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Value of an instance discriminator field.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum InstanceKey {
    Int(i64),
    Text(String),
}

impl From<&Value> for InstanceKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Text(text) => Self::Text(text.clone()),
            value => {
                value
                    .as_i64()
                    .map(Self::Int)
                    .unwrap_or_else(|| Self::Text(value.to_string()))
            }
        }
    }
}

impl From<i64> for InstanceKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for InstanceKey {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u8> for InstanceKey {
    fn from(value: u8) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for InstanceKey {
    fn from(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| Self::Text(value.to_owned()))
    }
}

impl From<String> for InstanceKey {
    fn from(value: String) -> Self {
        value.as_str().into()
    }
}

impl FromStr for InstanceKey {
    type Err = std::convert::Infallible;

    /// Integers parse to [`InstanceKey::Int`], anything else is kept as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.trim()
            .parse::<i64>()
            .map(Self::Int)
            .unwrap_or_else(|_| Self::Text(s.to_owned())))
    }
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceKey::Int(value) => write!(f, "{value}"),
            InstanceKey::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Splits `NAME[key]` into the name and instance key.
pub fn split_instance_name(name: &str) -> (&str, Option<InstanceKey>) {
    if let Some(stripped) = name.strip_suffix(']') {
        if let Some((base, key)) = stripped.split_once('[') {
            if !base.is_empty() {
                return (base, Some(key.into()));
            }
        }
    }
    (name, None)
}

#[cfg(test)]
mod tests {
    use crate::{
        instance::{
            InstanceKey,
            conventional_instance_fields,
            split_instance_name,
        },
        value::Value,
    };

    #[test]
    fn it_splits_instance_names() {
        assert_eq!(
            split_instance_name("BAT[1]"),
            ("BAT", Some(InstanceKey::Int(1)))
        );
        assert_eq!(split_instance_name("BAT"), ("BAT", None));
        assert_eq!(split_instance_name("[1]"), ("[1]", None));
    }

    #[test]
    fn it_converts_values_to_keys() {
        assert_eq!(InstanceKey::from(&Value::UInt(3)), InstanceKey::Int(3));
        assert_eq!(InstanceKey::from(&Value::Float(2.0)), InstanceKey::Int(2));
        assert_eq!(
            InstanceKey::from(&Value::Text("A".to_owned())),
            InstanceKey::Text("A".to_owned())
        );
    }

    #[test]
    fn it_orders_keys() {
        let mut keys = vec![InstanceKey::Int(2), InstanceKey::Int(0), InstanceKey::Int(1)];
        keys.sort();
        assert_eq!(keys[0], InstanceKey::Int(0));
    }

    #[test]
    fn it_knows_conventions() {
        assert_eq!(conventional_instance_fields("BAT"), ["Inst", "Instance"]);
        assert!(conventional_instance_fields("ATT").is_empty());
    }
}
