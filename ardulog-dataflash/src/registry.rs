//! Format registry
//!
//! Maps type codes to [`MessageLayout`]s. It starts out with the built-in
//! defaults and grows as `FMT` records are decoded. Metadata records (`FMTU`,
//! `UNIT`, `MULT`) attach units and multipliers to already known layouts.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        OnceLock,
    },
};

use crate::{
    format::{
        FMT_TYPE,
        FormatError,
        MessageLayout,
    },
    options::{
        MultiplierTable,
        ParseOptions,
    },
    record::decode_values,
    value::Value,
};

/// Unit id that marks a field as the instance discriminator.
const INSTANCE_UNIT: char = '#';

/// Multiplier ids used by ArduPilot, for logs that don't contain `MULT`
/// records.
const STANDARD_MULTIPLIERS: &[(char, f64)] = &[
    ('?', 1.0),
    ('2', 1e2),
    ('1', 1e1),
    ('0', 1.0),
    ('A', 1e-1),
    ('B', 1e-2),
    ('C', 1e-3),
    ('D', 1e-4),
    ('E', 1e-5),
    ('F', 1e-6),
    ('G', 1e-7),
    ('I', 1e-9),
    ('!', 3.6),
    ('/', 3600.0),
];

/// Layouts every log can use without defining them first.
///
/// This is shared by all parse sessions and never modified.
pub fn default_layouts() -> &'static [Arc<MessageLayout>] {
    static DEFAULTS: OnceLock<Vec<Arc<MessageLayout>>> = OnceLock::new();
    DEFAULTS.get_or_init(|| vec![Arc::new(MessageLayout::fmt())])
}

#[derive(Clone, Debug)]
pub struct Registry {
    layouts: HashMap<u8, Arc<MessageLayout>>,
    multipliers: MultiplierTable,
    apply_declared_multipliers: bool,
    unit_labels: HashMap<char, String>,
    multiplier_ids: HashMap<char, f64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(&ParseOptions::default())
    }
}

impl Registry {
    pub fn new(options: &ParseOptions) -> Self {
        let mut registry = Self {
            layouts: HashMap::new(),
            multipliers: options.multipliers().clone(),
            apply_declared_multipliers: options.declared_multipliers_applied(),
            unit_labels: HashMap::new(),
            multiplier_ids: HashMap::new(),
        };
        registry.register_default_layouts();
        registry
    }

    pub fn register_default_layouts(&mut self) {
        for layout in default_layouts() {
            self.layouts.insert(layout.type_code(), layout.clone());
        }
    }

    pub fn resolve(&self, type_code: u8) -> Option<&Arc<MessageLayout>> {
        self.layouts.get(&type_code)
    }

    pub fn layouts(&self) -> impl Iterator<Item = &Arc<MessageLayout>> {
        self.layouts.values()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Installs a layout for its type code.
    ///
    /// A layout for a type code that is already known shadows the old one for
    /// all following records. Redefining `FMT` is rejected, but logs usually
    /// start with a `FMT` record describing `FMT` itself, which is accepted.
    pub fn register(&mut self, layout: MessageLayout) -> Result<Arc<MessageLayout>, FormatError> {
        let type_code = layout.type_code();
        if type_code == FMT_TYPE {
            return match self.layouts.get(&FMT_TYPE) {
                Some(fmt) if fmt.same_definition(&layout) => Ok(fmt.clone()),
                _ => Err(FormatError::ReservedTypeCode { type_code }),
            };
        }

        let layout = layout.with_multiplier_table(&self.multipliers);

        if let Some(existing) = self.layouts.get(&type_code) {
            if existing.same_definition(&layout) {
                // keep the existing one, since it might have units attached already.
                return Ok(existing.clone());
            }
            tracing::debug!(
                type_code,
                old = existing.name(),
                new = layout.name(),
                "layout redefined"
            );
        }
        else {
            tracing::debug!(
                type_code,
                name = layout.name(),
                format = %layout.format(),
                "layout registered"
            );
        }

        let layout = Arc::new(layout);
        self.layouts.insert(type_code, layout.clone());
        Ok(layout)
    }

    /// Decodes the payload of a `FMT` record and registers the layout it
    /// defines.
    pub fn decode_format_record(
        &mut self,
        payload: &[u8],
    ) -> Result<Arc<MessageLayout>, FormatError> {
        let fmt = self
            .layouts
            .get(&FMT_TYPE)
            .cloned()
            .unwrap_or_else(|| Arc::new(MessageLayout::fmt()));
        let values = decode_values(&fmt, payload);

        let get = |field: &'static str| {
            fmt.field_index(field)
                .map(|index| &values[index])
                .ok_or(FormatError::MissingField { field })
        };

        let type_code = get("Type")?
            .as_u64()
            .and_then(|value| u8::try_from(value).ok())
            .ok_or(FormatError::MissingField { field: "Type" })?;
        let length = get("Length")?
            .as_u64()
            .ok_or(FormatError::MissingField { field: "Length" })? as usize;
        let name = get("Name")?.as_str().unwrap_or_default();
        let format = get("Format")?.as_str().unwrap_or_default();
        let columns = get("Columns")?.as_str().unwrap_or_default();

        let layout = MessageLayout::new(type_code, name, length, format, columns)?;
        self.register(layout)
    }

    /// Updates the registry from a decoded record, if it's a record that
    /// describes other records.
    ///
    /// Returns an error if a `FMT` record was rejected.
    pub fn observe(&mut self, layout: &MessageLayout, payload: &[u8]) -> Result<(), FormatError> {
        if layout.type_code() == FMT_TYPE {
            self.decode_format_record(payload)?;
            return Ok(());
        }

        match layout.name() {
            "UNIT" => {
                let values = decode_values(layout, payload);
                if let (Some(id), Some(label)) = (
                    field_value(layout, &values, "Id").and_then(value_to_char),
                    field_value(layout, &values, "Label").and_then(Value::as_str),
                ) {
                    self.unit_labels.insert(id, label.to_owned());
                }
            }
            "MULT" => {
                let values = decode_values(layout, payload);
                if let (Some(id), Some(multiplier)) = (
                    field_value(layout, &values, "Id").and_then(value_to_char),
                    field_value(layout, &values, "Mult").and_then(Value::as_f64),
                ) {
                    self.multiplier_ids.insert(id, multiplier);
                }
            }
            "FMTU" => {
                let values = decode_values(layout, payload);
                let type_code = field_value(layout, &values, "FmtType")
                    .and_then(Value::as_u64)
                    .and_then(|value| u8::try_from(value).ok());
                let unit_ids = field_value(layout, &values, "UnitIds").and_then(Value::as_str);
                let mult_ids = field_value(layout, &values, "MultIds").and_then(Value::as_str);
                if let (Some(type_code), Some(unit_ids), Some(mult_ids)) =
                    (type_code, unit_ids, mult_ids)
                {
                    self.attach_units(type_code, unit_ids, mult_ids);
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Attaches units and declared multipliers to the layout of `type_code`.
    ///
    /// This installs a new layout version, so records decoded before keep the
    /// old one.
    fn attach_units(&mut self, type_code: u8, unit_ids: &str, mult_ids: &str) {
        let Some(existing) = self.layouts.get(&type_code)
        else {
            tracing::trace!(type_code, "FMTU for unknown type");
            return;
        };

        let mut layout = MessageLayout::clone(existing);
        let mut instance_field = None;

        let mut unit_ids = unit_ids.chars();
        let mut mult_ids = mult_ids.chars();

        for (index, field) in layout.fields_mut().iter_mut().enumerate() {
            let unit_id = unit_ids.next();
            let mult_id = mult_ids.next();

            if unit_id == Some(INSTANCE_UNIT) {
                instance_field = Some(index);
            }

            field.unit = unit_id.and_then(|id| self.unit_labels.get(&id).cloned());
            field.declared_multiplier = mult_id.and_then(|id| self.multiplier_for_id(id));

            if self.apply_declared_multipliers
                && field.multiplier.is_none()
                && field.field_type.is_integer()
            {
                field.multiplier = field
                    .declared_multiplier
                    .filter(|multiplier| *multiplier != 1.0);
            }
        }

        let layout = layout.with_instance_field(instance_field);
        if *existing.as_ref() != layout {
            self.layouts.insert(type_code, Arc::new(layout));
        }
    }

    fn multiplier_for_id(&self, id: char) -> Option<f64> {
        // '-' means there is no multiplier
        if id == '-' {
            return None;
        }
        self.multiplier_ids.get(&id).copied().or_else(|| {
            STANDARD_MULTIPLIERS
                .iter()
                .find(|(standard_id, _)| *standard_id == id)
                .map(|(_, multiplier)| *multiplier)
        })
    }
}

fn field_value<'v>(layout: &MessageLayout, values: &'v [Value], name: &str) -> Option<&'v Value> {
    layout.field_index(name).map(|index| &values[index])
}

/// `UNIT` and `MULT` ids are logged as `int8` holding a character.
fn value_to_char(value: &Value) -> Option<char> {
    match value {
        Value::Text(text) => text.chars().next(),
        value => {
            value
                .as_u64()
                .and_then(|value| u8::try_from(value).ok())
                .map(char::from)
        }
    }
}
