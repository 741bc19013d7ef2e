//! Decoded logs
//!
//! A [`Log`] holds the decoded records of one log file as columnar tables,
//! one per message type (or one per instance of a message type). It's built
//! in a single pass over the input and is read-only afterwards.

use std::{
    collections::BTreeMap,
    sync::Arc,
};

use serde::{
    Serialize,
    ser::SerializeMap,
};

use crate::{
    decoder::{
        Diagnostics,
        Records,
    },
    format::{
        Field,
        MessageLayout,
    },
    instance::{
        InstanceKey,
        conventional_instance_fields,
        split_instance_name,
    },
    options::ParseOptions,
    record::{
        RawRecord,
        Record,
    },
    value::{
        Column,
        Value,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unknown message type: {name}")]
    UnknownType { name: String },

    #[error("message type {name} has no field {field}")]
    UnknownField { name: String, field: String },

    #[error("message type {name} has no instance {instance}")]
    UnknownInstance { name: String, instance: InstanceKey },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("input is empty")]
    Empty,

    #[error("no records found in {num_bytes} bytes of input")]
    Unparseable { num_bytes: u64 },
}

/// Columns of one message type (or instance), all of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|index| &self.columns[index])
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.column_names().zip(&self.columns)
    }

    /// Returns one row as `(field, value)` pairs.
    pub fn row(&self, index: usize) -> Option<Vec<(&str, Value)>> {
        (index < self.num_rows).then(|| {
            self.columns()
                .filter_map(|(name, column)| column.get(index).map(|value| (name, value)))
                .collect()
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|column| column == name)
    }

    /// Appends one row.
    ///
    /// Columns that the row doesn't define are filled. Columns that appear for
    /// the first time are backfilled for all previous rows. Numeric columns are
    /// widened if a redefinition changed the field's type, but a value that
    /// switched between text and numbers is stored as the fill value.
    fn push_row(&mut self, fields: &[Field], values: &[Value]) {
        let mut touched = vec![false; self.columns.len()];

        for (field, value) in fields.iter().zip(values) {
            let index = match self.index_of(&field.name) {
                Some(index) => index,
                None => {
                    self.names.push(field.name.clone());
                    self.columns
                        .push(Column::filled(value.kind(), self.num_rows));
                    touched.push(false);
                    self.columns.len() - 1
                }
            };

            // duplicate column names keep the first value
            if !touched[index] {
                touched[index] = true;
                self.columns[index].push(value.clone());
            }
        }

        for (column, touched) in self.columns.iter_mut().zip(touched) {
            if !touched {
                column.push_fill();
            }
        }

        self.num_rows += 1;
    }
}

impl Serialize for Table {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, column) in self.columns() {
            map.serialize_entry(name, column)?;
        }
        map.end()
    }
}

/// Decoded data of one message type.
#[derive(Clone, Debug)]
struct MessageData {
    /// Most recent layout a record of this type was decoded with.
    layout: Arc<MessageLayout>,

    /// Fixed by the first stored record.
    instance_field: Option<String>,

    /// Flat types only use the `None` key.
    tables: BTreeMap<Option<InstanceKey>, Table>,
}

impl MessageData {
    fn new(layout: Arc<MessageLayout>, options: &ParseOptions) -> Self {
        let instance_field = select_instance_field(&layout, options);
        if let Some(field) = &instance_field {
            tracing::debug!(name = layout.name(), %field, "partitioning by instance");
        }
        Self {
            layout,
            instance_field,
            tables: BTreeMap::new(),
        }
    }

    fn push(&mut self, record: &Record) {
        let key = self.instance_field.as_ref().and_then(|field| {
            // a redefined layout might not have the field anymore, these rows end up in the
            // `None` table.
            record.get(field).map(InstanceKey::from)
        });

        self.layout = record.layout().clone();
        self.tables
            .entry(key)
            .or_default()
            .push_row(record.layout().fields(), record.values());
    }

    /// The table of the lowest instance. Rows without the instance field only
    /// count if there is no instance at all.
    fn first_table(&self) -> Option<&Table> {
        if self.instance_field.is_some() {
            let instanced = self
                .tables
                .iter()
                .find_map(|(key, table)| key.as_ref().map(|_| table));
            if instanced.is_some() {
                return instanced;
            }
        }
        self.tables.values().next()
    }

    fn instances(&self) -> impl Iterator<Item = &InstanceKey> {
        self.tables.keys().flatten()
    }
}

fn select_instance_field(layout: &MessageLayout, options: &ParseOptions) -> Option<String> {
    let name = layout.name();
    match options.instance_field_override(name) {
        Some(Some(field)) => {
            if layout.field(field).is_none() {
                tracing::warn!(name, field, "instance field override is not a column");
                return None;
            }
            Some(field.to_owned())
        }
        Some(None) => None,
        None => {
            conventional_instance_fields(name)
                .iter()
                .find(|field| layout.field(field).is_some())
                .map(|field| (*field).to_owned())
                .or_else(|| layout.instance_field().map(|field| field.name.clone()))
        }
    }
}

/// Record counts and sizes of one message type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    /// Number of records.
    pub count: u64,

    /// Total size of all records in bytes.
    pub size: u64,

    /// Size of one record in bytes.
    pub msg_size: usize,
}

/// Describes a decoded message type.
#[derive(Clone, Debug, Serialize)]
pub struct MessageType<'a> {
    pub name: &'a str,
    pub columns: Vec<ColumnInfo<'a>>,
    pub instance_field: Option<&'a str>,
    pub instances: Vec<&'a InstanceKey>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnInfo<'a> {
    pub name: &'a str,
    pub format: char,
    pub unit: Option<&'a str>,
    pub multiplier: Option<f64>,
}

/// Builds a [`Log`] from framed records.
#[derive(Debug)]
pub struct LogBuilder {
    options: ParseOptions,
    messages: BTreeMap<String, MessageData>,
    stats: BTreeMap<String, MessageStats>,
}

impl LogBuilder {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            messages: BTreeMap::new(),
            stats: BTreeMap::new(),
        }
    }

    /// Adds a framed record. Its fields are only decoded if the type is
    /// materialized.
    pub fn push(&mut self, record: &RawRecord<'_>) {
        self.count(record.layout());
        if self.options.materializes(record.name()) {
            self.store(&record.decode());
        }
    }

    /// Adds an already decoded record.
    pub fn push_record(&mut self, record: &Record) {
        self.count(record.layout());
        if self.options.materializes(record.name()) {
            self.store(record);
        }
    }

    fn count(&mut self, layout: &MessageLayout) {
        let stats = self.stats.entry(layout.name().to_owned()).or_default();
        stats.count += 1;
        stats.size += layout.length() as u64;
        stats.msg_size = layout.length();
    }

    fn store(&mut self, record: &Record) {
        if !self.messages.contains_key(record.name()) {
            self.messages.insert(
                record.name().to_owned(),
                MessageData::new(record.layout().clone(), &self.options),
            );
        }
        if let Some(data) = self.messages.get_mut(record.name()) {
            data.push(record);
        }
    }

    pub fn finish(self, diagnostics: Diagnostics) -> Log {
        tracing::info!(
            num_bytes = diagnostics.num_bytes,
            num_records = diagnostics.num_records,
            num_types = self.messages.len(),
            skipped_bytes = diagnostics.skipped_bytes,
            truncated_bytes = diagnostics.truncated_bytes,
            "log decoded"
        );

        Log {
            messages: self.messages,
            stats: self.stats,
            diagnostics,
        }
    }
}

/// A decoded log.
#[derive(Clone, Debug)]
pub struct Log {
    messages: BTreeMap<String, MessageData>,
    stats: BTreeMap<String, MessageStats>,
    diagnostics: Diagnostics,
}

impl Log {
    /// Decodes a complete log with default options.
    ///
    /// Damaged records are skipped. This only fails if no record at all could
    /// be decoded.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with(data, &ParseOptions::default())
    }

    pub fn parse_with(data: &[u8], options: &ParseOptions) -> Result<Self, ParseError> {
        Self::parse_lenient(data, options).check()
    }

    /// Like [`parse_with`][Self::parse_with], but returns an empty log for
    /// input without records.
    pub fn parse_lenient(data: &[u8], options: &ParseOptions) -> Self {
        let mut builder = LogBuilder::new(options.clone());
        let mut records = Records::new(data, options);
        for record in records.by_ref() {
            builder.push(&record);
        }
        builder.finish(records.into_decoder().into_diagnostics())
    }

    /// Fails if no records were decoded.
    pub fn check(self) -> Result<Self, ParseError> {
        if self.diagnostics.num_records > 0 {
            Ok(self)
        }
        else if self.diagnostics.num_bytes == 0 {
            Err(ParseError::Empty)
        }
        else {
            Err(ParseError::Unparseable {
                num_bytes: self.diagnostics.num_bytes,
            })
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Names of all message types with at least one stored record.
    pub fn available_types(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }

    /// Instance keys of an instance-partitioned type, lowest first.
    ///
    /// Returns `None` if the type is unknown or isn't partitioned.
    pub fn instances(&self, name: &str) -> Option<Vec<&InstanceKey>> {
        let data = self.messages.get(name)?;
        if data.instance_field.is_none() {
            return None;
        }
        Some(data.instances().collect())
    }

    /// Returns the table of a message type.
    ///
    /// For instance-partitioned types this is the table of the first (lowest)
    /// instance. Use `NAME[key]` or [`table_instance`][Self::table_instance]
    /// to select an instance.
    pub fn table(&self, name: &str) -> Result<&Table, QueryError> {
        match split_instance_name(name) {
            (base, Some(key)) if !self.messages.contains_key(name) => {
                self.table_instance(base, key)
            }
            _ => {
                self.message(name)?
                    .first_table()
                    .ok_or_else(|| QueryError::UnknownType { name: name.to_owned() })
            }
        }
    }

    pub fn table_instance(
        &self,
        name: &str,
        instance: impl Into<InstanceKey>,
    ) -> Result<&Table, QueryError> {
        let instance = instance.into();
        let data = self.message(name)?;
        data.instance_field
            .as_ref()
            .and_then(|_| data.tables.get(&Some(instance.clone())))
            .ok_or_else(|| {
                QueryError::UnknownInstance {
                    name: name.to_owned(),
                    instance,
                }
            })
    }

    /// Returns all values of a field, in log order.
    ///
    /// Same instance selection as [`table`][Self::table].
    pub fn get(&self, name: &str, field: &str) -> Result<&Column, QueryError> {
        column(self.table(name)?, name, field)
    }

    pub fn get_instance(
        &self,
        name: &str,
        instance: impl Into<InstanceKey>,
        field: &str,
    ) -> Result<&Column, QueryError> {
        column(self.table_instance(name, instance)?, name, field)
    }

    pub fn message_type(&self, name: &str) -> Result<MessageType<'_>, QueryError> {
        let data = self.message(name)?;
        let table = data
            .first_table()
            .ok_or_else(|| QueryError::UnknownType { name: name.to_owned() })?;

        let columns = table
            .column_names()
            .map(|column| {
                let field = data.layout.field(column);
                ColumnInfo {
                    name: column,
                    format: field.map_or('?', |field| field.field_type.code() as char),
                    unit: field.and_then(|field| field.unit.as_deref()),
                    multiplier: field.and_then(|field| field.multiplier),
                }
            })
            .collect();

        Ok(MessageType {
            name: data.layout.name(),
            columns,
            instance_field: data.instance_field.as_deref(),
            instances: data.instances().collect(),
        })
    }

    /// Record counts of every framed message type, including types that
    /// weren't materialized.
    pub fn stats(&self) -> &BTreeMap<String, MessageStats> {
        &self.stats
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn message(&self, name: &str) -> Result<&MessageData, QueryError> {
        self.messages
            .get(name)
            .ok_or_else(|| QueryError::UnknownType { name: name.to_owned() })
    }
}

fn column<'a>(table: &'a Table, name: &str, field: &str) -> Result<&'a Column, QueryError> {
    table.column(field).ok_or_else(|| {
        QueryError::UnknownField {
            name: name.to_owned(),
            field: field.to_owned(),
        }
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{
        instance::InstanceKey,
        log::{
            Log,
            ParseError,
            QueryError,
        },
        options::ParseOptions,
        value::{
            Column,
            Value,
        },
        writer::LogWriter,
    };

    fn tst_log() -> Vec<u8> {
        let mut writer = LogWriter::new();
        writer
            .write_format(0x81, "TST", "Qf", "TimeUS,Value")
            .unwrap();
        writer
            .write_record(0x81, &[Value::UInt(1000), Value::Float(2.5)])
            .unwrap();
        writer
            .write_record(0x81, &[Value::UInt(2000), Value::Float(-1.25)])
            .unwrap();
        writer.into_bytes()
    }

    fn bat_log() -> Vec<u8> {
        let mut writer = LogWriter::new();
        writer
            .write_format(0x82, "BAT", "QBf", "TimeUS,Inst,Volt")
            .unwrap();
        for (i, inst) in [0u64, 0, 1, 0, 1].into_iter().enumerate() {
            writer
                .write_record(
                    0x82,
                    &[
                        Value::UInt(i as u64 * 100),
                        Value::UInt(inst),
                        Value::Float(12.0 + i as f64),
                    ],
                )
                .unwrap();
        }
        writer.into_bytes()
    }

    #[test]
    fn it_decodes_a_log() {
        let log = Log::parse(&tst_log()).unwrap();
        assert_eq!(
            log.get("TST", "TimeUS").unwrap(),
            &Column::UInt(vec![1000, 2000])
        );
        assert_eq!(
            log.get("TST", "Value").unwrap(),
            &Column::Float(vec![2.5, -1.25])
        );
        assert_eq!(log.stats()["TST"].count, 2);
        assert_eq!(log.stats()["TST"].msg_size, 15);
        assert_eq!(log.stats()["TST"].size, 30);
        assert_eq!(log.available_types().collect::<Vec<_>>(), ["FMT", "TST"]);
    }

    #[test]
    fn it_partitions_instances() {
        let log = Log::parse(&bat_log()).unwrap();
        assert_eq!(
            log.instances("BAT").unwrap(),
            [&InstanceKey::Int(0), &InstanceKey::Int(1)]
        );
        assert_eq!(
            log.get_instance("BAT", 0, "TimeUS").unwrap(),
            &Column::UInt(vec![0, 100, 300])
        );
        assert_eq!(
            log.get_instance("BAT", 1, "TimeUS").unwrap(),
            &Column::UInt(vec![200, 400])
        );
        assert_eq!(log.stats()["BAT"].count, 5);
    }

    #[test]
    fn it_defaults_to_the_first_instance() {
        let log = Log::parse(&bat_log()).unwrap();
        assert_eq!(log.get("BAT", "TimeUS").unwrap().len(), 3);
        assert_eq!(log.get("BAT[1]", "TimeUS").unwrap().len(), 2);
        assert!(matches!(
            log.get_instance("BAT", 7, "TimeUS"),
            Err(QueryError::UnknownInstance { .. })
        ));
        assert!(log.instances("TST").is_none());
    }

    #[test]
    fn it_can_disable_instances() {
        let options = ParseOptions::new().without_instances("BAT");
        let log = Log::parse_with(&bat_log(), &options).unwrap();
        assert!(log.instances("BAT").is_none());
        assert_eq!(log.get("BAT", "Inst").unwrap(), &Column::UInt(vec![0, 0, 1, 0, 1]));
    }

    #[test]
    fn it_reports_unknown_names() {
        let log = Log::parse(&tst_log()).unwrap();
        assert!(matches!(
            log.get("NOPE", "TimeUS"),
            Err(QueryError::UnknownType { .. })
        ));
        assert!(matches!(
            log.get("TST", "Nope"),
            Err(QueryError::UnknownField { .. })
        ));
    }

    #[test]
    fn it_tolerates_truncated_tails() {
        let mut data = tst_log();
        data.pop();
        let log = Log::parse(&data).unwrap();
        assert_eq!(
            log.get("TST", "TimeUS").unwrap(),
            &Column::UInt(vec![1000])
        );
        assert_eq!(log.diagnostics().truncated_bytes, 14);
    }

    #[test]
    fn it_survives_unknown_types() {
        let data = tst_log();
        let (head, tail) = data.split_at(89 + 15);
        let mut corrupted = head.to_vec();
        corrupted.extend_from_slice(&[0xa3, 0x95, 0xee, 1, 2, 3, 4]);
        corrupted.extend_from_slice(tail);

        let log = Log::parse(&corrupted).unwrap();
        assert_eq!(
            log.get("TST", "Value").unwrap(),
            &Column::Float(vec![2.5, -1.25])
        );
        assert_eq!(log.diagnostics().unknown_types.get(&0xee), Some(&1));
    }

    #[test]
    fn it_fails_on_empty_input() {
        assert!(matches!(Log::parse(&[]), Err(ParseError::Empty)));
        assert!(matches!(
            Log::parse(&[0x42; 100]),
            Err(ParseError::Unparseable { num_bytes: 100 })
        ));

        let log = Log::parse_lenient(&[0x42; 100], &ParseOptions::default());
        assert!(log.is_empty());
        assert_eq!(log.available_types().count(), 0);
    }

    #[test]
    fn it_only_materializes_selected_types() {
        let mut data = tst_log();
        data.extend_from_slice(&bat_log());

        let options = ParseOptions::new().only(["BAT"]);
        let log = Log::parse_with(&data, &options).unwrap();
        assert_eq!(log.available_types().collect::<Vec<_>>(), ["BAT"]);
        assert_eq!(log.stats()["TST"].count, 2);
        assert_eq!(log.get("BAT", "Volt").unwrap().len(), 3);
    }

    #[test]
    fn it_keeps_history_on_redefinition() {
        let mut writer = LogWriter::new();
        writer.write_format(0x81, "TST", "Q", "TimeUS").unwrap();
        writer.write_record(0x81, &[Value::UInt(1)]).unwrap();
        writer
            .write_format(0x81, "TST", "Qh", "TimeUS,Extra")
            .unwrap();
        writer
            .write_record(0x81, &[Value::UInt(2), Value::Int(-3)])
            .unwrap();

        let log = Log::parse(&writer.into_bytes()).unwrap();
        let table = log.table("TST").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("TimeUS").unwrap(), &Column::UInt(vec![1, 2]));
        assert_eq!(table.column("Extra").unwrap(), &Column::Int(vec![0, -3]));
    }

    #[test]
    fn it_skips_malformed_formats() {
        let mut writer = LogWriter::new();
        writer
            .write_format_unchecked(0x81, "TST", 15, "Qf", "TimeUS")
            .unwrap();
        writer.write_raw(0x81, &[0; 12]).unwrap();
        writer.write_format(0x82, "OK", "B", "A").unwrap();
        writer.write_record(0x82, &[Value::UInt(9)]).unwrap();

        let log = Log::parse(&writer.into_bytes()).unwrap();
        assert!(!log.contains("TST"));
        assert_eq!(log.get("OK", "A").unwrap(), &Column::UInt(vec![9]));
        assert_eq!(log.diagnostics().rejected_formats, 1);
    }

    #[test]
    fn it_accepts_the_fmt_self_description() {
        let mut writer = LogWriter::new();
        writer
            .write_format_unchecked(
                0x80,
                "FMT",
                89,
                "BBnNZ",
                "Type,Length,Name,Format,Columns",
            )
            .unwrap();
        writer
            .write_format(0x81, "TST", "Qf", "TimeUS,Value")
            .unwrap();
        writer
            .write_record(0x81, &[Value::UInt(1000), Value::Float(2.5)])
            .unwrap();

        let log = Log::parse(&writer.into_bytes()).unwrap();
        assert_eq!(log.diagnostics().rejected_formats, 0);
        assert!(log.diagnostics().is_clean());
        assert_eq!(log.get("TST", "TimeUS").unwrap(), &Column::UInt(vec![1000]));
        assert_eq!(log.stats()["FMT"].count, 2);
    }

    #[test]
    fn it_keeps_values_when_signedness_changes() {
        let mut writer = LogWriter::new();
        writer.write_format(0x81, "TST", "QB", "TimeUS,X").unwrap();
        writer
            .write_record(0x81, &[Value::UInt(1), Value::UInt(5)])
            .unwrap();
        writer.write_format(0x81, "TST", "Qb", "TimeUS,X").unwrap();
        writer
            .write_record(0x81, &[Value::UInt(2), Value::Int(-1)])
            .unwrap();

        let log = Log::parse(&writer.into_bytes()).unwrap();
        assert_eq!(log.get("TST", "X").unwrap(), &Column::Int(vec![5, -1]));
    }

    #[test]
    fn it_prefers_instances_over_rows_without_the_instance_field() {
        let mut writer = LogWriter::new();
        writer
            .write_format(0x82, "BAT", "QBf", "TimeUS,Inst,Volt")
            .unwrap();
        writer
            .write_record(0x82, &[Value::UInt(0), Value::UInt(1), Value::Float(12.0)])
            .unwrap();
        writer.write_format(0x82, "BAT", "Qf", "TimeUS,Volt").unwrap();
        writer
            .write_record(0x82, &[Value::UInt(100), Value::Float(11.5)])
            .unwrap();

        let log = Log::parse(&writer.into_bytes()).unwrap();
        assert_eq!(log.instances("BAT").unwrap(), [&InstanceKey::Int(1)]);
        assert_eq!(log.get("BAT", "TimeUS").unwrap(), &Column::UInt(vec![0]));
        assert_eq!(log.message_type("BAT").unwrap().columns.len(), 3);
    }

    /// `RPM` with units and multipliers declared through `UNIT`, `MULT` and
    /// `FMTU`, and `Inst` marked as instance field.
    fn rpm_log() -> Vec<u8> {
        let mut writer = LogWriter::new();
        writer
            .write_format(0x81, "UNIT", "QbZ", "TimeUS,Id,Label")
            .unwrap();
        writer
            .write_format(0x82, "MULT", "Qbd", "TimeUS,Id,Mult")
            .unwrap();
        writer
            .write_format(0x83, "FMTU", "QBNN", "TimeUS,FmtType,UnitIds,MultIds")
            .unwrap();
        writer
            .write_format(0x84, "RPM", "QBi", "TimeUS,Inst,Rate")
            .unwrap();

        for (id, label) in [('s', "s"), ('#', "instance"), ('q', "rpm")] {
            writer
                .write_record(
                    0x81,
                    &[
                        Value::UInt(0),
                        Value::Int(id as i64),
                        Value::Text(label.to_owned()),
                    ],
                )
                .unwrap();
        }
        for (id, multiplier) in [('F', 1e-6), ('B', 1e-2)] {
            writer
                .write_record(
                    0x82,
                    &[Value::UInt(0), Value::Int(id as i64), Value::Float(multiplier)],
                )
                .unwrap();
        }
        writer
            .write_record(
                0x83,
                &[
                    Value::UInt(0),
                    Value::UInt(0x84),
                    Value::Text("s#q".to_owned()),
                    Value::Text("F-B".to_owned()),
                ],
            )
            .unwrap();

        for (time, inst, rate) in [(0u64, 0u64, 1000i64), (1, 1, 2000), (2, 0, 3000)] {
            writer
                .write_record(
                    0x84,
                    &[Value::UInt(time), Value::UInt(inst), Value::Int(rate)],
                )
                .unwrap();
        }
        writer.into_bytes()
    }

    #[test]
    fn it_selects_instance_fields_from_units() {
        let log = Log::parse(&rpm_log()).unwrap();
        assert_eq!(
            log.instances("RPM").unwrap(),
            [&InstanceKey::Int(0), &InstanceKey::Int(1)]
        );
        assert_eq!(
            log.get_instance("RPM", 1, "TimeUS").unwrap(),
            &Column::UInt(vec![1])
        );
        assert_eq!(log.message_type("RPM").unwrap().instance_field, Some("Inst"));
    }

    #[test]
    fn it_describes_units() {
        let log = Log::parse(&rpm_log()).unwrap();
        let message_type = log.message_type("RPM").unwrap();
        let units = message_type
            .columns
            .iter()
            .map(|column| (column.name, column.unit))
            .collect::<Vec<_>>();
        assert_eq!(
            units,
            [
                ("TimeUS", Some("s")),
                ("Inst", Some("instance")),
                ("Rate", Some("rpm"))
            ]
        );
        assert_eq!(message_type.columns[2].multiplier, None);
    }

    #[test]
    fn it_keeps_declared_multipliers_informative() {
        let log = Log::parse(&rpm_log()).unwrap();
        assert_eq!(
            log.get("RPM", "Rate").unwrap(),
            &Column::Int(vec![1000, 3000])
        );

        let options = ParseOptions::new().apply_declared_multipliers(true);
        let log = Log::parse_with(&rpm_log(), &options).unwrap();
        let Column::Float(rates) = log.get("RPM", "Rate").unwrap()
        else {
            panic!("declared multiplier wasn't applied");
        };
        assert_eq!(rates.len(), 2);
        assert_relative_eq!(rates[0], 10.0);
        assert_relative_eq!(rates[1], 30.0);
        assert_eq!(log.message_type("RPM").unwrap().columns[2].multiplier, Some(0.01));
    }

    #[test]
    fn it_describes_message_types() {
        let log = Log::parse(&bat_log()).unwrap();
        let message_type = log.message_type("BAT").unwrap();
        assert_eq!(message_type.instance_field, Some("Inst"));
        assert_eq!(message_type.columns.len(), 3);
        assert_eq!(message_type.columns[2].format, 'f');
        assert_eq!(message_type.instances.len(), 2);
    }

    #[test]
    fn it_serializes_tables() {
        let log = Log::parse(&tst_log()).unwrap();
        let json = serde_json::to_value(log.table("TST").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"TimeUS": [1000, 2000], "Value": [2.5, -1.25]})
        );
    }
}
