use std::collections::{
    HashMap,
    HashSet,
};

/// Explicit multipliers, keyed by `(type name, field name)`.
#[derive(Clone, Debug, Default)]
pub struct MultiplierTable {
    entries: HashMap<(String, String), f64>,
}

impl MultiplierTable {
    pub fn insert(&mut self, name: impl Into<String>, field: impl Into<String>, multiplier: f64) {
        self.entries.insert((name.into(), field.into()), multiplier);
    }

    pub fn get(&self, name: &str, field: &str) -> Option<f64> {
        // the tuple key forces an allocation here, but this only runs when a layout is
        // registered.
        self.entries
            .get(&(name.to_owned(), field.to_owned()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Options for a parse session.
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    only: Option<HashSet<String>>,
    multipliers: MultiplierTable,
    instance_fields: HashMap<String, Option<String>>,
    apply_declared_multipliers: bool,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only materialize these message types.
    ///
    /// Records of other types are still counted in the stats, but their
    /// fields are never decoded.
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_multiplier(
        mut self,
        name: impl Into<String>,
        field: impl Into<String>,
        multiplier: f64,
    ) -> Self {
        self.multipliers.insert(name, field, multiplier);
        self
    }

    /// Partition `name` by the values of `field`, overriding the convention
    /// table.
    pub fn with_instance_field(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.instance_fields
            .insert(name.into(), Some(field.into()));
        self
    }

    /// Store `name` in a flat table, even if it has a conventional instance
    /// field.
    pub fn without_instances(mut self, name: impl Into<String>) -> Self {
        self.instance_fields.insert(name.into(), None);
        self
    }

    /// Apply multipliers declared by `FMTU` records to integer fields that
    /// don't have one already.
    pub fn apply_declared_multipliers(mut self, enable: bool) -> Self {
        self.apply_declared_multipliers = enable;
        self
    }

    pub fn materializes(&self, name: &str) -> bool {
        self.only
            .as_ref()
            .map_or(true, |only| only.contains(name))
    }

    pub fn multipliers(&self) -> &MultiplierTable {
        &self.multipliers
    }

    /// `Some(None)` means instances were explicitly disabled for `name`.
    pub fn instance_field_override(&self, name: &str) -> Option<Option<&str>> {
        self.instance_fields
            .get(name)
            .map(|field| field.as_deref())
    }

    pub fn declared_multipliers_applied(&self) -> bool {
        self.apply_declared_multipliers
    }
}
