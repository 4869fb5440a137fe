//! Translation between external names (resources, record fields) and store names
//! (tables, columns).

use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// A deterministic, invertible mapping between an external and a store spelling.
pub trait NameTranslator: Send + Sync {
    /// External name -> store name (resource -> table, field -> column).
    fn to_store(&self, external: &str) -> String;

    /// Store name -> external name (table -> resource, column -> field).
    fn to_external(&self, store: &str) -> String;
}

/// `user-alert-messages` <-> `user_alert_messages`
#[derive(Debug, Default, Clone, Copy)]
pub struct HyphenUnderscore;

impl NameTranslator for HyphenUnderscore {
    fn to_store(&self, external: &str) -> String {
        external.replace('-', "_")
    }

    fn to_external(&self, store: &str) -> String {
        store.replace('_', "-")
    }
}

/// `userName` <-> `user_name`
#[derive(Debug, Default, Clone, Copy)]
pub struct CamelSnake;

impl NameTranslator for CamelSnake {
    fn to_store(&self, external: &str) -> String {
        // Only a lowercase letter followed by an uppercase one starts a new word,
        // so `ID` or `Name` at the start are kept as they are.
        let mut out = String::with_capacity(external.len() + 4);
        let mut prev: Option<char> = None;
        for c in external.chars() {
            match prev {
                Some(p) if p.is_ascii_lowercase() && c.is_ascii_uppercase() => {
                    out.push('_');
                    out.push(c.to_ascii_lowercase());
                }
                _ => out.push(c),
            }
            prev = Some(c);
        }
        out
    }

    fn to_external(&self, store: &str) -> String {
        let mut out = String::with_capacity(store.len());
        let mut chars = store.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '_' {
                if let Some(next) = chars.peek().copied() {
                    if next.is_ascii_lowercase() {
                        chars.next();
                        out.push(next.to_ascii_uppercase());
                        continue;
                    }
                }
            }
            out.push(c);
        }
        out
    }
}

/// The pair of translators a service instance is configured with.
#[derive(Clone)]
pub struct Naming {
    pub resources: Arc<dyn NameTranslator>,
    pub fields: Arc<dyn NameTranslator>,
}

impl Naming {
    pub fn new(resources: Arc<dyn NameTranslator>, fields: Arc<dyn NameTranslator>) -> Self {
        Self { resources, fields }
    }

    pub fn resource_to_table(&self, resource: &str) -> String {
        self.resources.to_store(resource)
    }

    pub fn table_to_resource(&self, table: &str) -> String {
        self.resources.to_external(table)
    }

    pub fn field_to_column(&self, field: &str) -> String {
        self.fields.to_store(field)
    }

    pub fn column_to_field(&self, column: &str) -> String {
        self.fields.to_external(column)
    }

    /// Inbound payload keys: fields -> columns.
    pub fn fields_to_columns(&self, record: JsonValue) -> JsonValue {
        translate_keys(record, |k| self.field_to_column(k))
    }

    /// Outbound row keys: columns -> fields.
    pub fn columns_to_fields(&self, row: JsonValue) -> JsonValue {
        translate_keys(row, |k| self.column_to_field(k))
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self::new(Arc::new(HyphenUnderscore), Arc::new(CamelSnake))
    }
}

impl std::fmt::Debug for Naming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Naming").finish_non_exhaustive()
    }
}

/// Rewrites the keys of a JSON object with `f`. Non-object values are returned unchanged.
pub fn translate_keys(value: JsonValue, f: impl Fn(&str) -> String) -> JsonValue {
    match value {
        JsonValue::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (k, v) in obj {
                out.insert(f(&k), v);
            }
            JsonValue::Object(out)
        }
        other => other,
    }
}
