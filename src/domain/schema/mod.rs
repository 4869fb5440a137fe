//! Schema snapshot: which tables exist and which columns they carry.

use crate::domain::naming::Naming;
use crate::error::{ApiError, ApiResult};
use std::collections::{BTreeMap, HashMap};

pub mod registry;

pub use registry::{SchemaConfig, SchemaRegistry};

/// Identifier column used when a table has no override.
pub const DEFAULT_ID_COLUMN: &str = "id";

/// A column's type as introspected: `udt_schema` and `udt_name`.
///
/// The schema is kept so casts resolve types defined outside `search_path`
/// (e.g. an enum in the configured schema).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub schema: String,
    pub name: String,
}

impl ColumnType {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// A built-in type from `pg_catalog`.
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new("pg_catalog", name)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.name.as_str(), "json" | "jsonb")
    }

    /// Array types are named after their element type with a leading `_`.
    pub fn is_array(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// One introspected table.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    column_types: HashMap<String, ColumnType>,
    id_column: String,
}

impl Table {
    pub fn new(name: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            column_types: HashMap::new(),
            id_column: id_column.into(),
        }
    }

    /// Appends a column, keeping introspection order. Duplicates are ignored.
    pub fn push_column(&mut self, column: impl Into<String>, column_type: ColumnType) {
        let column = column.into();
        if self.column_types.contains_key(&column) {
            return;
        }
        self.column_types.insert(column.clone(), column_type);
        self.columns.push(column);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_types.contains_key(column)
    }

    pub fn column_type(&self, column: &str) -> Option<&ColumnType> {
        self.column_types.get(column)
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Fails with a `BadRequest` naming the first column (in field spelling) the table lacks.
    pub fn validate_columns<'a>(
        &self,
        columns: impl IntoIterator<Item = &'a str>,
        naming: &Naming,
    ) -> ApiResult<()> {
        for column in columns {
            if !self.has_column(column) {
                return Err(ApiError::bad_request(format!(
                    "Invalid field \"{}\"",
                    naming.column_to_field(column)
                )));
            }
        }
        Ok(())
    }
}

/// Immutable view of the schema produced by one refresh.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    schema_name: String,
    tables: BTreeMap<String, Table>,
    naming: Naming,
}

impl SchemaSnapshot {
    /// An empty snapshot, used before the first refresh.
    pub fn empty(schema_name: impl Into<String>, naming: Naming) -> Self {
        Self {
            schema_name: schema_name.into(),
            tables: BTreeMap::new(),
            naming,
        }
    }

    /// Groups `(table, column, type)` rows by table and checks every table has its
    /// identifier column.
    pub fn from_columns<I>(
        schema_name: impl Into<String>,
        rows: I,
        id_overrides: &HashMap<String, String>,
        naming: Naming,
    ) -> ApiResult<Self>
    where
        I: IntoIterator<Item = (String, String, ColumnType)>,
    {
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for (table_name, column, column_type) in rows {
            let table = tables.entry(table_name.clone()).or_insert_with(|| {
                let id_column = id_overrides
                    .get(&table_name)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string());
                Table::new(table_name.clone(), id_column)
            });
            table.push_column(column, column_type);
        }

        for table in tables.values() {
            if !table.has_column(table.id_column()) {
                return Err(ApiError::Schema(format!(
                    "Id column of '{}' does not exist for table '{}'. Check tableIdColumns configuration value.",
                    table.id_column(),
                    table.name()
                )));
            }
        }

        Ok(Self {
            schema_name: schema_name.into(),
            tables,
            naming,
        })
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    /// Resolves a table, failing with `NotFound` naming the resource when it is unknown.
    pub fn validate_table(&self, table: &str) -> ApiResult<&Table> {
        self.tables.get(table).ok_or_else(|| {
            ApiError::not_found(format!(
                "Invalid resource \"{}\"",
                self.naming.table_to_resource(table)
            ))
        })
    }

    /// Resource name -> validated table.
    pub fn resolve_resource(&self, resource: &str) -> ApiResult<&Table> {
        self.validate_table(&self.naming.resource_to_table(resource))
    }

    pub fn validate_fields<'a>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> ApiResult<()> {
        self.validate_table(table)?
            .validate_columns(columns, &self.naming)
    }

    pub fn identifier_column(&self, table: &str) -> ApiResult<&str> {
        Ok(self.validate_table(table)?.id_column())
    }
}
