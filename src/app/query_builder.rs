//! QueryBuilder: the six core operations as parameterized statements against one table.
//!
//! Values are always bound, never spliced into SQL text. Each value is bound as text
//! and cast to the column's type in SQL, so the binding does not depend on Rust-side
//! knowledge of the column type. Rows are read back through `row_to_json`.

use crate::domain::naming::Naming;
use crate::domain::operation::ListParams;
use crate::domain::schema::{ColumnType, SchemaSnapshot, Table};
use crate::error::{ApiError, ApiResult};
use serde_json::{Map, Value as JsonValue};
use sqlx::{PgConnection, Postgres, Row};
use std::collections::BTreeMap;

type Statement<'q> = sqlx::QueryBuilder<'q, Postgres>;

/// Double-quotes an identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Text form of a JSON value as Postgres should parse it for a column of `column_type`.
fn bind_text(value: &JsonValue, column_type: &ColumnType) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) if !column_type.is_json() => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `"schema"."type"`, so user-defined types resolve regardless of `search_path`.
fn cast_target(column_type: &ColumnType) -> String {
    format!(
        "{}.{}",
        quote_ident(&column_type.schema),
        quote_ident(&column_type.name)
    )
}

pub struct QueryBuilder<'s> {
    schema_name: &'s str,
    table: &'s Table,
    naming: &'s Naming,
}

impl<'s> QueryBuilder<'s> {
    pub fn new(snapshot: &'s SchemaSnapshot, table: &'s Table) -> Self {
        Self {
            schema_name: snapshot.schema_name(),
            table,
            naming: snapshot.naming(),
        }
    }

    fn resource(&self) -> String {
        self.naming.table_to_resource(self.table.name())
    }

    fn qualified_table(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(self.schema_name),
            quote_ident(self.table.name())
        )
    }

    fn id_column(&self) -> String {
        quote_ident(self.table.id_column())
    }

    fn column_type(&self, column: &str) -> ColumnType {
        self.table
            .column_type(column)
            .cloned()
            .unwrap_or_else(|| ColumnType::builtin("text"))
    }

    fn not_found(&self, id: &str) -> ApiError {
        ApiError::not_found(format!(
            "Entry with id \"{}\" not found for resource \"{}\".",
            id,
            self.resource()
        ))
    }

    /// Pushes `value` as a bound parameter cast to the type of `column`.
    fn push_value(&self, qb: &mut Statement<'_>, column: &str, value: &JsonValue) {
        let column_type = self.column_type(column);
        if column_type.is_array() && value.is_array() {
            qb.push("ARRAY(SELECT jsonb_array_elements_text(")
                .push_bind(value.to_string())
                .push("::jsonb))::")
                .push(cast_target(&column_type));
            return;
        }
        qb.push_bind(bind_text(value, &column_type))
            .push("::text::")
            .push(cast_target(&column_type));
    }

    fn push_id_predicate(&self, qb: &mut Statement<'_>, id: &str) {
        qb.push(self.id_column()).push(" = ");
        self.push_value(qb, self.table.id_column(), &JsonValue::String(id.to_string()));
    }

    /// Translates filter fields to columns and checks them against the table.
    fn filter_columns(&self, filter: &Map<String, JsonValue>) -> ApiResult<Vec<(String, JsonValue)>> {
        filter
            .iter()
            .map(|(field, value)| {
                let column = self.naming.field_to_column(field);
                if self.table.has_column(&column) {
                    Ok((column, value.clone()))
                } else {
                    Err(ApiError::bad_request(format!(
                        "Invalid filter field \"{}\"",
                        field
                    )))
                }
            })
            .collect()
    }

    /// Column an `orderBy` field names, else the identifier column.
    fn order_column(&self, order_by: Option<&str>) -> ApiResult<String> {
        let Some(field) = order_by else {
            return Ok(self.table.id_column().to_string());
        };
        let column = self.naming.field_to_column(field);
        if !self.table.has_column(&column) {
            return Err(ApiError::bad_request(format!(
                "Invalid orderBy field \"{}\"",
                field
            )));
        }
        Ok(column)
    }

    /// `getList` parameters, checked in the order `orderBy`, `orderByDesc`, `page`, `pageSize`.
    pub fn list_params(
        &self,
        query: &BTreeMap<String, String>,
        default_page_size: i64,
    ) -> ApiResult<ListParams> {
        let order_by = query.get("orderBy").map(|s| s.as_str()).filter(|s| !s.is_empty());
        self.order_column(order_by)?;
        ListParams::from_query(query, default_page_size)
    }

    pub fn list_statement(
        &self,
        params: &ListParams,
        filter: &Map<String, JsonValue>,
    ) -> ApiResult<Statement<'static>> {
        let order_column = self.order_column(params.order_by.as_deref())?;
        let filter = self.filter_columns(filter)?;

        let mut qb = Statement::new("SELECT row_to_json(t.*) AS record FROM ");
        qb.push(self.qualified_table()).push(" t");
        for (i, (column, value)) in filter.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push("t.").push(quote_ident(column));
            if value.is_null() {
                qb.push(" IS NULL");
            } else {
                qb.push(" = ");
                self.push_value(&mut qb, column, value);
            }
        }
        qb.push(" ORDER BY t.").push(quote_ident(&order_column));
        if params.order_desc {
            qb.push(" DESC");
        }
        qb.push(" LIMIT ")
            .push_bind(params.page_size)
            .push(" OFFSET ")
            .push_bind(params.offset());
        Ok(qb)
    }

    /// One page of rows, keys translated to field names.
    pub async fn list(
        &self,
        conn: &mut PgConnection,
        params: &ListParams,
        filter: &Map<String, JsonValue>,
    ) -> ApiResult<Vec<JsonValue>> {
        let mut qb = self.list_statement(params, filter)?;
        let rows = qb.build().fetch_all(&mut *conn).await?;
        rows.into_iter()
            .map(|r| -> ApiResult<JsonValue> {
                let record: JsonValue = r.try_get("record")?;
                Ok(self.naming.columns_to_fields(record))
            })
            .collect()
    }

    pub fn count_statement(&self) -> Statement<'static> {
        let mut qb = Statement::new("SELECT count(*) AS count FROM ");
        qb.push(self.qualified_table());
        qb
    }

    pub async fn count(&self, conn: &mut PgConnection) -> ApiResult<i64> {
        let mut qb = self.count_statement();
        let row = qb.build().fetch_one(&mut *conn).await?;
        Ok(row.try_get("count")?)
    }

    pub fn get_statement(&self, id: &str) -> Statement<'static> {
        let mut qb = Statement::new("SELECT row_to_json(t.*) AS record FROM ");
        qb.push(self.qualified_table()).push(" t WHERE t.");
        self.push_id_predicate(&mut qb, id);
        qb
    }

    /// Exactly one row or an error: none is `NotFound`, several is an internal inconsistency.
    pub async fn get_by_id(&self, conn: &mut PgConnection, id: &str) -> ApiResult<JsonValue> {
        let mut qb = self.get_statement(id);
        let mut rows = qb.build().fetch_all(&mut *conn).await?;
        match rows.len() {
            0 => Err(self.not_found(id)),
            1 => {
                let record: JsonValue = rows.remove(0).try_get("record")?;
                Ok(self.naming.columns_to_fields(record))
            }
            _ => Err(ApiError::internal(format!(
                "Multiple rows returned for resource \"{}\" and id \"{}\".",
                self.resource(),
                id
            ))),
        }
    }

    /// `record` is keyed by column names and already validated.
    pub fn insert_statement(&self, record: &Map<String, JsonValue>) -> Statement<'static> {
        let mut qb = Statement::new("INSERT INTO ");
        qb.push(self.qualified_table());
        if record.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<String> = record.keys().map(|c| quote_ident(c)).collect();
            qb.push(" (").push(columns.join(", ")).push(") VALUES (");
            for (i, (column, value)) in record.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                self.push_value(&mut qb, column, value);
            }
            qb.push(")");
        }
        qb.push(" RETURNING to_jsonb(")
            .push(self.id_column())
            .push(") AS id");
        qb
    }

    /// Inserts one row and returns its identifier.
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        record: &Map<String, JsonValue>,
    ) -> ApiResult<JsonValue> {
        let mut qb = self.insert_statement(record);
        let row = qb.build().fetch_one(&mut *conn).await?;
        Ok(row.try_get("id")?)
    }

    pub fn update_statement(&self, id: &str, record: &Map<String, JsonValue>) -> Statement<'static> {
        let mut qb = Statement::new("UPDATE ");
        qb.push(self.qualified_table()).push(" SET ");
        if record.is_empty() {
            // Still addresses the row so a missing id reports NotFound.
            qb.push(self.id_column()).push(" = ").push(self.id_column());
        }
        for (i, (column, value)) in record.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(quote_ident(column)).push(" = ");
            self.push_value(&mut qb, column, value);
        }
        qb.push(" WHERE ");
        self.push_id_predicate(&mut qb, id);
        qb
    }

    pub async fn update(
        &self,
        conn: &mut PgConnection,
        id: &str,
        record: &Map<String, JsonValue>,
    ) -> ApiResult<()> {
        let mut qb = self.update_statement(id, record);
        let result = qb.build().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found(id));
        }
        Ok(())
    }

    pub fn delete_statement(&self, id: &str) -> Statement<'static> {
        let mut qb = Statement::new("DELETE FROM ");
        qb.push(self.qualified_table()).push(" WHERE ");
        self.push_id_predicate(&mut qb, id);
        qb
    }

    pub async fn delete(&self, conn: &mut PgConnection, id: &str) -> ApiResult<()> {
        let mut qb = self.delete_statement(id);
        let result = qb.build().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found(id));
        }
        Ok(())
    }
}
