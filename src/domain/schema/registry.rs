//! SchemaRegistry: introspects the store and publishes immutable snapshots.

use crate::domain::naming::Naming;
use crate::domain::schema::{ColumnType, SchemaSnapshot};
use crate::error::ApiResult;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Introspection settings.
#[derive(Debug, Clone)]
pub struct SchemaConfig {
    pub schema_name: String,
    pub ignored_tables: Vec<String>,
    /// Per-table identifier column overrides (table -> column).
    pub table_id_columns: HashMap<String, String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            schema_name: "public".to_string(),
            ignored_tables: Vec::new(),
            table_id_columns: HashMap::new(),
        }
    }
}

/// Holds the current schema snapshot. Readers get an `Arc` to a complete snapshot;
/// a refresh builds a new one and swaps it in as a whole.
pub struct SchemaRegistry {
    config: SchemaConfig,
    naming: Naming,
    current: RwLock<Arc<SchemaSnapshot>>,
}

impl SchemaRegistry {
    pub fn new(config: SchemaConfig, naming: Naming) -> Self {
        let empty = SchemaSnapshot::empty(config.schema_name.clone(), naming.clone());
        Self {
            config,
            naming,
            current: RwLock::new(Arc::new(empty)),
        }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// The snapshot published by the last successful refresh.
    pub async fn snapshot(&self) -> Arc<SchemaSnapshot> {
        self.current.read().await.clone()
    }

    /// Reads all non-ignored tables and their columns from `information_schema` and
    /// publishes the result. On failure the previous snapshot stays in place.
    pub async fn refresh(&self, pool: &PgPool) -> ApiResult<Arc<SchemaSnapshot>> {
        let rows = sqlx::query(
            "SELECT table_name::text AS table_name, column_name::text AS column_name,
                    udt_schema::text AS udt_schema, udt_name::text AS udt_name
             FROM information_schema.columns
             WHERE table_schema = $1 AND NOT (table_name::text = ANY($2))
             ORDER BY table_name, ordinal_position",
        )
        .bind(&self.config.schema_name)
        .bind(self.config.ignored_tables.as_slice())
        .fetch_all(pool)
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for r in rows {
            let table_name: String = r.try_get("table_name")?;
            let column_name: String = r.try_get("column_name")?;
            let udt_schema: String = r.try_get("udt_schema")?;
            let udt_name: String = r.try_get("udt_name")?;
            columns.push((table_name, column_name, ColumnType::new(udt_schema, udt_name)));
        }
        self.publish(columns).await
    }

    /// Builds a snapshot from introspected columns and swaps it in if it is valid.
    async fn publish(
        &self,
        columns: Vec<(String, String, ColumnType)>,
    ) -> ApiResult<Arc<SchemaSnapshot>> {
        let snapshot = Arc::new(SchemaSnapshot::from_columns(
            self.config.schema_name.clone(),
            columns,
            &self.config.table_id_columns,
            self.naming.clone(),
        )?);

        *self.current.write().await = snapshot.clone();
        tracing::info!(
            schema = %self.config.schema_name,
            tables = snapshot.table_names().count(),
            "schema snapshot refreshed"
        );
        Ok(snapshot)
    }

    pub async fn validate_table(&self, table: &str) -> ApiResult<()> {
        self.snapshot().await.validate_table(table).map(|_| ())
    }

    pub async fn validate_fields(&self, table: &str, columns: &[&str]) -> ApiResult<()> {
        self.snapshot()
            .await
            .validate_fields(table, columns.iter().copied())
    }

    /// Identifier column of a table in the current snapshot; `NotFound` for unknown tables.
    pub async fn identifier_column(&self, table: &str) -> ApiResult<String> {
        Ok(self.snapshot().await.identifier_column(table)?.to_string())
    }
}
