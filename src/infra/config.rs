//! Centralized configuration (environment variables + defaults).

use crate::domain::naming::{NameTranslator, Naming};
use crate::domain::operation::DEFAULT_PAGE_SIZE;
use crate::domain::schema::SchemaConfig;
use crate::infra::logging::LogFormat;
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: String,
    /// Prefix the generic resource routes are mounted under.
    pub base_path: String,
    pub log_format: LogFormat,
    pub schema: SchemaConfig,
    pub default_page_size: i64,
    pub naming: Naming,
}

impl ServiceConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            bind_addr: "0.0.0.0:3000".to_string(),
            base_path: "/api/generic".to_string(),
            log_format: LogFormat::Pretty,
            schema: SchemaConfig::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
            naming: Naming::default(),
        }
    }

    /// Reads the configuration from the environment (after loading `.env`, if any).
    ///
    /// `DATABASE_URL` is required; everything else falls back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        Self::from_lookup(database_url, |key| std::env::var(key).ok())
    }

    fn from_lookup(
        database_url: String,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::new(database_url);

        if let Some(v) = lookup("DB_MAX_CONNECTIONS") {
            config.max_connections = v
                .trim()
                .parse::<u32>()
                .context("DB_MAX_CONNECTIONS must be a valid u32")?
                .max(1);
        }
        if let Some(v) = lookup("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = lookup("BASE_PATH") {
            config.base_path = normalize_base_path(&v);
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            config.log_format = v.parse()?;
        }
        if let Some(v) = lookup("DB_SCHEMA") {
            config.schema.schema_name = v;
        }
        if let Some(v) = lookup("IGNORED_TABLES") {
            config.schema.ignored_tables = split_list(&v).map(String::from).collect();
        }
        if let Some(v) = lookup("TABLE_ID_COLUMNS") {
            config.schema.table_id_columns = parse_id_columns(&v)?;
        }
        if let Some(v) = lookup("DEFAULT_PAGE_SIZE") {
            let size = v
                .trim()
                .parse::<i64>()
                .context("DEFAULT_PAGE_SIZE must be a valid integer")?;
            anyhow::ensure!(size > 0, "DEFAULT_PAGE_SIZE must be > 0 but was {}", size);
            config.default_page_size = size;
        }

        Ok(config)
    }

    pub fn with_schema_name(mut self, schema_name: impl Into<String>) -> Self {
        self.schema.schema_name = schema_name.into();
        self
    }

    pub fn with_ignored_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema.ignored_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_table_id_column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.schema.table_id_columns.insert(table.into(), column.into());
        self
    }

    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = normalize_base_path(base_path);
        self
    }

    pub fn with_default_page_size(mut self, page_size: i64) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn with_resource_translator(mut self, translator: Arc<dyn NameTranslator>) -> Self {
        self.naming.resources = translator;
        self
    }

    pub fn with_field_translator(mut self, translator: Arc<dyn NameTranslator>) -> Self {
        self.naming.fields = translator;
        self
    }
}

fn split_list(v: &str) -> impl Iterator<Item = &str> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `table:column,table2:column2`
fn parse_id_columns(v: &str) -> anyhow::Result<HashMap<String, String>> {
    split_list(v)
        .map(|pair| {
            let (table, column) = pair
                .split_once(':')
                .with_context(|| format!("TABLE_ID_COLUMNS entry '{}' must be table:column", pair))?;
            Ok((table.trim().to_string(), column.trim().to_string()))
        })
        .collect()
}

/// Leading slash, no trailing slash; `/` becomes the empty prefix.
fn normalize_base_path(v: &str) -> String {
    let trimmed = v.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
