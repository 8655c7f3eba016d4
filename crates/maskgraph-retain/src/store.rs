use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use maskgraph_core::{KeyColumn, PostgresDialect, Row, SqlDialect, Value, qualified_table_name};
use maskgraph_introspect::{SchemaCatalog, escape_like};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Postgres, Statement, TypeInfo};

use crate::errors::{RetainCause, RetainError};
use crate::primary_key::PrimaryKey;
use crate::sql::{self, RETAIN_SUFFIX, shadow_table_name, source_table_name};

/// Records rows that must be left untouched and answers whether a row was
/// recorded.
///
/// Primary keys are read from the original database; shadow tables live in
/// the transformation database. Both caches belong to this instance only.
pub struct RetainStore {
    original: PgPool,
    transformation: PgPool,
    catalog: Arc<dyn SchemaCatalog>,
    dialect: Box<dyn SqlDialect>,
    primary_keys: HashMap<String, PrimaryKey>,
    retained_tables: HashSet<String>,
}

impl RetainStore {
    /// Build a store without scanning for existing shadow tables.
    ///
    /// `catalog` must describe the original database.
    pub fn new(
        original: PgPool,
        transformation: PgPool,
        catalog: Arc<dyn SchemaCatalog>,
    ) -> Self {
        Self {
            original,
            transformation,
            catalog,
            dialect: Box::new(PostgresDialect),
            primary_keys: HashMap::new(),
            retained_tables: HashSet::new(),
        }
    }

    pub fn with_dialect(mut self, dialect: Box<dyn SqlDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Build a store and load the shadow tables already present in the
    /// transformation database.
    pub async fn open(
        original: PgPool,
        transformation: PgPool,
        catalog: Arc<dyn SchemaCatalog>,
    ) -> Result<Self, RetainError> {
        let mut store = Self::new(original, transformation, catalog);
        store.refresh_retained_tables().await?;
        Ok(store)
    }

    /// Replace the retained-table set with the shadow tables found in the
    /// transformation database. Returns how many were found.
    pub async fn refresh_retained_tables(&mut self) -> Result<usize, RetainError> {
        let pattern = format!("%{}", escape_like(RETAIN_SUFFIX));
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            select table_schema::text, table_name::text
            from information_schema.tables
            where table_type = 'BASE TABLE'
              and table_name like $1
            order by table_schema, table_name
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.transformation)
        .await
        .map_err(RetainError::Scan)?;

        self.retained_tables = rows
            .iter()
            .filter_map(|(schema, shadow)| {
                source_table_name(shadow).map(|table| qualified_table_name(schema, table))
            })
            .collect();
        tracing::info!(
            event = "retain_tables_scanned",
            count = self.retained_tables.len()
        );
        Ok(self.retained_tables.len())
    }

    /// True when at least one row of `schema.table` has been retained.
    pub fn is_table_retained(&self, schema: &str, table: &str) -> bool {
        self.retained_tables
            .contains(&qualified_table_name(schema, table))
    }

    /// Qualified names (`schema.table`) of tables with retained rows.
    pub fn retained_tables(&self) -> impl Iterator<Item = &str> {
        self.retained_tables.iter().map(String::as_str)
    }

    /// Record `row` as retained, creating the shadow table (and its schema)
    /// on first use.
    pub async fn retain_current_row(
        &mut self,
        schema: &str,
        table: &str,
        row: &Row,
    ) -> Result<(), RetainError> {
        self.insert_mark(schema, table, row)
            .await
            .map_err(|source| RetainError::InsertRetainMarkFailed {
                schema: schema.to_string(),
                table: table.to_string(),
                source,
            })?;
        self.retained_tables
            .insert(qualified_table_name(schema, table));
        Ok(())
    }

    /// Whether `row` was previously retained. Tables without any retained
    /// row answer `false` without a query.
    pub async fn current_row_should_be_retained(
        &mut self,
        schema: &str,
        table: &str,
        row: &Row,
    ) -> Result<bool, RetainError> {
        if !self.is_table_retained(schema, table) {
            return Ok(false);
        }
        self.lookup_mark(schema, table, row)
            .await
            .map_err(|source| RetainError::LookupFailed {
                schema: schema.to_string(),
                table: table.to_string(),
                source,
            })
    }

    /// Primary key of `schema.table`, resolved once per store.
    pub async fn primary_key(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<PrimaryKey, RetainCause> {
        let cache_key = qualified_table_name(schema, table);
        if let Some(key) = self.primary_keys.get(&cache_key) {
            return Ok(key.clone());
        }

        let key = self.resolve_primary_key(schema, table).await?;
        tracing::debug!(
            event = "primary_key_resolved",
            table = %cache_key,
            columns = key.columns.len()
        );
        self.primary_keys.insert(cache_key, key.clone());
        Ok(key)
    }

    async fn resolve_primary_key(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<PrimaryKey, RetainCause> {
        let key_columns = self.catalog.primary_key_columns(schema, table).await?;
        if key_columns.is_empty() {
            return Err(RetainCause::NoPrimaryKey);
        }
        let name = key_columns[0].key_name.clone();
        let names: Vec<String> = key_columns.into_iter().map(|column| column.column).collect();

        let probe = sql::key_type_probe(self.dialect.as_ref(), schema, table, &names);
        let statement = (&self.original).prepare(probe.as_str()).await?;
        let reported = statement.columns();

        let mut columns = Vec::with_capacity(names.len());
        for (idx, column) in names.into_iter().enumerate() {
            let Some(metadata) = reported.get(idx) else {
                return Err(RetainCause::KeyTypeUnavailable(column));
            };
            let type_name = sql::shadow_type_name(metadata.type_info().name());
            columns.push(KeyColumn::new(column, type_name));
        }

        Ok(PrimaryKey { name, columns })
    }

    async fn insert_mark(
        &mut self,
        schema: &str,
        table: &str,
        row: &Row,
    ) -> Result<(), RetainCause> {
        let key = self.primary_key(schema, table).await?;
        let values = key.key_values(row)?;

        if !self.is_table_retained(schema, table) {
            self.ensure_shadow_table(schema, table, &key).await?;
        }

        let statement = sql::insert_mark(self.dialect.as_ref(), schema, table, &key);
        bind_values(sqlx::query(&statement), &values)
            .execute(&self.transformation)
            .await?;
        tracing::debug!(event = "retain_mark_inserted", schema, table);
        Ok(())
    }

    async fn lookup_mark(
        &mut self,
        schema: &str,
        table: &str,
        row: &Row,
    ) -> Result<bool, RetainCause> {
        let key = self.primary_key(schema, table).await?;
        let values = key.key_values(row)?;

        let statement = sql::select_mark(self.dialect.as_ref(), schema, table, &key);
        let found = bind_values(sqlx::query(&statement), &values)
            .fetch_optional(&self.transformation)
            .await?;
        Ok(found.is_some())
    }

    async fn ensure_shadow_table(
        &self,
        schema: &str,
        table: &str,
        key: &PrimaryKey,
    ) -> Result<(), RetainCause> {
        let schema_exists = sqlx::query_scalar::<_, bool>(
            "select exists (select 1 from information_schema.schemata where schema_name = $1)",
        )
        .bind(schema)
        .fetch_one(&self.transformation)
        .await?;
        if !schema_exists {
            sqlx::query(&self.dialect.create_schema(schema))
                .execute(&self.transformation)
                .await?;
            tracing::info!(event = "retain_schema_created", schema);
        }

        let shadow = shadow_table_name(table);
        let table_exists = sqlx::query_scalar::<_, bool>(
            r#"
            select exists (
              select 1
              from information_schema.tables
              where table_schema = $1
                and table_name = $2
            )
            "#,
        )
        .bind(schema)
        .bind(&shadow)
        .fetch_one(&self.transformation)
        .await?;
        if table_exists {
            return Ok(());
        }

        let statement = sql::create_shadow_table(self.dialect.as_ref(), schema, table, key);
        sqlx::query(&statement)
            .execute(&self.transformation)
            .await?;
        tracing::info!(event = "retain_table_created", schema, table = %shadow);
        Ok(())
    }
}

impl fmt::Debug for RetainStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetainStore")
            .field("engine", &self.catalog.engine())
            .field("dialect", &self.dialect.name())
            .field("primary_keys", &self.primary_keys.len())
            .field("retained_tables", &self.retained_tables)
            .finish()
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &[&Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(value) => query.bind(*value),
            Value::Int(value) => query.bind(*value),
            Value::Float(value) => query.bind(*value),
            Value::Text(value) => query.bind(value.clone()),
            Value::Date(value) => query.bind(*value),
            Value::Timestamp(value) => query.bind(*value),
            Value::Uuid(value) => query.bind(*value),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use maskgraph_core::DatabaseSchema;
    use maskgraph_introspect::SnapshotCatalog;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://maskgraph@127.0.0.1:1/unreachable")
            .expect("lazy pool")
    }

    fn empty_catalog() -> Arc<dyn SchemaCatalog> {
        let schema = DatabaseSchema {
            schema_version: maskgraph_core::SCHEMA_VERSION.to_string(),
            engine: "postgres".to_string(),
            database: None,
            schemas: Vec::new(),
        };
        Arc::new(SnapshotCatalog::new(schema).expect("catalog"))
    }

    #[tokio::test]
    async fn unmarked_table_answers_without_a_query() {
        let mut store = RetainStore::new(lazy_pool(), lazy_pool(), empty_catalog());
        let row = Row::new().with("ID", 1_i64);

        let retained = store
            .current_row_should_be_retained("app", "ORDER", &row)
            .await
            .expect("fast path");
        assert!(!retained);
        assert_eq!(store.retained_tables().count(), 0);
    }

    #[tokio::test]
    async fn table_without_primary_key_cannot_be_marked() {
        let mut store = RetainStore::new(lazy_pool(), lazy_pool(), empty_catalog());
        let row = Row::new().with("ID", 1_i64);

        let err = store
            .retain_current_row("app", "AUDIT_LOG", &row)
            .await
            .expect_err("no key");
        assert!(matches!(
            err,
            RetainError::InsertRetainMarkFailed {
                ref table,
                source: RetainCause::NoPrimaryKey,
                ..
            } if table == "AUDIT_LOG"
        ));
        assert!(!store.is_table_retained("app", "AUDIT_LOG"));
    }
}
