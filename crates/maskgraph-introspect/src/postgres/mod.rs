use async_trait::async_trait;
use sqlx::PgPool;

use maskgraph_core::{Result, TableField};

use crate::catalog::{CatalogColumn, ForeignKeyReference, PrimaryKeyColumn, SchemaCatalog};

mod queries;

/// Catalog backed by a live PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Create a catalog using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SchemaCatalog for PostgresCatalog {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let tables = queries::list_tables(&self.pool, schema).await?;
        tracing::debug!(event = "catalog_tables_listed", schema, count = tables.len());
        Ok(tables)
    }

    async fn primary_key_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<PrimaryKeyColumn>> {
        queries::primary_key_columns(&self.pool, schema, table).await
    }

    async fn exported_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKeyReference>> {
        queries::exported_keys(&self.pool, schema, table).await
    }

    async fn imported_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKeyReference>> {
        queries::imported_keys(&self.pool, schema, table).await
    }

    async fn list_columns(
        &self,
        schema: &str,
        table_pattern: Option<&str>,
        column_pattern: &str,
    ) -> Result<Vec<CatalogColumn>> {
        queries::list_columns(&self.pool, schema, table_pattern.unwrap_or("%"), column_pattern)
            .await
    }

    async fn column_metadata(&self, field: &TableField) -> Result<Option<CatalogColumn>> {
        queries::column_metadata(&self.pool, field).await
    }
}
