use async_trait::async_trait;
use serde::Serialize;

use maskgraph_core::{Result, TableField};

/// One column of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKeyColumn {
    pub column: String,
    /// 1-based position inside the key.
    pub key_seq: i32,
    pub key_name: Option<String>,
}

/// One column pair of a foreign key: `child` references `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyReference {
    pub parent: TableField,
    pub child: TableField,
    pub constraint_name: Option<String>,
}

/// Column metadata handed to strategy validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogColumn {
    pub field: TableField,
    /// Engine type name (`int4`, `varchar`, ...).
    pub type_name: String,
    /// Character length, or numeric precision for numeric types.
    pub length: Option<i32>,
    pub nullable: bool,
}

/// Catalog queries needed to analyze rules and mirror primary keys.
///
/// Only base tables are reported. Pattern arguments use SQL `LIKE` syntax
/// with backslash as the escape character.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Base tables of `schema`, ordered by name.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Primary key columns ordered by key sequence; empty when the table has
    /// no primary key.
    async fn primary_key_columns(&self, schema: &str, table: &str)
    -> Result<Vec<PrimaryKeyColumn>>;

    /// References from other tables into `schema.table`.
    async fn exported_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKeyReference>>;

    /// References from `schema.table` into other tables.
    async fn imported_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKeyReference>>;

    /// Columns of `schema` matching both patterns. `None` matches every table.
    async fn list_columns(
        &self,
        schema: &str,
        table_pattern: Option<&str>,
        column_pattern: &str,
    ) -> Result<Vec<CatalogColumn>>;

    async fn column_metadata(&self, field: &TableField) -> Result<Option<CatalogColumn>>;

    async fn column_exists(&self, field: &TableField) -> Result<bool> {
        Ok(self.column_metadata(field).await?.is_some())
    }
}
