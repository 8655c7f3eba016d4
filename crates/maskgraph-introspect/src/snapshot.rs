use std::path::Path;

use async_trait::async_trait;

use maskgraph_core::{
    Column, DatabaseSchema, Error, Result, Schema, Table, TableField, TableKind, validate_schema,
};

use crate::catalog::{CatalogColumn, ForeignKeyReference, PrimaryKeyColumn, SchemaCatalog};
use crate::pattern::like_regex;

/// Catalog answered from a `schema.json` snapshot instead of a live database.
#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    schema: DatabaseSchema,
}

impl SnapshotCatalog {
    /// Wrap a snapshot after checking its internal consistency.
    pub fn new(schema: DatabaseSchema) -> Result<Self> {
        validate_schema(&schema)?;
        Ok(Self { schema })
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let schema: DatabaseSchema = serde_json::from_str(input)
            .map_err(|err| Error::InvalidSchema(format!("snapshot is not valid JSON: {err}")))?;
        Self::new(schema)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .map_err(|err| Error::Other(format!("reading {}: {err}", path.display())))?;
        Self::from_json_str(&input)
    }

    pub fn snapshot(&self) -> &DatabaseSchema {
        &self.schema
    }

    fn base_tables<'a>(&'a self, schema: &str) -> Vec<&'a Table> {
        let mut tables: Vec<&Table> = self
            .schema
            .schema(schema)
            .map(|schema| {
                schema
                    .tables
                    .iter()
                    .filter(|table| table.kind == TableKind::Table)
                    .collect()
            })
            .unwrap_or_default();
        tables.sort_by(|left, right| left.name.cmp(&right.name));
        tables
    }

    fn base_table(&self, schema: &str, table: &str) -> Option<&Table> {
        self.schema
            .table(schema, table)
            .filter(|table| table.kind == TableKind::Table)
    }

    /// Every column pair of every foreign key declared in the snapshot.
    fn references(&self) -> impl Iterator<Item = ForeignKeyReference> + '_ {
        self.schema.schemas.iter().flat_map(|schema: &Schema| {
            schema.tables.iter().flat_map(move |table| {
                table.foreign_keys().flat_map(move |fk| {
                    fk.columns
                        .iter()
                        .zip(&fk.referenced_columns)
                        .map(move |(child, parent)| ForeignKeyReference {
                            parent: TableField::new(
                                &fk.referenced_schema,
                                &fk.referenced_table,
                                parent,
                            ),
                            child: TableField::new(&schema.name, &table.name, child),
                            constraint_name: fk.name.clone(),
                        })
                })
            })
        })
    }
}

fn to_catalog_column(schema: &str, table: &str, column: &Column) -> CatalogColumn {
    CatalogColumn {
        field: TableField::new(schema, table, &column.name),
        type_name: column.column_type.data_type.clone(),
        length: column.column_type.character_max_length,
        nullable: column.is_nullable,
    }
}

#[async_trait]
impl SchemaCatalog for SnapshotCatalog {
    fn engine(&self) -> &'static str {
        "snapshot"
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        Ok(self
            .base_tables(schema)
            .into_iter()
            .map(|table| table.name.clone())
            .collect())
    }

    async fn primary_key_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<PrimaryKeyColumn>> {
        let Some(pk) = self
            .base_table(schema, table)
            .and_then(|table| table.primary_key())
        else {
            return Ok(Vec::new());
        };

        Ok(pk
            .columns
            .iter()
            .zip(1..)
            .map(|(column, key_seq)| PrimaryKeyColumn {
                column: column.clone(),
                key_seq,
                key_name: pk.name.clone(),
            })
            .collect())
    }

    async fn exported_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKeyReference>> {
        let mut references: Vec<_> = self
            .references()
            .filter(|reference| reference.parent.belongs_to(schema, table))
            .collect();
        references.sort_by(|left, right| left.child.cmp(&right.child));
        Ok(references)
    }

    async fn imported_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKeyReference>> {
        let mut references: Vec<_> = self
            .references()
            .filter(|reference| reference.child.belongs_to(schema, table))
            .collect();
        references.sort_by(|left, right| left.parent.cmp(&right.parent));
        Ok(references)
    }

    async fn list_columns(
        &self,
        schema: &str,
        table_pattern: Option<&str>,
        column_pattern: &str,
    ) -> Result<Vec<CatalogColumn>> {
        let invalid = |err: regex::Error| Error::Other(format!("invalid LIKE pattern: {err}"));
        let table_regex = table_pattern.map(like_regex).transpose().map_err(invalid)?;
        let column_regex = like_regex(column_pattern).map_err(invalid)?;

        let mut columns = Vec::new();
        for table in self.base_tables(schema) {
            if let Some(regex) = &table_regex {
                if !regex.is_match(&table.name) {
                    continue;
                }
            }
            columns.extend(
                table
                    .columns
                    .iter()
                    .filter(|column| column_regex.is_match(&column.name))
                    .map(|column| to_catalog_column(schema, &table.name, column)),
            );
        }
        Ok(columns)
    }

    async fn column_metadata(&self, field: &TableField) -> Result<Option<CatalogColumn>> {
        Ok(self
            .base_table(&field.schema, &field.table)
            .and_then(|table| table.column(&field.column))
            .map(|column| to_catalog_column(&field.schema, &field.table, column)))
    }
}
