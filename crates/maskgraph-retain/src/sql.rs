//! Statement text for shadow tables. Nothing here touches a connection.

use maskgraph_core::{KeyColumn, SqlDialect};

use crate::primary_key::PrimaryKey;

/// Suffix appended to a source table name to name its shadow table.
pub const RETAIN_SUFFIX: &str = "_RETAINED";

pub fn shadow_table_name(table: &str) -> String {
    format!("{table}{RETAIN_SUFFIX}")
}

/// Source table of a shadow table name, if `shadow` follows the convention.
pub fn source_table_name(shadow: &str) -> Option<&str> {
    shadow
        .strip_suffix(RETAIN_SUFFIX)
        .filter(|table| !table.is_empty())
}

/// Zero-row projection of the key columns, prepared only for its column
/// types.
pub fn key_type_probe(
    dialect: &dyn SqlDialect,
    schema: &str,
    table: &str,
    columns: &[String],
) -> String {
    let projection = columns
        .iter()
        .map(|column| dialect.quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {projection} FROM {} WHERE 1 = 0",
        dialect.qualified_table(schema, table)
    )
}

/// Type name usable in DDL and casts for a type reported by statement
/// metadata.
pub fn shadow_type_name(reported: &str) -> String {
    match reported {
        // Bare CHAR is char(1); the blank-padded type keeps any length.
        "CHAR" => "BPCHAR".to_string(),
        other => other.to_string(),
    }
}

pub fn create_shadow_table(
    dialect: &dyn SqlDialect,
    schema: &str,
    table: &str,
    key: &PrimaryKey,
) -> String {
    format!(
        "CREATE TABLE {} ({})",
        dialect.qualified_table(schema, &shadow_table_name(table)),
        dialect.primary_key_definition(&key.columns)
    )
}

pub fn insert_mark(
    dialect: &dyn SqlDialect,
    schema: &str,
    table: &str,
    key: &PrimaryKey,
) -> String {
    let columns = key
        .columns
        .iter()
        .map(|column| dialect.quote_ident(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let values = placeholders(dialect, &key.columns)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({values})",
        dialect.qualified_table(schema, &shadow_table_name(table))
    )
}

/// Existence query comparing every key column, in key order.
pub fn select_mark(
    dialect: &dyn SqlDialect,
    schema: &str,
    table: &str,
    key: &PrimaryKey,
) -> String {
    let predicate = key
        .columns
        .iter()
        .zip(placeholders(dialect, &key.columns))
        .map(|(column, placeholder)| {
            format!("{} = {placeholder}", dialect.quote_ident(&column.name))
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "SELECT 1 FROM {} WHERE {predicate}",
        dialect.qualified_table(schema, &shadow_table_name(table))
    )
}

fn placeholders<'a>(
    dialect: &'a dyn SqlDialect,
    columns: &'a [KeyColumn],
) -> impl Iterator<Item = String> + 'a {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| dialect.placeholder(idx + 1, &column.type_name))
}
