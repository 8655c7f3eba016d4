use maskgraph_core::{KeyColumn, Row, Value};

use crate::errors::RetainCause;

/// Primary key of a source table, columns in key-sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<KeyColumn>,
}

impl PrimaryKey {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Values of the key columns taken from `row`, in key order.
    pub fn key_values<'r>(&self, row: &'r Row) -> Result<Vec<&'r Value>, RetainCause> {
        self.columns
            .iter()
            .map(|column| match row.get(&column.name) {
                None => Err(RetainCause::MissingKeyValue(column.name.clone())),
                Some(value) if value.is_null() => {
                    Err(RetainCause::NullKeyValue(column.name.clone()))
                }
                Some(value) => Ok(value),
            })
            .collect()
    }
}
