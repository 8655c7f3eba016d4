use std::fmt;

use serde::{Deserialize, Serialize};

/// Schema-qualified column identity.
///
/// Ordering is `(schema, table, column)` so sets of fields serialize in a
/// stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableField {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl TableField {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// `schema.table` key of the table owning this field.
    pub fn qualified_table(&self) -> String {
        qualified_table_name(&self.schema, &self.table)
    }

    /// True when this field lives in `schema.table`.
    pub fn belongs_to(&self, schema: &str, table: &str) -> bool {
        self.schema == schema && self.table == table
    }
}

impl fmt::Display for TableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

/// Unquoted `schema.table` key used for caches and log fields.
pub fn qualified_table_name(schema: &str, table: &str) -> String {
    format!("{schema}.{table}")
}
