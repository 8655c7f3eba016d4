//! SQL text for the statements the anonymization pipeline issues directly.
//!
//! Dialects only build strings; executing them is the caller's concern.

/// A primary key column with the engine type name used to recreate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub type_name: String,
}

impl KeyColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Engine-specific SQL syntax.
pub trait SqlDialect: Send + Sync {
    /// Dialect identifier (e.g. `postgres`, `db2`).
    fn name(&self) -> &str;

    fn quote_ident(&self, name: &str) -> String;

    fn qualified_table(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    fn create_schema(&self, schema: &str) -> String {
        format!("CREATE SCHEMA {}", self.quote_ident(schema))
    }

    /// Column definitions plus the composite key clause, e.g.
    /// `"A" INT4 NOT NULL, "B" INT4 NOT NULL, PRIMARY KEY ("A", "B")`.
    fn primary_key_definition(&self, columns: &[KeyColumn]) -> String {
        let mut parts: Vec<String> = columns
            .iter()
            .map(|column| format!("{} {} NOT NULL", self.quote_ident(&column.name), column.type_name))
            .collect();
        let key = columns
            .iter()
            .map(|column| self.quote_ident(&column.name))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("PRIMARY KEY ({key})"));
        parts.join(", ")
    }

    /// Bind placeholder for the given 1-based index, cast to `type_name`.
    fn placeholder(&self, index: usize, type_name: &str) -> String;

    /// Whether every foreign key can be switched off with one statement.
    fn supports_disable_all_foreign_keys(&self) -> bool {
        false
    }

    fn disable_all_foreign_keys(&self) -> Option<String> {
        None
    }

    fn enable_all_foreign_keys(&self) -> Option<String> {
        None
    }

    /// Statement disabling one constraint, when the engine allows it.
    fn disable_foreign_key(&self, _schema: &str, _table: &str, _constraint: &str) -> Option<String> {
        None
    }

    fn enable_foreign_key(&self, _schema: &str, _table: &str, _constraint: &str) -> Option<String> {
        None
    }

    fn truncate_table(&self, schema: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.qualified_table(schema, table))
    }

    /// Query evaluating a constant expression.
    fn select_constant(&self, expression: &str) -> String {
        format!("SELECT {expression}")
    }
}

/// PostgreSQL syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn create_schema(&self, schema: &str) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote_ident(schema))
    }

    fn placeholder(&self, index: usize, type_name: &str) -> String {
        format!("${index}::{type_name}")
    }

    fn supports_disable_all_foreign_keys(&self) -> bool {
        true
    }

    // Replica mode skips FK triggers for the session.
    fn disable_all_foreign_keys(&self) -> Option<String> {
        Some("SET session_replication_role = replica".to_string())
    }

    fn enable_all_foreign_keys(&self) -> Option<String> {
        Some("SET session_replication_role = DEFAULT".to_string())
    }
}

/// IBM DB2 syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct Db2Dialect;

impl SqlDialect for Db2Dialect {
    fn name(&self) -> &str {
        "db2"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, _index: usize, type_name: &str) -> String {
        format!("CAST(? AS {type_name})")
    }

    fn disable_foreign_key(&self, schema: &str, table: &str, constraint: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER FOREIGN KEY {} NOT ENFORCED",
            self.qualified_table(schema, table),
            self.quote_ident(constraint)
        ))
    }

    fn enable_foreign_key(&self, schema: &str, table: &str, constraint: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER FOREIGN KEY {} ENFORCED",
            self.qualified_table(schema, table),
            self.quote_ident(constraint)
        ))
    }

    fn truncate_table(&self, schema: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {} IMMEDIATE", self.qualified_table(schema, table))
    }

    fn select_constant(&self, expression: &str) -> String {
        format!("SELECT {expression} FROM SYSIBM.SYSDUMMY1")
    }
}
