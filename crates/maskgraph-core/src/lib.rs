//! Core contracts shared by the maskgraph crates.
//!
//! Defines the rule graph model (fields, rules, rule sets), the row values
//! handed to strategies, the schema snapshot model used for offline
//! analysis, and the SQL dialect capability.

pub mod constraints;
pub mod dialect;
pub mod error;
pub mod field;
pub mod rules;
pub mod schema;
pub mod validation;
pub mod value;

pub use constraints::{Constraint, ForeignKey, PrimaryKey};
pub use dialect::{Db2Dialect, KeyColumn, PostgresDialect, SqlDialect};
pub use error::{Error, Result};
pub use field::{TableField, qualified_table_name};
pub use rules::{NO_OP_STRATEGY, Rule, RuleSet, Scope};
pub use schema::{Column, ColumnType, DatabaseSchema, Schema, Table, TableKind};
pub use validation::validate_schema;
pub use value::{Row, Value};

/// Current contract version for `schema.json` snapshots.
pub const SCHEMA_VERSION: &str = "0.1";
