use std::collections::{BTreeMap, BTreeSet};

use crate::constraints::Constraint;
use crate::error::{Error, Result};
use crate::schema::DatabaseSchema;

type ColumnIndex<'a> = BTreeMap<(&'a str, &'a str), BTreeSet<&'a str>>;

/// Check a snapshot before it is used as a catalog.
///
/// Rejects duplicate schemas, tables and columns, key columns that do not
/// exist, foreign keys whose target is missing, and foreign keys whose local
/// and referenced column lists differ in length.
pub fn validate_schema(schema: &DatabaseSchema) -> Result<()> {
    let index = index_columns(schema)?;

    for db_schema in &schema.schemas {
        for table in &db_schema.tables {
            let owner = (db_schema.name.as_str(), table.name.as_str());
            let Some(columns) = index.get(&owner) else {
                continue;
            };

            for constraint in &table.constraints {
                match constraint {
                    Constraint::PrimaryKey(pk) => {
                        require_columns(columns, &pk.columns, owner, "primary key")?;
                    }
                    Constraint::ForeignKey(fk) => {
                        require_columns(columns, &fk.columns, owner, "foreign key")?;

                        let target = (fk.referenced_schema.as_str(), fk.referenced_table.as_str());
                        let target_columns = index.get(&target).ok_or_else(|| {
                            Error::InvalidSchema(format!(
                                "referenced table not found: {}.{}",
                                target.0, target.1
                            ))
                        })?;
                        require_columns(
                            target_columns,
                            &fk.referenced_columns,
                            target,
                            "referenced",
                        )?;

                        if fk.columns.len() != fk.referenced_columns.len() {
                            return Err(Error::InvalidSchema(format!(
                                "foreign key {}.{}({}) references {} columns",
                                owner.0,
                                owner.1,
                                fk.columns.join(", "),
                                fk.referenced_columns.len()
                            )));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn index_columns(schema: &DatabaseSchema) -> Result<ColumnIndex<'_>> {
    let mut schemas = BTreeSet::new();
    let mut index = ColumnIndex::new();

    for db_schema in &schema.schemas {
        if !schemas.insert(db_schema.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate schema name: {}",
                db_schema.name
            )));
        }

        for table in &db_schema.tables {
            let key = (db_schema.name.as_str(), table.name.as_str());
            if index.contains_key(&key) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate table name: {}.{}",
                    key.0, key.1
                )));
            }

            let mut columns = BTreeSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "duplicate column name: {}.{}.{}",
                        key.0, key.1, column.name
                    )));
                }
            }
            index.insert(key, columns);
        }
    }

    Ok(index)
}

fn require_columns(
    present: &BTreeSet<&str>,
    wanted: &[String],
    (schema, table): (&str, &str),
    what: &str,
) -> Result<()> {
    match wanted.iter().find(|column| !present.contains(column.as_str())) {
        Some(column) => Err(Error::InvalidSchema(format!(
            "{what} column not found: {schema}.{table}.{column}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ForeignKey, PrimaryKey};
    use crate::schema::{Column, ColumnType, Schema, Table, TableKind};

    fn column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            column_type: ColumnType {
                data_type: "int4".to_string(),
                character_max_length: None,
            },
            is_nullable: false,
        }
    }

    fn snapshot(order_fk_target: &str) -> DatabaseSchema {
        DatabaseSchema {
            schema_version: crate::SCHEMA_VERSION.to_string(),
            engine: "postgres".to_string(),
            database: None,
            schemas: vec![Schema {
                name: "app".to_string(),
                tables: vec![
                    Table {
                        name: "CUSTOMER".to_string(),
                        kind: TableKind::Table,
                        columns: vec![column("ID")],
                        constraints: vec![Constraint::PrimaryKey(PrimaryKey {
                            name: Some("CUSTOMER_PK".to_string()),
                            columns: vec!["ID".to_string()],
                        })],
                    },
                    Table {
                        name: "ORDER".to_string(),
                        kind: TableKind::Table,
                        columns: vec![column("ID"), column("CUSTOMER_ID")],
                        constraints: vec![Constraint::ForeignKey(ForeignKey {
                            name: None,
                            columns: vec!["CUSTOMER_ID".to_string()],
                            referenced_schema: "app".to_string(),
                            referenced_table: order_fk_target.to_string(),
                            referenced_columns: vec!["ID".to_string()],
                        })],
                    },
                ],
            }],
        }
    }

    #[test]
    fn accepts_consistent_snapshot() {
        validate_schema(&snapshot("CUSTOMER")).expect("valid snapshot");
    }

    #[test]
    fn rejects_dangling_foreign_key() {
        let err = validate_schema(&snapshot("CLIENT")).expect_err("dangling fk");
        assert!(err.to_string().contains("referenced table not found: app.CLIENT"));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut schema = snapshot("CUSTOMER");
        schema.schemas[0].tables[0].columns.push(column("ID"));
        let err = validate_schema(&schema).expect_err("duplicate column");
        assert!(err.to_string().contains("duplicate column name: app.CUSTOMER.ID"));
    }
}
