use sqlx::PgPool;

use maskgraph_core::{Error, Result, TableField};

use crate::catalog::{CatalogColumn, ForeignKeyReference, PrimaryKeyColumn};

// information_schema exposes domain types (sql_identifier, cardinal_number);
// every projected column is cast so it decodes as a plain Rust type.

pub async fn list_tables(pool: &PgPool, schema: &str) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        select table_name::text
        from information_schema.tables
        where table_schema = $1
          and table_type = 'BASE TABLE'
        order by table_name
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Db(err.to_string()))
}

pub async fn primary_key_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<PrimaryKeyColumn>> {
    let rows = sqlx::query_as::<_, (String, i32, String)>(
        r#"
        select
          kcu.column_name::text,
          kcu.ordinal_position::int4,
          tc.constraint_name::text
        from information_schema.table_constraints tc
        join information_schema.key_column_usage kcu
          on kcu.constraint_schema = tc.constraint_schema
         and kcu.constraint_name = tc.constraint_name
         and kcu.table_schema = tc.table_schema
         and kcu.table_name = tc.table_name
        where tc.constraint_type = 'PRIMARY KEY'
          and tc.table_schema = $1
          and tc.table_name = $2
        order by kcu.ordinal_position
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|err| Error::Db(err.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(column, key_seq, key_name)| PrimaryKeyColumn {
            column,
            key_seq,
            key_name: Some(key_name),
        })
        .collect())
}

type RawReference = (String, String, String, String, String, String, String);

const FOREIGN_KEY_COLUMNS: &str = r#"
        select
          parent_nsp.nspname::text,
          parent_rel.relname::text,
          parent_att.attname::text,
          child_nsp.nspname::text,
          child_rel.relname::text,
          child_att.attname::text,
          con.conname::text
        from pg_constraint con
        join pg_class child_rel on child_rel.oid = con.conrelid
        join pg_namespace child_nsp on child_nsp.oid = child_rel.relnamespace
        join pg_class parent_rel on parent_rel.oid = con.confrelid
        join pg_namespace parent_nsp on parent_nsp.oid = parent_rel.relnamespace
        cross join lateral unnest(con.conkey, con.confkey)
          with ordinality as pair(child_attnum, parent_attnum, position)
        join pg_attribute child_att
          on child_att.attrelid = con.conrelid and child_att.attnum = pair.child_attnum
        join pg_attribute parent_att
          on parent_att.attrelid = con.confrelid and parent_att.attnum = pair.parent_attnum
        where con.contype = 'f'
"#;

/// References pointing at `schema.table`.
pub async fn exported_keys(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyReference>> {
    let sql = format!(
        "{FOREIGN_KEY_COLUMNS}
          and parent_nsp.nspname = $1
          and parent_rel.relname = $2
        order by child_nsp.nspname, child_rel.relname, con.conname, pair.position"
    );
    fetch_references(pool, &sql, schema, table).await
}

/// References declared on `schema.table`.
pub async fn imported_keys(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyReference>> {
    let sql = format!(
        "{FOREIGN_KEY_COLUMNS}
          and child_nsp.nspname = $1
          and child_rel.relname = $2
        order by parent_nsp.nspname, parent_rel.relname, con.conname, pair.position"
    );
    fetch_references(pool, &sql, schema, table).await
}

async fn fetch_references(
    pool: &PgPool,
    sql: &str,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyReference>> {
    let rows = sqlx::query_as::<_, RawReference>(sql)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|err| Error::Db(err.to_string()))?;

    Ok(rows
        .into_iter()
        .map(
            |(parent_schema, parent_table, parent_column, child_schema, child_table, child_column, name)| {
                ForeignKeyReference {
                    parent: TableField::new(parent_schema, parent_table, parent_column),
                    child: TableField::new(child_schema, child_table, child_column),
                    constraint_name: Some(name),
                }
            },
        )
        .collect())
}

type RawColumn = (String, String, String, String, Option<i32>, bool);

fn map_column(
    (schema, table, column, type_name, length, nullable): RawColumn,
) -> CatalogColumn {
    CatalogColumn {
        field: TableField::new(schema, table, column),
        type_name,
        length,
        nullable,
    }
}

const COLUMN_SELECT: &str = r#"
        select
          c.table_schema::text,
          c.table_name::text,
          c.column_name::text,
          c.udt_name::text,
          coalesce(c.character_maximum_length, c.numeric_precision)::int4,
          (c.is_nullable = 'YES')
        from information_schema.columns c
        join information_schema.tables t
          on t.table_schema = c.table_schema
         and t.table_name = c.table_name
         and t.table_type = 'BASE TABLE'
"#;

pub async fn list_columns(
    pool: &PgPool,
    schema: &str,
    table_pattern: &str,
    column_pattern: &str,
) -> Result<Vec<CatalogColumn>> {
    let sql = format!(
        "{COLUMN_SELECT}
        where c.table_schema = $1
          and c.table_name like $2
          and c.column_name like $3
        order by c.table_name, c.ordinal_position"
    );
    let rows = sqlx::query_as::<_, RawColumn>(&sql)
        .bind(schema)
        .bind(table_pattern)
        .bind(column_pattern)
        .fetch_all(pool)
        .await
        .map_err(|err| Error::Db(err.to_string()))?;

    Ok(rows.into_iter().map(map_column).collect())
}

pub async fn column_metadata(pool: &PgPool, field: &TableField) -> Result<Option<CatalogColumn>> {
    let sql = format!(
        "{COLUMN_SELECT}
        where c.table_schema = $1
          and c.table_name = $2
          and c.column_name = $3"
    );
    let row = sqlx::query_as::<_, RawColumn>(&sql)
        .bind(&field.schema)
        .bind(&field.table)
        .bind(&field.column)
        .fetch_optional(pool)
        .await
        .map_err(|err| Error::Db(err.to_string()))?;

    Ok(row.map(map_column))
}
