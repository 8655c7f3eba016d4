use anyhow::{Context, Result};
use maskgraph_core::TableField;
use maskgraph_introspect::{PostgresCatalog, SchemaCatalog, escape_like};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{env, fs};

const FIXTURE_PATHS: &[&str] = &[
    "../../fixtures/sql/postgres/001_retail_schema.sql",
    "../../fixtures/sql/postgres/002_retail_data.sql",
];

fn database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
}

async fn run_fixture(pool: &PgPool, path: &str) -> Result<()> {
    let script = fs::read_to_string(path).with_context(|| format!("reading fixture {path}"))?;

    for statement in script.split(';') {
        let sql = statement.trim();
        if sql.is_empty() {
            continue;
        }

        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("executing fixture {path}"))?;
    }

    Ok(())
}

#[tokio::test]
async fn reads_keys_and_columns_from_live_catalog() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL for integration tests");
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&db_url)
        .await
        .context("connecting to Postgres")?;

    for path in FIXTURE_PATHS {
        run_fixture(&pool, path).await?;
    }

    let catalog = PostgresCatalog::new(pool);

    let tables = catalog.list_tables("mg_retail").await?;
    assert_eq!(
        tables,
        vec!["ARCHIVE_ORDER", "AUDIT_LOG", "CUSTOMER", "ORDER", "ORDER_LINE"],
        "views are not base tables"
    );

    let pk = catalog.primary_key_columns("mg_retail", "ORDER_LINE").await?;
    let pk_columns: Vec<_> = pk.iter().map(|column| column.column.as_str()).collect();
    assert_eq!(pk_columns, vec!["ORDER_ID", "LINE_NO"]);
    assert_eq!(pk[1].key_seq, 2);
    assert!(
        catalog
            .primary_key_columns("mg_retail", "AUDIT_LOG")
            .await?
            .is_empty()
    );

    let exported = catalog.exported_keys("mg_retail", "CUSTOMER").await?;
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].child, TableField::new("mg_retail", "ORDER", "CUSTOMER_ID"));
    let imported = catalog.imported_keys("mg_retail", "ORDER").await?;
    assert_eq!(imported, exported);

    let pattern = format!("%{}%", escape_like("CUSTOMER_ID"));
    let similar: Vec<_> = catalog
        .list_columns("mg_retail", None, &pattern)
        .await?
        .into_iter()
        .map(|column| column.field.to_string())
        .collect();
    assert_eq!(
        similar,
        vec![
            "mg_retail.ARCHIVE_ORDER.OLD_CUSTOMER_ID",
            "mg_retail.ORDER.CUSTOMER_ID"
        ]
    );

    let status = catalog
        .column_metadata(&TableField::new("mg_retail", "ORDER", "STATUS"))
        .await?
        .context("STATUS column")?;
    assert_eq!(status.type_name, "varchar");
    assert_eq!(status.length, Some(16));
    assert!(!status.nullable);
    assert!(
        !catalog
            .column_exists(&TableField::new("mg_retail", "ORDER", "MISSING"))
            .await?
    );

    Ok(())
}
