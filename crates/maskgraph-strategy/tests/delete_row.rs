use std::collections::BTreeMap;
use std::sync::Arc;

use maskgraph_core::{Row, Rule, TableField, Value};
use maskgraph_introspect::{SchemaCatalog, SnapshotCatalog};
use maskgraph_strategy::{
    DeleteRowStrategy, StrategyContext, StrategyError, StrategyRegistry, TableRuleMap,
    TransformOutcome, TransformationStrategy,
};

const SNAPSHOT: &str = r#"{
  "schema_version": "0.1",
  "engine": "postgres",
  "schemas": [
    {
      "name": "app",
      "tables": [
        {
          "name": "ORDER",
          "columns": [
            { "name": "ID", "column_type": { "data_type": "int4" }, "is_nullable": false },
            { "name": "STATUS", "column_type": { "data_type": "varchar", "character_max_length": 16 } },
            { "name": "AMOUNT", "column_type": { "data_type": "numeric", "character_max_length": 10 } }
          ],
          "constraints": [
            { "kind": "primary_key", "name": "ORDER_PK", "columns": ["ID"] }
          ]
        }
      ]
    }
  ]
}"#;

fn context() -> StrategyContext {
    let catalog = SnapshotCatalog::from_json_str(SNAPSHOT).expect("snapshot catalog");
    StrategyContext::new(Arc::new(catalog))
}

fn status_rule(predicate: &str) -> Rule {
    Rule::new(
        TableField::new("app", "ORDER", "STATUS"),
        "purge_cancelled",
        predicate,
    )
}

fn order(id: i64, status: &str) -> Row {
    Row::new()
        .with("ID", id)
        .with("STATUS", status)
        .with("AMOUNT", 12.5)
}

#[tokio::test]
async fn deletes_only_matching_rows() {
    let context = context();
    let rule = status_rule("STATUS = 'CANCELLED'");
    let mut strategy = DeleteRowStrategy::new("purge_cancelled", context.catalog.clone());
    strategy
        .set_up_transformation(std::slice::from_ref(&rule))
        .await
        .expect("set up");
    assert_eq!(strategy.compiled_predicates(), 1);

    let cancelled = order(1002, "CANCELLED");
    let values = strategy
        .transform(&Value::from("CANCELLED"), &rule, &cancelled)
        .expect("transform cancelled");
    assert!(values.is_empty());
    assert_eq!(
        TransformOutcome::from_values(values, &rule).expect("outcome"),
        TransformOutcome::DeleteRow
    );

    let open = order(1001, "OPEN");
    let values = strategy
        .transform(&Value::from("OPEN"), &rule, &open)
        .expect("transform open");
    assert_eq!(values, vec![Value::from("OPEN")]);
}

#[tokio::test]
async fn compiles_on_demand_without_set_up() {
    let context = context();
    let rule = status_rule("AMOUNT > 10 AND STATUS IN ('OPEN', 'HELD')");
    let strategy = DeleteRowStrategy::new("purge_cancelled", context.catalog.clone());

    let values = strategy
        .transform(&Value::from("HELD"), &rule, &order(7, "HELD"))
        .expect("transform");
    assert!(values.is_empty());
    assert_eq!(strategy.compiled_predicates(), 0);
}

#[tokio::test]
async fn prepare_compiles_rules_of_the_table() {
    let context = context();
    let purge = status_rule("STATUS = 'CANCELLED'");
    let other = Rule::new(TableField::new("app", "ORDER", "ID"), "mask", "not a predicate (");
    let rules = vec![purge, other];
    let mut strategy = DeleteRowStrategy::new("purge_cancelled", context.catalog.clone());

    strategy
        .prepare_table_transformation(&TableRuleMap::build("app", "ORDER", &rules))
        .await
        .expect("prepare");
    assert_eq!(strategy.compiled_predicates(), 1);
}

#[tokio::test]
async fn validity_requires_parseable_predicate_over_known_columns() {
    let context = context();
    let strategy = DeleteRowStrategy::new("purge_cancelled", context.catalog.clone());
    let column = context
        .catalog
        .column_metadata(&TableField::new("app", "ORDER", "STATUS"))
        .await
        .expect("metadata")
        .expect("status column");

    let valid = strategy
        .is_rule_valid(&status_rule("status = 'CANCELLED' OR AMOUNT IS NULL"), &column)
        .await
        .expect("valid rule");
    assert!(valid);

    let err = strategy
        .is_rule_valid(&status_rule("REASON = 'fraud'"), &column)
        .await
        .expect_err("unknown column");
    assert!(
        matches!(&err, StrategyError::Validation { message, .. } if message.contains("REASON")),
        "{err}"
    );

    let err = strategy
        .is_rule_valid(&status_rule("STATUS = "), &column)
        .await
        .expect_err("broken predicate");
    assert!(matches!(err, StrategyError::Validation { .. }));

    let nested = format!("{}STATUS = 'X'{}", "(".repeat(100_000), ")".repeat(100_000));
    let err = strategy
        .is_rule_valid(&status_rule(&nested), &column)
        .await
        .expect_err("nesting too deep");
    assert!(matches!(err, StrategyError::Validation { .. }));
}

#[tokio::test]
async fn registry_loads_builtins_by_kind() {
    let context = context();
    let mut mapping = BTreeMap::new();
    mapping.insert("purge_cancelled".to_string(), "delete_row".to_string());

    let mut registry = StrategyRegistry::from_mapping(&mapping, &context).expect("registry");
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["no_op", "purge_cancelled"]);
    assert_eq!(registry.get("purge_cancelled").map(|s| s.kind()), Some("delete_row"));

    let rules = vec![
        status_rule("STATUS = 'CANCELLED'"),
        Rule::no_op(TableField::new("app", "ORDER", "ID")),
    ];
    registry.set_up_all(&rules).await.expect("set up all");

    let err = registry
        .set_up_all(&[status_rule("STATUS = ")])
        .await
        .expect_err("bad predicate");
    assert!(matches!(err, StrategyError::SetupFailed { .. }));
}

#[tokio::test]
async fn registry_rejects_unknown_kind() {
    let mut mapping = BTreeMap::new();
    mapping.insert("scramble".to_string(), "format_preserving".to_string());
    let err = StrategyRegistry::from_mapping(&mapping, &context()).expect_err("unknown kind");
    assert!(matches!(err, StrategyError::Load { ref name, .. } if name == "scramble"));
}
