use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use maskgraph_analyze::{AnalysisOutcome, AnalyzeError, Analyzer, IssueCode};
use maskgraph_core::{Error, Result as CoreResult, Rule, RuleSet, Scope, TableField};
use maskgraph_introspect::{
    CatalogColumn, ForeignKeyReference, PrimaryKeyColumn, SchemaCatalog, SnapshotCatalog,
};
use maskgraph_strategy::{StrategyContext, StrategyRegistry};
use serde_json::{Value as Json, json};

fn column(name: &str, data_type: &str, nullable: bool) -> Json {
    json!({ "name": name, "column_type": { "data_type": data_type }, "is_nullable": nullable })
}

fn primary_key(columns: &[&str]) -> Json {
    json!({ "kind": "primary_key", "name": null, "columns": columns })
}

fn foreign_key(column: &str, table: &str, referenced: &str) -> Json {
    json!({
        "kind": "foreign_key",
        "name": format!("{column}_FK"),
        "columns": [column],
        "referenced_schema": "app",
        "referenced_table": table,
        "referenced_columns": [referenced]
    })
}

/// CUSTOMER <- ORDER (CUSTOMER_ID), plus ARCHIVE_ORDER.OLD_CUSTOMER_ID
/// without any foreign key, plus a table in another schema.
fn retail_catalog() -> Arc<SnapshotCatalog> {
    let snapshot = json!({
        "schema_version": "0.1",
        "engine": "postgres",
        "schemas": [
            {
                "name": "app",
                "tables": [
                    {
                        "name": "CUSTOMER",
                        "columns": [column("ID", "int4", false), column("EMAIL", "varchar", false)],
                        "constraints": [primary_key(&["ID"])]
                    },
                    {
                        "name": "ORDER",
                        "columns": [
                            column("ID", "int4", false),
                            column("CUSTOMER_ID", "int4", false),
                            column("STATUS", "varchar", false)
                        ],
                        "constraints": [
                            primary_key(&["ID"]),
                            foreign_key("CUSTOMER_ID", "CUSTOMER", "ID")
                        ]
                    },
                    {
                        "name": "ARCHIVE_ORDER",
                        "columns": [column("OLD_CUSTOMER_ID", "int4", true)]
                    }
                ]
            },
            {
                "name": "billing",
                "tables": [
                    {
                        "name": "CUSTOMER",
                        "columns": [column("ID", "int4", false), column("CUSTOMER_ID", "int4", true)],
                        "constraints": [primary_key(&["ID"])]
                    }
                ]
            }
        ]
    });
    let catalog = SnapshotCatalog::from_json_str(&snapshot.to_string()).expect("snapshot catalog");
    Arc::new(catalog)
}

fn field(table: &str, column: &str) -> TableField {
    TableField::new("app", table, column)
}

fn rule_set(tables: &[&str]) -> RuleSet {
    let mut rules = RuleSet::new("app", Scope::new(tables.iter().copied()));
    rules
        .strategies
        .insert("purge".to_string(), "delete_row".to_string());
    rules
}

async fn analyze(catalog: &Arc<SnapshotCatalog>, rules: RuleSet) -> AnalysisOutcome {
    let context = StrategyContext::new(catalog.clone());
    let registry = StrategyRegistry::from_mapping(&rules.strategies, &context).expect("registry");
    let outcome = Analyzer::new(catalog.as_ref(), &registry)
        .analyze(rules)
        .await
        .expect("analysis");
    assert_graph_invariants(&outcome);
    outcome
}

fn assert_graph_invariants(outcome: &AnalysisOutcome) {
    let rules = &outcome.rule_set;
    for rule in &rules.rules {
        assert!(!rule.mentions(&rule.field), "{} lists itself", rule.field);
        assert_eq!(rule.field.schema, rules.schema_name);
        assert!(rules.scope.contains(&rule.field.table), "{} out of scope", rule.field);
        for dependant in rule.dependants().iter().chain(rule.potential_dependants()) {
            assert_eq!(dependant.schema, rules.schema_name);
            assert!(rules.scope.contains(&dependant.table), "{dependant} out of scope");
            let inverse = rules
                .rules_for(dependant)
                .any(|other| other.mentions(&rule.field));
            assert!(!inverse, "{} and {dependant} list each other", rule.field);
        }
        if rule.is_no_op() {
            assert!(rule.has_any_dependants(), "{} survived cleanup", rule.field);
        }
    }
}

fn only_rule_for<'a>(outcome: &'a AnalysisOutcome, field: &TableField) -> &'a Rule {
    let rules: Vec<_> = outcome.rule_set.rules_for(field).collect();
    assert_eq!(rules.len(), 1, "expected one rule for {field}");
    rules[0]
}

#[tokio::test]
async fn foreign_keys_become_confirmed_dependants() {
    let catalog = retail_catalog();
    let outcome = analyze(&catalog, rule_set(&["CUSTOMER", "ORDER"])).await;

    let customer = only_rule_for(&outcome, &field("CUSTOMER", "ID"));
    assert!(customer.is_no_op());
    assert_eq!(
        customer.dependants().iter().cloned().collect::<Vec<_>>(),
        vec![field("ORDER", "CUSTOMER_ID")]
    );
    assert!(
        !outcome.rule_set.has_rule_for(&field("ORDER", "ID")),
        "ORDER.ID placeholder has no dependants and is pruned"
    );
    assert_eq!(outcome.summary.primary_key_rules_added, 2);
    assert_eq!(outcome.summary.no_op_rules_pruned, 1);
    assert!(outcome.issues.is_empty());
}

#[tokio::test]
async fn name_matches_stay_potential() {
    let catalog = retail_catalog();
    let outcome = analyze(&catalog, rule_set(&["CUSTOMER", "ORDER", "ARCHIVE_ORDER"])).await;

    let archived = field("ARCHIVE_ORDER", "OLD_CUSTOMER_ID");
    let customer = only_rule_for(&outcome, &field("CUSTOMER", "ID"));
    assert!(customer.potential_dependants().contains(&archived));
    assert!(!customer.dependants().contains(&archived));

    let listing: Vec<_> = outcome
        .rule_set
        .rules
        .iter()
        .filter(|rule| rule.mentions(&archived))
        .map(|rule| rule.field.clone())
        .collect();
    assert_eq!(listing, vec![field("CUSTOMER", "ID"), field("ORDER", "ID")]);
    assert!(
        outcome
            .rule_set
            .rules
            .iter()
            .all(|rule| !rule.dependants().contains(&archived))
    );
}

#[tokio::test]
async fn potential_dependant_stays_open_to_later_rules() {
    let snapshot = json!({
        "schema_version": "0.1",
        "engine": "postgres",
        "schemas": [
            {
                "name": "app",
                "tables": [
                    {
                        "name": "CUSTOMER",
                        "columns": [column("ID", "int4", false)],
                        "constraints": [primary_key(&["ID"])]
                    },
                    {
                        "name": "ORDER",
                        "columns": [column("ID", "int4", false)],
                        "constraints": [primary_key(&["ID"])]
                    },
                    {
                        "name": "ORDER_LINE",
                        "columns": [column("ORDER_ID", "int4", false)]
                    }
                ]
            }
        ]
    });
    let catalog =
        Arc::new(SnapshotCatalog::from_json_str(&snapshot.to_string()).expect("snapshot catalog"));
    let outcome = analyze(&catalog, rule_set(&["CUSTOMER", "ORDER", "ORDER_LINE"])).await;

    let line = field("ORDER_LINE", "ORDER_ID");
    let customer = only_rule_for(&outcome, &field("CUSTOMER", "ID"));
    assert_eq!(
        customer.potential_dependants().iter().cloned().collect::<Vec<_>>(),
        vec![field("ORDER", "ID"), line.clone()]
    );

    let order = only_rule_for(&outcome, &field("ORDER", "ID"));
    assert!(order.potential_dependants().contains(&line));
    assert!(!order.potential_dependants().contains(&field("CUSTOMER", "ID")));
    assert_eq!(outcome.summary.no_op_rules_pruned, 0);
}

#[tokio::test]
async fn other_schemas_are_ignored() {
    let catalog = retail_catalog();
    let outcome = analyze(&catalog, rule_set(&["CUSTOMER", "ORDER"])).await;

    let billing = TableField::new("billing", "CUSTOMER", "CUSTOMER_ID");
    assert!(outcome.rule_set.rules.iter().all(|rule| !rule.mentions(&billing)));
}

#[tokio::test]
async fn primary_key_gap_fill_is_idempotent() {
    let catalog = retail_catalog();
    let registry = StrategyRegistry::new();
    let analyzer = Analyzer::new(catalog.as_ref(), &registry);
    let mut rules = rule_set(&["CUSTOMER", "ORDER", "ARCHIVE_ORDER"]);
    rules
        .rules
        .push(Rule::new(field("ORDER", "ID"), "purge", "STATUS = 'X'"));

    assert_eq!(
        analyzer
            .add_rules_for_primary_key_columns(&mut rules)
            .await
            .expect("first pass"),
        1
    );
    let after_first = rules.clone();
    assert_eq!(
        analyzer
            .add_rules_for_primary_key_columns(&mut rules)
            .await
            .expect("second pass"),
        0
    );
    assert_eq!(rules, after_first);
    assert_eq!(rules.rules.len(), 2);
    assert!(rules.has_rule_for(&field("CUSTOMER", "ID")));
}

#[tokio::test]
async fn invalid_rules_are_dropped_with_issues() {
    let catalog = retail_catalog();
    let mut rules = rule_set(&["CUSTOMER", "ORDER"]);
    rules.rules = vec![
        Rule::new(field("ORDER", "STATUS"), "purge", "STATUS = 'CANCELLED'"),
        Rule::new(field("ORDER", "STATUS"), "scramble", ""),
        Rule::new(field("ARCHIVE_ORDER", "OLD_CUSTOMER_ID"), "purge", "1 = 1"),
        Rule::new(field("ORDER", "NOTE"), "no_op", ""),
        Rule::new(TableField::new("billing", "CUSTOMER", "ID"), "no_op", ""),
        Rule::new(field("ORDER", "CUSTOMER_ID"), "purge", "REASON = 'fraud'"),
    ];

    let outcome = analyze(&catalog, rules).await;

    let dropped: Vec<_> = outcome
        .issues_with(IssueCode::InvalidRule)
        .map(|issue| issue.field.to_string())
        .collect();
    assert_eq!(
        dropped,
        vec![
            "app.ORDER.STATUS",
            "app.ARCHIVE_ORDER.OLD_CUSTOMER_ID",
            "app.ORDER.NOTE",
            "billing.CUSTOMER.ID",
            "app.ORDER.CUSTOMER_ID",
        ]
    );
    assert_eq!(outcome.summary.rules_dropped, 5);

    let purge = only_rule_for(&outcome, &field("ORDER", "STATUS"));
    assert_eq!(purge.strategy, "purge");
    assert_eq!(purge.additional_info, "STATUS = 'CANCELLED'");
}

#[tokio::test]
async fn stale_dependants_are_removed_but_rule_survives() {
    let catalog = retail_catalog();
    let mut rules = rule_set(&["CUSTOMER", "ORDER"]);
    let mut email = Rule::new(field("CUSTOMER", "EMAIL"), "purge", "EMAIL LIKE '%@test'");
    email.add_dependant(field("ORDER", "CUSTOMER_EMAIL"));
    email.add_dependant(field("ARCHIVE_ORDER", "OLD_CUSTOMER_ID"));
    email.add_potential_dependant(TableField::new("billing", "CUSTOMER", "ID"));
    rules.rules.push(email);

    let outcome = analyze(&catalog, rules).await;

    let email = only_rule_for(&outcome, &field("CUSTOMER", "EMAIL"));
    assert!(email.dependants().is_empty());
    assert!(email.potential_dependants().is_empty());

    let missing: Vec<_> = outcome
        .issues_with(IssueCode::MissingDependant)
        .map(|issue| issue.field.clone())
        .collect();
    assert_eq!(missing, vec![field("ORDER", "CUSTOMER_EMAIL")]);
    assert_eq!(outcome.issues_with(IssueCode::OutOfScopeDependant).count(), 2);
    assert_eq!(outcome.summary.dependants_removed, 3);
}

#[tokio::test]
async fn existing_reverse_edge_blocks_foreign_key_dependant() {
    let catalog = retail_catalog();
    let mut rules = rule_set(&["CUSTOMER", "ORDER"]);
    let mut reverse = Rule::no_op(field("ORDER", "CUSTOMER_ID"));
    reverse.add_dependant(field("CUSTOMER", "ID"));
    rules.rules.push(reverse);

    let outcome = analyze(&catalog, rules).await;

    let reverse = only_rule_for(&outcome, &field("ORDER", "CUSTOMER_ID"));
    assert!(reverse.dependants().contains(&field("CUSTOMER", "ID")));
    assert!(
        outcome
            .rule_set
            .rules_for(&field("CUSTOMER", "ID"))
            .all(|rule| !rule.mentions(&field("ORDER", "CUSTOMER_ID")))
    );
}

#[tokio::test]
async fn rule_set_mapping_with_unknown_kind_fails_to_load() {
    let catalog = retail_catalog();
    let mut mapping = BTreeMap::new();
    mapping.insert("mask".to_string(), "hash_sha256".to_string());
    let context = StrategyContext::new(catalog);
    assert!(StrategyRegistry::from_mapping(&mapping, &context).is_err());
}

struct UnreachableCatalog;

#[async_trait]
impl SchemaCatalog for UnreachableCatalog {
    fn engine(&self) -> &'static str {
        "unreachable"
    }

    async fn list_tables(&self, _schema: &str) -> CoreResult<Vec<String>> {
        Err(Error::Db("connection refused".to_string()))
    }

    async fn primary_key_columns(
        &self,
        _schema: &str,
        _table: &str,
    ) -> CoreResult<Vec<PrimaryKeyColumn>> {
        unreachable!("analysis stops after list_tables")
    }

    async fn exported_keys(&self, _schema: &str, _table: &str) -> CoreResult<Vec<ForeignKeyReference>> {
        unreachable!("analysis stops after list_tables")
    }

    async fn imported_keys(&self, _schema: &str, _table: &str) -> CoreResult<Vec<ForeignKeyReference>> {
        unreachable!("analysis stops after list_tables")
    }

    async fn list_columns(
        &self,
        _schema: &str,
        _table_pattern: Option<&str>,
        _column_pattern: &str,
    ) -> CoreResult<Vec<CatalogColumn>> {
        unreachable!("analysis stops after list_tables")
    }

    async fn column_metadata(&self, _field: &TableField) -> CoreResult<Option<CatalogColumn>> {
        unreachable!("analysis stops after list_tables")
    }
}

#[tokio::test]
async fn catalog_failure_aborts_analysis() {
    let registry = StrategyRegistry::new();
    let err = Analyzer::new(&UnreachableCatalog, &registry)
        .analyze(rule_set(&["CUSTOMER"]))
        .await
        .expect_err("catalog failure");
    assert!(matches!(err, AnalyzeError::Catalog(Error::Db(_))));
}
