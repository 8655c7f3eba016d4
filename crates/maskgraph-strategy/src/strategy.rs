use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use maskgraph_core::{Row, Rule, Value};
use maskgraph_introspect::{CatalogColumn, SchemaCatalog};

use crate::errors::StrategyError;

/// Shared services handed to strategies when they are instantiated.
#[derive(Clone)]
pub struct StrategyContext {
    /// Catalog of the original database.
    pub catalog: Arc<dyn SchemaCatalog>,
}

impl StrategyContext {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self { catalog }
    }
}

impl std::fmt::Debug for StrategyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("catalog", &self.catalog.engine())
            .finish()
    }
}

/// What the orchestrator should do with a cell after a transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    DeleteRow,
    Replace(Value),
}

impl TransformOutcome {
    /// Interpret a strategy's return values: none deletes the row, one
    /// replaces the cell.
    pub fn from_values(values: Vec<Value>, rule: &Rule) -> Result<Self, StrategyError> {
        let count = values.len();
        let mut values = values.into_iter();
        match (values.next(), count) {
            (None, _) => Ok(TransformOutcome::DeleteRow),
            (Some(value), 1) => Ok(TransformOutcome::Replace(value)),
            _ => Err(StrategyError::ContractViolation {
                strategy: rule.strategy.clone(),
                field: rule.field.to_string(),
                count,
            }),
        }
    }
}

/// The rules touching one table, keyed by the column they affect there.
///
/// A rule appears under its own column when its source lives in the table and
/// under every dependant column that lives in the table.
#[derive(Debug, Clone, Default)]
pub struct TableRuleMap {
    schema: String,
    table: String,
    columns: BTreeMap<String, Vec<Rule>>,
}

impl TableRuleMap {
    pub fn build(schema: &str, table: &str, rules: &[Rule]) -> Self {
        let mut columns: BTreeMap<String, Vec<Rule>> = BTreeMap::new();
        for rule in rules {
            if rule.field.belongs_to(schema, table) {
                columns
                    .entry(rule.field.column.clone())
                    .or_default()
                    .push(rule.clone());
            }
            for dependant in rule.dependants() {
                if dependant.belongs_to(schema, table) {
                    columns
                        .entry(dependant.column.clone())
                        .or_default()
                        .push(rule.clone());
                }
            }
        }
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rules_for_column(&self, column: &str) -> &[Rule] {
        self.columns.get(column).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Every rule in the map, once per column it touches.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.columns.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A named transformation applied to the column a rule targets.
#[async_trait]
pub trait TransformationStrategy: Send + Sync {
    /// Kind identifier used in rule files (e.g. `no_op`).
    fn kind(&self) -> &'static str;

    /// One-time preparation over every rule naming this strategy.
    async fn set_up_transformation(&mut self, _rules: &[Rule]) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Called before the first row of a table is transformed.
    async fn prepare_table_transformation(
        &mut self,
        _table_rules: &TableRuleMap,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Returns no values to delete the row, or exactly one replacement.
    fn transform(&self, old_value: &Value, rule: &Rule, row: &Row)
    -> Result<Vec<Value>, StrategyError>;

    /// Whether `rule` can be applied to `column`. `Err(Validation)` also
    /// marks the rule invalid; `Err(Catalog)` is a catalog failure.
    async fn is_rule_valid(
        &self,
        rule: &Rule,
        column: &CatalogColumn,
    ) -> Result<bool, StrategyError>;
}
