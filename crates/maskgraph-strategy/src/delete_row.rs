use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use maskgraph_core::{Row, Rule, Value};
use maskgraph_introspect::{CatalogColumn, SchemaCatalog, escape_like};

use crate::errors::StrategyError;
use crate::predicate::RowPredicate;
use crate::registry::DELETE_ROW_KIND;
use crate::strategy::{TableRuleMap, TransformationStrategy};

/// Deletes rows matching the predicate stored in the rule's
/// `additional_info`, and keeps every other row unchanged.
pub struct DeleteRowStrategy {
    /// Strategy name this instance is registered under.
    name: String,
    catalog: Arc<dyn SchemaCatalog>,
    /// Compiled predicates keyed by their source text.
    predicates: HashMap<String, RowPredicate>,
}

impl DeleteRowStrategy {
    pub fn new(name: impl Into<String>, catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            name: name.into(),
            catalog,
            predicates: HashMap::new(),
        }
    }

    fn compile(&mut self, rule: &Rule) -> Result<(), StrategyError> {
        if self.predicates.contains_key(&rule.additional_info) {
            return Ok(());
        }
        let predicate =
            RowPredicate::parse(&rule.additional_info).map_err(|err| StrategyError::SetupFailed {
                strategy: rule.strategy.clone(),
                message: format!("{}: {err}", rule.field),
            })?;
        self.predicates
            .insert(rule.additional_info.clone(), predicate);
        Ok(())
    }

    fn predicate_for<'a>(&'a self, rule: &Rule) -> Result<Cow<'a, RowPredicate>, StrategyError> {
        if let Some(predicate) = self.predicates.get(&rule.additional_info) {
            return Ok(Cow::Borrowed(predicate));
        }
        RowPredicate::parse(&rule.additional_info)
            .map(Cow::Owned)
            .map_err(|err| StrategyError::Transform {
                field: rule.field.to_string(),
                message: err.to_string(),
            })
    }

    pub fn compiled_predicates(&self) -> usize {
        self.predicates.len()
    }
}

impl std::fmt::Debug for DeleteRowStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteRowStrategy")
            .field("name", &self.name)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

#[async_trait]
impl TransformationStrategy for DeleteRowStrategy {
    fn kind(&self) -> &'static str {
        DELETE_ROW_KIND
    }

    async fn set_up_transformation(&mut self, rules: &[Rule]) -> Result<(), StrategyError> {
        for rule in rules {
            self.compile(rule)?;
        }
        tracing::debug!(
            event = "delete_row_set_up",
            rules = rules.len(),
            predicates = self.predicates.len()
        );
        Ok(())
    }

    async fn prepare_table_transformation(
        &mut self,
        table_rules: &TableRuleMap,
    ) -> Result<(), StrategyError> {
        let rules: Vec<Rule> = table_rules
            .rules()
            .filter(|rule| rule.strategy == self.name)
            .filter(|rule| rule.field.belongs_to(table_rules.schema(), table_rules.table()))
            .cloned()
            .collect();
        for rule in &rules {
            self.compile(rule)?;
        }
        tracing::debug!(
            event = "delete_row_table_prepared",
            strategy = %self.name,
            schema = table_rules.schema(),
            table = table_rules.table(),
            rules = rules.len()
        );
        Ok(())
    }

    fn transform(&self, old_value: &Value, rule: &Rule, row: &Row) -> Result<Vec<Value>, StrategyError> {
        let predicate = self.predicate_for(rule)?;
        let matched = predicate.matches(row).map_err(|err| StrategyError::Transform {
            field: rule.field.to_string(),
            message: err.to_string(),
        })?;
        if matched {
            Ok(Vec::new())
        } else {
            Ok(vec![old_value.clone()])
        }
    }

    async fn is_rule_valid(
        &self,
        rule: &Rule,
        _column: &CatalogColumn,
    ) -> Result<bool, StrategyError> {
        let predicate =
            RowPredicate::parse(&rule.additional_info).map_err(|err| StrategyError::Validation {
                field: rule.field.to_string(),
                message: format!("invalid row predicate: {err}"),
            })?;

        let table_columns = self
            .catalog
            .list_columns(
                &rule.field.schema,
                Some(&escape_like(&rule.field.table)),
                "%",
            )
            .await?;

        for referenced in predicate.columns() {
            let known = table_columns.iter().any(|column| {
                column.field.column == referenced
                    || column.field.column.eq_ignore_ascii_case(referenced)
            });
            if !known {
                return Err(StrategyError::Validation {
                    field: rule.field.to_string(),
                    message: format!(
                        "row predicate references unknown column {referenced} of {}",
                        rule.field.qualified_table()
                    ),
                });
            }
        }

        Ok(true)
    }
}
