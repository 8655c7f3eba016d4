use maskgraph_core::{Rule, Scope};
use maskgraph_introspect::SchemaCatalog;
use maskgraph_strategy::{StrategyError, StrategyRegistry};

use crate::errors::AnalyzeError;

/// Result of checking one rule against the catalog and the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Valid,
    Invalid(String),
}

/// Structural rule checks: schema, scope, strategy and column.
pub struct RuleValidator<'a> {
    catalog: &'a dyn SchemaCatalog,
    strategies: &'a StrategyRegistry,
    schema: &'a str,
    scope: &'a Scope,
}

impl<'a> RuleValidator<'a> {
    pub fn new(
        catalog: &'a dyn SchemaCatalog,
        strategies: &'a StrategyRegistry,
        schema: &'a str,
        scope: &'a Scope,
    ) -> Self {
        Self {
            catalog,
            strategies,
            schema,
            scope,
        }
    }

    /// Catalog failures are returned as errors; everything else wrong with
    /// the rule is an [`RuleVerdict::Invalid`].
    pub async fn validate(&self, rule: &Rule) -> Result<RuleVerdict, AnalyzeError> {
        let field = &rule.field;
        if field.schema != self.schema {
            return Ok(RuleVerdict::Invalid(format!(
                "rule targets schema {} but the rule set is for {}",
                field.schema, self.schema
            )));
        }
        if !self.scope.contains(&field.table) {
            return Ok(RuleVerdict::Invalid(format!(
                "table {} is not in scope",
                field.table
            )));
        }
        let Some(strategy) = self.strategies.get(&rule.strategy) else {
            return Ok(RuleVerdict::Invalid(format!(
                "strategy {} is not registered",
                rule.strategy
            )));
        };
        let Some(column) = self.catalog.column_metadata(field).await? else {
            return Ok(RuleVerdict::Invalid(format!("column {field} does not exist")));
        };

        match strategy.is_rule_valid(rule, &column).await {
            Ok(true) => Ok(RuleVerdict::Valid),
            Ok(false) => Ok(RuleVerdict::Invalid(format!(
                "strategy {} cannot be applied to {} {}",
                rule.strategy, column.type_name, field
            ))),
            Err(StrategyError::Validation { message, .. }) => Ok(RuleVerdict::Invalid(message)),
            Err(StrategyError::Catalog(err)) => Err(AnalyzeError::Catalog(err)),
            Err(err) => Err(AnalyzeError::Strategy(err)),
        }
    }
}
