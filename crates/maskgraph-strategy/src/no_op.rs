use async_trait::async_trait;

use maskgraph_core::{NO_OP_STRATEGY, Row, Rule, Value};
use maskgraph_introspect::CatalogColumn;

use crate::errors::StrategyError;
use crate::strategy::TransformationStrategy;

/// Leaves every value untouched. Used for placeholder rules that only carry
/// dependants.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOperationStrategy;

#[async_trait]
impl TransformationStrategy for NoOperationStrategy {
    fn kind(&self) -> &'static str {
        NO_OP_STRATEGY
    }

    fn transform(
        &self,
        old_value: &Value,
        _rule: &Rule,
        _row: &Row,
    ) -> Result<Vec<Value>, StrategyError> {
        Ok(vec![old_value.clone()])
    }

    async fn is_rule_valid(
        &self,
        _rule: &Rule,
        _column: &CatalogColumn,
    ) -> Result<bool, StrategyError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maskgraph_core::TableField;

    #[test]
    fn returns_input_unchanged() {
        let rule = Rule::no_op(TableField::new("app", "CUSTOMER", "ID"));
        let row = Row::new().with("ID", 42_i64);
        let values = NoOperationStrategy
            .transform(&Value::Int(42), &rule, &row)
            .expect("transform");
        assert_eq!(values, vec![Value::Int(42)]);
    }
}
